pub mod preferences;
pub mod product;
pub mod sales;
pub mod store;
pub mod suggestion;
