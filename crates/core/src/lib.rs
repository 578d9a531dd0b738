pub mod config;
pub mod domain;
pub mod errors;
pub mod suggestions;

pub use config::{AppConfig, ConfigError, LoadOptions};
pub use domain::preferences::UserSuggestionPreferences;
pub use domain::product::{ProductId, ProductSnapshot};
pub use domain::sales::SaleRecord;
pub use domain::store::{StoreProfile, UserId};
pub use domain::suggestion::{
    ActionType, Suggestion, SuggestionDomain, SuggestionId, SuggestionPriority, SuggestionStatus,
    SuggestionType,
};
pub use errors::{ApplicationError, DomainError};
pub use suggestions::{SuggestionEngine, SuggestionFilter};
