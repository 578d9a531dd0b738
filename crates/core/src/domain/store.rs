use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

pub const GENERIC_STORE_TYPE: &str = "general";

const HOSPITALITY_STORE_TYPES: &[&str] =
    &["restaurant", "bar", "cafe", "café", "brasserie", "bistro", "pub"];

/// Store profile of a user, as returned by the profile provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreProfile {
    pub store_type: String,
    pub city: String,
    pub country: String,
}

impl StoreProfile {
    pub fn generic(country: impl Into<String>) -> Self {
        Self { store_type: GENERIC_STORE_TYPE.to_string(), city: String::new(), country: country.into() }
    }

    pub fn has_city(&self) -> bool {
        !self.city.trim().is_empty()
    }

    /// Restaurants, bars and similar venues whose traffic follows the weather.
    pub fn is_hospitality(&self) -> bool {
        let normalized = self.store_type.to_lowercase();
        normalized
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| HOSPITALITY_STORE_TYPES.contains(&word))
    }
}
