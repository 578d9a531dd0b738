//! Collaborator contracts consumed by the suggestion engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::preferences::UserSuggestionPreferences;
use crate::domain::product::{ProductId, ProductSnapshot};
use crate::domain::sales::SaleRecord;
use crate::domain::store::{StoreProfile, UserId};
use crate::domain::suggestion::{Suggestion, SuggestionId, SuggestionStatus};
use crate::errors::ApplicationError;

use super::types::{InsertOutcome, SuggestionFilter, WeatherForecast};

/// Source of the current time, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn products_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ProductSnapshot>, ApplicationError>;
}

#[async_trait]
pub trait SalesSource: Send + Sync {
    /// Sales of one product dated within `days_back` days before `as_of`.
    async fn sales_for_product(
        &self,
        product_id: &ProductId,
        days_back: u32,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<SaleRecord>, ApplicationError>;

    async fn total_sold(
        &self,
        product_id: &ProductId,
        days_back: u32,
        as_of: DateTime<Utc>,
    ) -> Result<f64, ApplicationError>;
}

#[async_trait]
pub trait StoreProfileProvider: Send + Sync {
    async fn store_info(&self, user_id: &UserId) -> Result<Option<StoreProfile>, ApplicationError>;
}

/// Short-range forecast lookup. Implementations return `None` on any failure.
#[async_trait]
pub trait WeatherService: Send + Sync {
    async fn forecast(&self, city: &str, country: &str, days: u8) -> Option<WeatherForecast>;
}

/// Free-text completion from an external language model.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        system_instruction: &str,
        prompt: &str,
    ) -> Result<String, ApplicationError>;
}

#[async_trait]
pub trait SuggestionStore: Send + Sync {
    async fn find_active_by_hash(
        &self,
        user_id: &UserId,
        content_hash: &str,
    ) -> Result<Option<Suggestion>, ApplicationError>;

    /// Inserts unless an active row with the same `(user_id, content_hash)`
    /// exists, in which case `InsertOutcome::Duplicate` is returned.
    async fn insert(&self, suggestion: &Suggestion) -> Result<InsertOutcome, ApplicationError>;

    async fn find_by_id(&self, id: &SuggestionId) -> Result<Option<Suggestion>, ApplicationError>;

    async fn list_for_user(
        &self,
        user_id: &UserId,
        filter: &SuggestionFilter,
    ) -> Result<Vec<Suggestion>, ApplicationError>;

    /// Compare-and-set write of a lifecycle change. Returns `false` when the
    /// stored status no longer equals `expected`.
    async fn apply_transition(
        &self,
        expected: SuggestionStatus,
        next: &Suggestion,
    ) -> Result<bool, ApplicationError>;

    async fn mark_read(&self, id: &SuggestionId, at: DateTime<Utc>)
        -> Result<bool, ApplicationError>;

    async fn unread_count(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, ApplicationError>;

    /// Moves active rows whose `expires_at <= now` to `expired`, optionally
    /// for one user only. Returns the number of rows changed.
    async fn expire_stale(
        &self,
        now: DateTime<Utc>,
        user_id: Option<&UserId>,
    ) -> Result<u64, ApplicationError>;
}

#[async_trait]
pub trait PreferencesStore: Send + Sync {
    async fn find(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserSuggestionPreferences>, ApplicationError>;

    /// Stores a fresh row; an existing row for the user wins.
    async fn insert_if_absent(
        &self,
        preferences: &UserSuggestionPreferences,
    ) -> Result<(), ApplicationError>;

    /// Zeroes the score when the last reset is older than `due_before`.
    /// Returns whether this call performed the reset.
    async fn reset_engagement(
        &self,
        user_id: &UserId,
        due_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, ApplicationError>;

    async fn set_last_popup_at(
        &self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<(), ApplicationError>;

    async fn set_popup_frequency(
        &self,
        user_id: &UserId,
        minutes: u32,
    ) -> Result<(), ApplicationError>;

    async fn increment_engagement(&self, user_id: &UserId, by: u32)
        -> Result<(), ApplicationError>;
}
