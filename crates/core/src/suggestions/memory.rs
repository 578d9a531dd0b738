//! In-process adapters for the engine ports, used by tests and dry runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use super::ports::{
    PreferencesStore, ProductSource, SalesSource, StoreProfileProvider, SuggestionStore,
};
use super::types::{InsertOutcome, SuggestionFilter};
use crate::domain::preferences::UserSuggestionPreferences;
use crate::domain::product::{ProductId, ProductSnapshot};
use crate::domain::sales::SaleRecord;
use crate::domain::store::{StoreProfile, UserId};
use crate::domain::suggestion::{Suggestion, SuggestionId, SuggestionStatus};
use crate::errors::ApplicationError;

/// Enforces the same active-fingerprint uniqueness as the SQL store.
#[derive(Default)]
pub struct InMemorySuggestionStore {
    suggestions: RwLock<HashMap<String, Suggestion>>,
}

impl InMemorySuggestionStore {
    pub async fn all(&self) -> Vec<Suggestion> {
        let mut rows = self.suggestions.read().await.values().cloned().collect::<Vec<_>>();
        rows.sort_by(|left, right| left.created_at.cmp(&right.created_at).then(left.id.0.cmp(&right.id.0)));
        rows
    }
}

#[async_trait]
impl SuggestionStore for InMemorySuggestionStore {
    async fn find_active_by_hash(
        &self,
        user_id: &UserId,
        content_hash: &str,
    ) -> Result<Option<Suggestion>, ApplicationError> {
        let suggestions = self.suggestions.read().await;
        Ok(suggestions
            .values()
            .find(|row| {
                &row.user_id == user_id && row.content_hash == content_hash && row.status.is_active()
            })
            .cloned())
    }

    async fn insert(&self, suggestion: &Suggestion) -> Result<InsertOutcome, ApplicationError> {
        let mut suggestions = self.suggestions.write().await;
        let duplicate = suggestion.status.is_active()
            && suggestions.values().any(|row| {
                row.user_id == suggestion.user_id
                    && row.content_hash == suggestion.content_hash
                    && row.status.is_active()
            });
        if duplicate {
            return Ok(InsertOutcome::Duplicate);
        }
        suggestions.insert(suggestion.id.0.clone(), suggestion.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn find_by_id(&self, id: &SuggestionId) -> Result<Option<Suggestion>, ApplicationError> {
        Ok(self.suggestions.read().await.get(&id.0).cloned())
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        filter: &SuggestionFilter,
    ) -> Result<Vec<Suggestion>, ApplicationError> {
        let suggestions = self.suggestions.read().await;
        let mut rows = suggestions
            .values()
            .filter(|row| &row.user_id == user_id && filter.matches(row))
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|left, right| {
            right
                .severity_score
                .cmp(&left.severity_score)
                .then(right.created_at.cmp(&left.created_at))
                .then(left.id.0.cmp(&right.id.0))
        });
        if let Some(limit) = filter.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn apply_transition(
        &self,
        expected: SuggestionStatus,
        next: &Suggestion,
    ) -> Result<bool, ApplicationError> {
        let mut suggestions = self.suggestions.write().await;
        match suggestions.get_mut(&next.id.0) {
            Some(current) if current.status == expected => {
                *current = next.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_read(
        &self,
        id: &SuggestionId,
        at: DateTime<Utc>,
    ) -> Result<bool, ApplicationError> {
        let mut suggestions = self.suggestions.write().await;
        let Some(current) = suggestions.get_mut(&id.0) else {
            return Ok(false);
        };
        current.is_read = true;
        current.updated_at = at;
        Ok(true)
    }

    async fn unread_count(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, ApplicationError> {
        let suggestions = self.suggestions.read().await;
        Ok(suggestions
            .values()
            .filter(|row| {
                &row.user_id == user_id
                    && !row.is_read
                    && row.status == SuggestionStatus::Pending
                    && !row.is_expired_at(now)
            })
            .count() as u64)
    }

    async fn expire_stale(
        &self,
        now: DateTime<Utc>,
        user_id: Option<&UserId>,
    ) -> Result<u64, ApplicationError> {
        let mut suggestions = self.suggestions.write().await;
        let mut expired = 0;
        for row in suggestions.values_mut().filter(|row| {
            row.status.is_active()
                && row.is_expired_at(now)
                && user_id.map_or(true, |owner| &row.user_id == owner)
        }) {
            row.status = SuggestionStatus::Expired;
            row.updated_at = now;
            expired += 1;
        }
        Ok(expired)
    }
}

#[derive(Default)]
pub struct InMemoryPreferencesStore {
    preferences: RwLock<HashMap<String, UserSuggestionPreferences>>,
}

#[async_trait]
impl PreferencesStore for InMemoryPreferencesStore {
    async fn find(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserSuggestionPreferences>, ApplicationError> {
        Ok(self.preferences.read().await.get(&user_id.0).cloned())
    }

    async fn insert_if_absent(
        &self,
        preferences: &UserSuggestionPreferences,
    ) -> Result<(), ApplicationError> {
        let mut rows = self.preferences.write().await;
        rows.entry(preferences.user_id.0.clone()).or_insert_with(|| preferences.clone());
        Ok(())
    }

    async fn reset_engagement(
        &self,
        user_id: &UserId,
        due_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, ApplicationError> {
        let mut rows = self.preferences.write().await;
        match rows.get_mut(&user_id.0) {
            Some(preferences) if preferences.last_engagement_reset_at < due_before => {
                preferences.reset_engagement(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_last_popup_at(
        &self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        self.update(user_id, |preferences| preferences.last_popup_at = Some(at)).await
    }

    async fn set_popup_frequency(
        &self,
        user_id: &UserId,
        minutes: u32,
    ) -> Result<(), ApplicationError> {
        self.update(user_id, |preferences| preferences.popup_frequency_minutes = minutes).await
    }

    async fn increment_engagement(
        &self,
        user_id: &UserId,
        by: u32,
    ) -> Result<(), ApplicationError> {
        self.update(user_id, |preferences| {
            preferences.engagement_score = preferences.engagement_score.saturating_add(by);
        })
        .await
    }
}

impl InMemoryPreferencesStore {
    async fn update(
        &self,
        user_id: &UserId,
        apply: impl FnOnce(&mut UserSuggestionPreferences) + Send,
    ) -> Result<(), ApplicationError> {
        let mut rows = self.preferences.write().await;
        match rows.get_mut(&user_id.0) {
            Some(preferences) => {
                apply(preferences);
                Ok(())
            }
            None => Err(ApplicationError::NotFound(format!(
                "suggestion preferences for user `{}`",
                user_id.0
            ))),
        }
    }
}

/// Products, sales and store profiles held in memory.
#[derive(Default)]
pub struct InMemoryCatalog {
    products: RwLock<Vec<ProductSnapshot>>,
    sales: RwLock<Vec<SaleRecord>>,
    profiles: RwLock<HashMap<String, StoreProfile>>,
}

impl InMemoryCatalog {
    pub async fn upsert_product(&self, product: ProductSnapshot) {
        let mut products = self.products.write().await;
        products.retain(|existing| existing.id != product.id);
        products.push(product);
    }

    pub async fn remove_product(&self, product_id: &ProductId) {
        self.products.write().await.retain(|existing| &existing.id != product_id);
    }

    pub async fn record_sale(&self, sale: SaleRecord) {
        self.sales.write().await.push(sale);
    }

    pub async fn set_store_profile(&self, user_id: &UserId, profile: StoreProfile) {
        self.profiles.write().await.insert(user_id.0.clone(), profile);
    }

    fn in_window(sale: &SaleRecord, product_id: &ProductId, days_back: u32, as_of: DateTime<Utc>) -> bool {
        let start = as_of - Duration::days(i64::from(days_back));
        &sale.product_id == product_id && sale.sale_date > start && sale.sale_date <= as_of
    }
}

#[async_trait]
impl ProductSource for InMemoryCatalog {
    async fn products_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ProductSnapshot>, ApplicationError> {
        let products = self.products.read().await;
        Ok(products.iter().filter(|product| &product.user_id == user_id).cloned().collect())
    }
}

#[async_trait]
impl SalesSource for InMemoryCatalog {
    async fn sales_for_product(
        &self,
        product_id: &ProductId,
        days_back: u32,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<SaleRecord>, ApplicationError> {
        let sales = self.sales.read().await;
        Ok(sales
            .iter()
            .filter(|sale| Self::in_window(sale, product_id, days_back, as_of))
            .cloned()
            .collect())
    }

    async fn total_sold(
        &self,
        product_id: &ProductId,
        days_back: u32,
        as_of: DateTime<Utc>,
    ) -> Result<f64, ApplicationError> {
        let sales = self.sales.read().await;
        Ok(sales
            .iter()
            .filter(|sale| Self::in_window(sale, product_id, days_back, as_of))
            .map(|sale| sale.quantity_sold)
            .sum())
    }
}

#[async_trait]
impl StoreProfileProvider for InMemoryCatalog {
    async fn store_info(&self, user_id: &UserId) -> Result<Option<StoreProfile>, ApplicationError> {
        Ok(self.profiles.read().await.get(&user_id.0).cloned())
    }
}
