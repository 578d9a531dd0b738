//! Types for the Suggestion Engine

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::{ProductId, ProductSnapshot};
use crate::domain::sales::SaleRecord;
use crate::domain::store::{StoreProfile, UserId};
use crate::domain::suggestion::{
    ActionType, Suggestion, SuggestionDomain, SuggestionPriority, SuggestionStatus,
    SuggestionType,
};

/// Everything the detectors look at for one user, loaded once per run.
#[derive(Debug, Clone)]
pub struct InventorySnapshot {
    pub user_id: UserId,
    pub now: DateTime<Utc>,
    pub store: StoreProfile,
    pub products: Vec<ProductSnapshot>,
    sales: HashMap<ProductId, Vec<SaleRecord>>,
}

impl InventorySnapshot {
    pub fn new(
        user_id: UserId,
        now: DateTime<Utc>,
        store: StoreProfile,
        products: Vec<ProductSnapshot>,
        sales: HashMap<ProductId, Vec<SaleRecord>>,
    ) -> Self {
        Self { user_id, now, store, products, sales }
    }

    pub fn sales_for(&self, product_id: &ProductId) -> &[SaleRecord] {
        self.sales.get(product_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Units sold in `(now - from_days_ago, now - to_days_ago]`.
    pub fn units_sold_between(
        &self,
        product_id: &ProductId,
        from_days_ago: i64,
        to_days_ago: i64,
    ) -> f64 {
        let start = self.now - Duration::days(from_days_ago);
        let end = self.now - Duration::days(to_days_ago);
        self.sales_for(product_id)
            .iter()
            .filter(|sale| sale.sale_date > start && sale.sale_date <= end)
            .map(|sale| sale.quantity_sold)
            .sum()
    }

    pub fn units_sold_last_days(&self, product_id: &ProductId, days: i64) -> f64 {
        self.units_sold_between(product_id, days, 0)
    }

    pub fn product(&self, product_id: &ProductId) -> Option<&ProductSnapshot> {
        self.products.iter().find(|product| &product.id == product_id)
    }
}

/// A detector finding that has not been fingerprinted or persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSuggestion {
    pub suggestion_type: SuggestionType,
    pub domain: SuggestionDomain,
    pub priority: SuggestionPriority,
    /// Overrides the priority-derived score for continuous-valued findings.
    pub severity_score: Option<u8>,
    pub title: String,
    pub message: String,
    pub action_type: Option<ActionType>,
    pub action_data: serde_json::Value,
    pub product_id: Option<ProductId>,
    pub impact_value: Option<Decimal>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CandidateSuggestion {
    pub fn new(
        suggestion_type: SuggestionType,
        domain: SuggestionDomain,
        priority: SuggestionPriority,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            suggestion_type,
            domain,
            priority,
            severity_score: None,
            title: title.into(),
            message: message.into(),
            action_type: None,
            action_data: serde_json::Value::Null,
            product_id: None,
            impact_value: None,
            expires_at: None,
        }
    }

    pub fn for_product(mut self, product_id: &ProductId) -> Self {
        self.product_id = Some(product_id.clone());
        self
    }

    pub fn with_action(mut self, action_type: ActionType, action_data: serde_json::Value) -> Self {
        self.action_type = Some(action_type);
        self.action_data = action_data;
        self
    }

    pub fn with_severity_score(mut self, severity_score: u8) -> Self {
        self.severity_score = Some(severity_score);
        self
    }

    pub fn with_impact_value(mut self, impact_value: Decimal) -> Self {
        self.impact_value = Some(impact_value);
        self
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Outcome of a store insert guarded by the active-fingerprint uniqueness rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Read filters for listing a user's suggestions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuggestionFilter {
    pub status: Option<SuggestionStatus>,
    pub domain: Option<SuggestionDomain>,
    pub limit: Option<u32>,
}

impl SuggestionFilter {
    pub fn with_status(mut self, status: SuggestionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_domain(mut self, domain: SuggestionDomain) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, suggestion: &Suggestion) -> bool {
        self.status.map_or(true, |status| suggestion.status == status)
            && self.domain.map_or(true, |domain| suggestion.domain == domain)
    }
}

/// A suggestion together with its product, when that product still exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionWithProduct {
    pub suggestion: Suggestion,
    pub product: Option<ProductSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFailure {
    pub suggestion_type: SuggestionType,
    pub content_hash: String,
    pub error: String,
}

/// Detailed result of one generation run for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationReport {
    pub created: Vec<Suggestion>,
    pub duplicates_skipped: usize,
    pub failed_detectors: Vec<String>,
    pub persistence_failures: Vec<CandidateFailure>,
}

/// One day of a weather forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub temp_min: f64,
    pub temp_max: f64,
    pub condition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherForecast {
    pub forecasts: Vec<DailyForecast>,
}

impl WeatherForecast {
    pub fn max_temperature(&self) -> Option<f64> {
        self.forecasts.iter().map(|day| day.temp_max).reduce(f64::max)
    }

    pub fn min_temperature(&self) -> Option<f64> {
        self.forecasts.iter().map(|day| day.temp_min).reduce(f64::min)
    }
}
