use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::store::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub String);

/// Point-in-time view of a product as handed over by the product repository.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub user_id: UserId,
    pub name: String,
    pub current_quantity: f64,
    pub unit: String,
    pub alert_threshold: f64,
    pub supplier: Option<String>,
    pub category: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl ProductSnapshot {
    pub fn has_stock(&self) -> bool {
        self.current_quantity > 0.0
    }

    pub fn is_at_or_below_threshold(&self) -> bool {
        self.current_quantity <= self.alert_threshold
    }

    /// True when the quantity is within `factor` times the alert threshold.
    pub fn is_stock_within(&self, factor: f64) -> bool {
        self.current_quantity <= self.alert_threshold * factor
    }

    /// Whole days until the expiry date, rounded up. `None` without an expiry
    /// date or once it has passed.
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        let expiry = self.expiry_date?;
        let remaining = (expiry - now).num_seconds();
        if remaining <= 0 {
            return None;
        }
        Some((remaining + 86_399) / 86_400)
    }

    /// Lower-cased name and category, used by keyword matchers.
    pub fn search_text(&self) -> String {
        let mut text = self.name.to_lowercase();
        if let Some(category) = &self.category {
            text.push(' ');
            text.push_str(&category.to_lowercase());
        }
        text
    }
}
