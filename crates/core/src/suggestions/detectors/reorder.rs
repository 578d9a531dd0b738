use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Datelike, Weekday};
use serde_json::json;

use super::{weekday_name, Detector};
use crate::domain::product::ProductSnapshot;
use crate::domain::suggestion::{ActionType, SuggestionDomain, SuggestionPriority, SuggestionType};
use crate::errors::ApplicationError;
use crate::suggestions::types::{CandidateSuggestion, InventorySnapshot};

const LOW_STOCK_FACTOR: f64 = 1.5;
const NAMED_PRODUCTS: usize = 3;

/// Weekly order days of the wholesalers the stores commonly order from.
const SUPPLIER_ORDER_DAYS: &[(&str, &[Weekday])] = &[
    ("metro", &[Weekday::Mon, Weekday::Thu]),
    ("promocash", &[Weekday::Tue, Weekday::Fri]),
    ("transgourmet", &[Weekday::Wed]),
    ("pomona", &[Weekday::Mon, Weekday::Wed, Weekday::Fri]),
    ("sysco", &[Weekday::Tue, Weekday::Thu]),
    ("brake", &[Weekday::Mon, Weekday::Thu]),
];

/// Order days for a supplier name, matched case-insensitively on substrings.
pub fn supplier_order_days(supplier: &str) -> Option<&'static [Weekday]> {
    let normalized = supplier.trim().to_lowercase();
    SUPPLIER_ORDER_DAYS
        .iter()
        .find(|(key, _)| normalized.contains(key))
        .map(|(_, days)| *days)
}

/// Reminds the user to order on a supplier's order day when stock is getting low.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReorderReminderDetector;

impl ReorderReminderDetector {
    pub fn evaluate(&self, snapshot: &InventorySnapshot) -> Vec<CandidateSuggestion> {
        let today = snapshot.now.weekday();

        let mut by_supplier: BTreeMap<String, (String, Vec<&ProductSnapshot>)> = BTreeMap::new();
        for product in &snapshot.products {
            let Some(supplier) = product.supplier.as_deref().map(str::trim) else {
                continue;
            };
            if supplier.is_empty() {
                continue;
            }
            by_supplier
                .entry(supplier.to_lowercase())
                .or_insert_with(|| (supplier.to_string(), Vec::new()))
                .1
                .push(product);
        }

        let mut candidates = Vec::new();
        for (display_name, products) in by_supplier.into_values() {
            let Some(days) = supplier_order_days(&display_name) else {
                continue;
            };
            if !days.contains(&today) {
                continue;
            }

            let affected = products
                .into_iter()
                .filter(|product| product.is_stock_within(LOW_STOCK_FACTOR))
                .collect::<Vec<_>>();
            if affected.is_empty() {
                continue;
            }

            let mut names = affected
                .iter()
                .take(NAMED_PRODUCTS)
                .map(|product| product.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            if affected.len() > NAMED_PRODUCTS {
                names.push_str(&format!(" and {} more", affected.len() - NAMED_PRODUCTS));
            }

            candidates.push(
                CandidateSuggestion::new(
                    SuggestionType::ReorderReminder,
                    SuggestionDomain::Operations,
                    SuggestionPriority::High,
                    format!("{} order day: time to reorder", display_name),
                    format!(
                        "Today is {} order day ({}). Running low: {names}.",
                        display_name,
                        weekday_name(today),
                    ),
                )
                .with_action(
                    ActionType::ContactSupplier,
                    json!({
                        "supplier": display_name,
                        "weekday": weekday_name(today).to_lowercase(),
                        "product_ids": affected.iter().map(|product| product.id.0.clone()).collect::<Vec<_>>(),
                    }),
                ),
            );
        }

        candidates
    }
}

#[async_trait]
impl Detector for ReorderReminderDetector {
    fn name(&self) -> &'static str {
        "reorder_reminder"
    }

    async fn detect(
        &self,
        snapshot: &InventorySnapshot,
    ) -> Result<Vec<CandidateSuggestion>, ApplicationError> {
        Ok(self.evaluate(snapshot))
    }
}
