use async_trait::async_trait;
use serde_json::json;

use super::{format_quantity, Detector};
use crate::domain::suggestion::{ActionType, SuggestionDomain, SuggestionPriority, SuggestionType};
use crate::errors::ApplicationError;
use crate::suggestions::types::{CandidateSuggestion, InventorySnapshot};

const VELOCITY_WINDOW_DAYS: i64 = 7;
const CRITICAL_DAYS: i64 = 1;
const HIGH_DAYS: i64 = 3;

/// Projects stock-outs for products at or below their alert threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuptureDetector;

impl RuptureDetector {
    pub fn evaluate(&self, snapshot: &InventorySnapshot) -> Vec<CandidateSuggestion> {
        let mut candidates = Vec::new();

        for product in snapshot.products.iter().filter(|product| product.is_at_or_below_threshold()) {
            let weekly_total = snapshot.units_sold_last_days(&product.id, VELOCITY_WINDOW_DAYS);
            let weekly_avg = weekly_total / VELOCITY_WINDOW_DAYS as f64;
            if weekly_avg <= 0.0 {
                continue;
            }

            let days_until_rupture = (product.current_quantity.max(0.0) / weekly_avg).floor() as i64;
            let priority = if days_until_rupture <= CRITICAL_DAYS {
                SuggestionPriority::Critical
            } else if days_until_rupture <= HIGH_DAYS {
                SuggestionPriority::High
            } else {
                continue;
            };

            let reorder_quantity = (weekly_avg * VELOCITY_WINDOW_DAYS as f64).ceil();
            let horizon = match days_until_rupture {
                0 => "today".to_string(),
                1 => "within 1 day".to_string(),
                days => format!("within {days} days"),
            };

            candidates.push(
                CandidateSuggestion::new(
                    SuggestionType::Rupture,
                    SuggestionDomain::Stock,
                    priority,
                    format!("{} is about to run out", product.name),
                    format!(
                        "{} will run out {horizon} at the current pace ({} {} left, {} sold per day). Reorder about {} {}.",
                        product.name,
                        format_quantity(product.current_quantity),
                        product.unit,
                        format_quantity(weekly_avg),
                        format_quantity(reorder_quantity),
                        product.unit,
                    ),
                )
                .for_product(&product.id)
                .with_action(
                    ActionType::Reorder,
                    json!({
                        "product_id": product.id.0,
                        "suggested_quantity": reorder_quantity,
                        "unit": product.unit,
                        "days_until_rupture": days_until_rupture,
                        "supplier": product.supplier,
                    }),
                ),
            );
        }

        candidates
    }
}

#[async_trait]
impl Detector for RuptureDetector {
    fn name(&self) -> &'static str {
        "rupture"
    }

    async fn detect(
        &self,
        snapshot: &InventorySnapshot,
    ) -> Result<Vec<CandidateSuggestion>, ApplicationError> {
        Ok(self.evaluate(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::RuptureDetector;
    use crate::domain::suggestion::{ActionType, SuggestionPriority};
    use crate::suggestions::detectors::fixtures::{product, SnapshotBuilder};

    #[test]
    fn croissant_with_one_day_of_cover_is_critical_with_weekly_reorder() {
        let mut builder = SnapshotBuilder::new().product(product("p-croissant", "Croissant", 5.0, 10.0));
        for day in 0..7 {
            builder = builder.sale("p-croissant", day, 10.0);
        }
        let candidates = RuptureDetector.evaluate(&builder.build());

        assert_eq!(candidates.len(), 1);
        let candidate = &candidates[0];
        assert_eq!(candidate.priority, SuggestionPriority::Critical);
        assert_eq!(candidate.action_type, Some(ActionType::Reorder));
        assert_eq!(candidate.action_data["suggested_quantity"], 70.0);
        assert_eq!(candidate.action_data["days_until_rupture"], 0);
    }

    #[test]
    fn two_to_three_days_of_cover_is_high() {
        // 14 units over 7 days -> 2 per day; 6 in stock -> 3 days.
        let snapshot = SnapshotBuilder::new()
            .product(product("p-baguette", "Baguette", 6.0, 8.0))
            .sale("p-baguette", 1, 14.0)
            .build();
        let candidates = RuptureDetector.evaluate(&snapshot);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].priority, SuggestionPriority::High);
    }

    #[test]
    fn no_velocity_or_comfortable_cover_yields_nothing() {
        let snapshot = SnapshotBuilder::new()
            .product(product("p-idle", "Idle", 3.0, 10.0))
            .product(product("p-slow", "Slow", 8.0, 10.0))
            .sale("p-slow", 2, 7.0)
            .product(product("p-above", "Above threshold", 50.0, 10.0))
            .sale("p-above", 2, 700.0)
            .build();

        assert!(RuptureDetector.evaluate(&snapshot).is_empty());
    }
}
