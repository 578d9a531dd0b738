use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;

use super::{format_quantity, Detector};
use crate::domain::suggestion::{ActionType, SuggestionDomain, SuggestionPriority, SuggestionType};
use crate::errors::ApplicationError;
use crate::suggestions::types::{CandidateSuggestion, InventorySnapshot};

const MIN_QUANTITY: f64 = 10.0;
const LOOKBACK_DAYS: i64 = 30;
const WEEKS_IN_LOOKBACK: f64 = 4.0;
const OVERSTOCK_WEEKS: f64 = 3.0;

/// Flags stock that covers three weeks or more of sales.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurstockDetector;

impl SurstockDetector {
    pub fn evaluate(&self, snapshot: &InventorySnapshot) -> Vec<CandidateSuggestion> {
        let mut candidates = Vec::new();

        for product in snapshot.products.iter().filter(|product| product.current_quantity >= MIN_QUANTITY)
        {
            let monthly_total = snapshot.units_sold_last_days(&product.id, LOOKBACK_DAYS);
            let weekly_avg = monthly_total / WEEKS_IN_LOOKBACK;
            if product.current_quantity < weekly_avg * OVERSTOCK_WEEKS {
                continue;
            }

            let quantity = format_quantity(product.current_quantity);
            let (weeks_of_stock, message) = if weekly_avg > 0.0 {
                let weeks = (product.current_quantity / weekly_avg).floor() as i64;
                (
                    Some(weeks),
                    format!(
                        "{} has {quantity} {} in stock, about {weeks} weeks of sales. A promotion would free up cash and space.",
                        product.name, product.unit
                    ),
                )
            } else {
                (
                    None,
                    format!(
                        "{} has {quantity} {} in stock and no sales in the last 30 days. A promotion would free up cash and space.",
                        product.name, product.unit
                    ),
                )
            };

            let candidate = CandidateSuggestion::new(
                SuggestionType::Surstock,
                SuggestionDomain::Stock,
                SuggestionPriority::Medium,
                format!("Overstock on {}", product.name),
                message,
            )
            .for_product(&product.id)
            .with_action(
                ActionType::CreatePromotion,
                json!({
                    "product_id": product.id.0,
                    "quantity": product.current_quantity,
                    "weekly_average": weekly_avg,
                    "weeks_of_stock": weeks_of_stock,
                }),
            );

            // Units held beyond three weeks of sales.
            let excess = product.current_quantity - weekly_avg * OVERSTOCK_WEEKS;
            candidates.push(match Decimal::from_f64_retain(excess) {
                Some(units) => candidate.with_impact_value(units.round_dp(1)),
                None => candidate,
            });
        }

        candidates
    }
}

#[async_trait]
impl Detector for SurstockDetector {
    fn name(&self) -> &'static str {
        "surstock"
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
    use rust_decimal::Decimal;

    use super::SurstockDetector;
    use crate::domain::suggestion::SuggestionPriority;
    use crate::suggestions::detectors::fixtures::{product, SnapshotBuilder};

    #[test]
    fn exactly_three_weeks_of_stock_triggers() {
        // 40 units over 30 days -> weekly average 10; 30 in stock = 3x.
        let snapshot = SnapshotBuilder::new()
            .product(product("p-flour", "Flour", 30.0, 5.0))
            .sale("p-flour", 3, 20.0)
            .sale("p-flour", 20, 20.0)
            .build();
        let candidates = SurstockDetector.evaluate(&snapshot);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].priority, SuggestionPriority::Medium);
        assert_eq!(candidates[0].action_data["weeks_of_stock"], 3);
    }

    #[test]
    fn just_below_three_weeks_does_not_trigger() {
        let snapshot = SnapshotBuilder::new()
            .product(product("p-flour", "Flour", 29.9, 5.0))
            .sale("p-flour", 3, 40.0)
            .build();

        assert!(SurstockDetector.evaluate(&snapshot).is_empty());
    }

    #[test]
    fn unsold_stock_is_reported_without_week_count() {
        let snapshot = SnapshotBuilder::new()
            .product(product("p-jam", "Jam", 12.0, 2.0))
            .product(product("p-small", "Small lot", 9.0, 2.0))
            .build();
        let candidates = SurstockDetector.evaluate(&snapshot);

        assert_eq!(candidates.len(), 1, "quantities under ten are never overstock");
        assert!(candidates[0].action_data["weeks_of_stock"].is_null());
        assert!(candidates[0].message.contains("no sales"));
        assert_eq!(candidates[0].impact_value, Some(Decimal::from(12)));
    }

    #[test]
    fn impact_counts_units_beyond_three_weeks() {
        // Weekly average 10, so 52 units hold 22 beyond three weeks.
        let snapshot = SnapshotBuilder::new()
            .product(product("p-flour", "Flour", 52.0, 5.0))
            .sale("p-flour", 3, 40.0)
            .build();
        let candidates = SurstockDetector.evaluate(&snapshot);

        assert_eq!(candidates[0].impact_value, Some(Decimal::from(22)));
    }
}
