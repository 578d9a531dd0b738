use async_trait::async_trait;
use serde_json::json;

use super::{format_quantity, Detector};
use crate::domain::suggestion::{ActionType, SuggestionDomain, SuggestionPriority, SuggestionType};
use crate::errors::ApplicationError;
use crate::suggestions::types::{CandidateSuggestion, InventorySnapshot};

/// Prior-window volume at or below which changes are treated as noise.
const MIN_PREVIOUS_UNITS: f64 = 5.0;
const DROP_PERCENT: f64 = -30.0;
const SPIKE_PERCENT: f64 = 50.0;

/// Week-over-week sales change per product.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyDetector;

/// A -30% drop scores 75 and deeper drops climb to 100.
pub(crate) fn drop_severity(change: f64) -> u8 {
    (75.0 + (change.abs() - 30.0) * 0.5).round().clamp(75.0, 100.0) as u8
}

/// Spikes stay below the drop band: +50% scores 50, capped at 70.
pub(crate) fn spike_severity(change: f64) -> u8 {
    (50.0 + (change - 50.0) * 0.2).round().clamp(50.0, 70.0) as u8
}

/// Percentage change rounded to one decimal place.
pub(crate) fn change_percent(recent: f64, previous: f64) -> f64 {
    let raw = (recent - previous) / previous * 100.0;
    (raw * 10.0).round() / 10.0
}

impl AnomalyDetector {
    pub fn evaluate(&self, snapshot: &InventorySnapshot) -> Vec<CandidateSuggestion> {
        let mut candidates = Vec::new();

        for product in &snapshot.products {
            let recent = snapshot.units_sold_between(&product.id, 7, 0);
            let previous = snapshot.units_sold_between(&product.id, 14, 7);
            if previous <= MIN_PREVIOUS_UNITS {
                continue;
            }

            let change = change_percent(recent, previous);
            let action_data = json!({
                "product_id": product.id.0,
                "recent_units": recent,
                "previous_units": previous,
                "change_percent": change,
            });

            if change <= DROP_PERCENT {
                candidates.push(
                    CandidateSuggestion::new(
                        SuggestionType::Anomaly,
                        SuggestionDomain::Sales,
                        SuggestionPriority::High,
                        format!("Sales of {} are dropping", product.name),
                        format!(
                            "Sales of {} fell {:.0}% this week ({} vs {} the week before). Check pricing, placement or quality.",
                            product.name,
                            change.abs(),
                            format_quantity(recent),
                            format_quantity(previous),
                        ),
                    )
                    .for_product(&product.id)
                    .with_action(ActionType::ReviewSales, action_data)
                    .with_severity_score(drop_severity(change)),
                );
            } else if change >= SPIKE_PERCENT {
                candidates.push(
                    CandidateSuggestion::new(
                        SuggestionType::Anomaly,
                        SuggestionDomain::Sales,
                        SuggestionPriority::Medium,
                        format!("{} is trending", product.name),
                        format!(
                            "Sales of {} rose {:.0}% this week ({} vs {} the week before). Make sure stock keeps up.",
                            product.name,
                            change,
                            format_quantity(recent),
                            format_quantity(previous),
                        ),
                    )
                    .for_product(&product.id)
                    .with_action(ActionType::PrepareStock, action_data)
                    .with_severity_score(spike_severity(change)),
                );
            }
        }

        candidates
    }
}

#[async_trait]
impl Detector for AnomalyDetector {
    fn name(&self) -> &'static str {
        "anomaly"
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
    use super::{change_percent, AnomalyDetector};
    use crate::suggestions::scoring::SeverityModel;
    use crate::domain::suggestion::SuggestionPriority;
    use crate::suggestions::detectors::fixtures::{product, SnapshotBuilder};

    fn snapshot(recent: f64, previous: f64) -> crate::suggestions::types::InventorySnapshot {
        SnapshotBuilder::new()
            .product(product("p-tart", "Tart", 20.0, 5.0))
            .sale("p-tart", 2, recent)
            .sale("p-tart", 9, previous)
            .build()
    }

    #[test]
    fn thirty_percent_drop_triggers_high_alert() {
        let candidates = AnomalyDetector.evaluate(&snapshot(7.0, 10.0));

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].priority, SuggestionPriority::High);
        assert_eq!(candidates[0].action_data["change_percent"], -30.0);
    }

    #[test]
    fn drop_of_twenty_nine_point_nine_percent_is_ignored() {
        assert_eq!(change_percent(701.0, 1000.0), -29.9);
        assert!(AnomalyDetector.evaluate(&snapshot(701.0, 1000.0)).is_empty());
    }

    #[test]
    fn fifty_percent_rise_is_a_medium_trending_alert() {
        let candidates = AnomalyDetector.evaluate(&snapshot(15.0, 10.0));

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].priority, SuggestionPriority::Medium);
        assert!(candidates[0].title.contains("trending"));
    }

    #[test]
    fn severity_follows_the_size_of_the_change() {
        let model = SeverityModel::new(chrono::Duration::hours(24));
        let score = |recent: f64, previous: f64| {
            let candidates = AnomalyDetector.evaluate(&snapshot(recent, previous));
            model.score(&candidates[0])
        };

        assert_eq!(score(7.0, 10.0), 75);
        assert_eq!(score(4.0, 10.0), 90);
        assert_eq!(score(1.0, 10.0), 100);
        assert_eq!(score(15.0, 10.0), 50);
        assert_eq!(score(30.0, 10.0), 70);
    }

    #[test]
    fn low_prior_volume_never_alerts() {
        assert!(AnomalyDetector.evaluate(&snapshot(0.0, 5.0)).is_empty());
        assert!(AnomalyDetector.evaluate(&snapshot(50.0, 5.0)).is_empty());
    }

    #[test]
    fn moderate_changes_are_quiet() {
        assert!(AnomalyDetector.evaluate(&snapshot(12.0, 10.0)).is_empty());
        assert!(AnomalyDetector.evaluate(&snapshot(8.0, 10.0)).is_empty());
    }
}
