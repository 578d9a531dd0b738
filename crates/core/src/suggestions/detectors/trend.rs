use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Datelike, Weekday};
use serde_json::json;

use super::{format_quantity, weekday_name, Detector};
use crate::domain::suggestion::{ActionType, SuggestionDomain, SuggestionPriority, SuggestionType};
use crate::errors::ApplicationError;
use crate::suggestions::types::{CandidateSuggestion, InventorySnapshot};

const LOOKBACK_DAYS: i64 = 30;
const MIN_DISTINCT_WEEKDAYS: usize = 3;
const UPLIFT_RATIO: f64 = 1.3;

/// Day-of-week seasonality: today's weekday selling well above the others.
#[derive(Debug, Clone, Copy)]
pub struct TrendDetector {
    max_suggestions: usize,
}

impl TrendDetector {
    pub fn new(max_suggestions: usize) -> Self {
        Self { max_suggestions }
    }

    pub fn evaluate(&self, snapshot: &InventorySnapshot) -> Vec<CandidateSuggestion> {
        let today = snapshot.now.weekday();
        let window_start = snapshot.now - chrono::Duration::days(LOOKBACK_DAYS);
        let mut ranked = Vec::new();

        for product in &snapshot.products {
            let mut per_weekday: BTreeMap<u32, f64> = BTreeMap::new();
            for sale in snapshot
                .sales_for(&product.id)
                .iter()
                .filter(|sale| sale.sale_date > window_start && sale.sale_date <= snapshot.now)
            {
                *per_weekday.entry(sale.sale_date.weekday().num_days_from_monday()).or_default() +=
                    sale.quantity_sold;
            }
            if per_weekday.len() < MIN_DISTINCT_WEEKDAYS {
                continue;
            }

            let average = per_weekday.values().sum::<f64>() / per_weekday.len() as f64;
            let today_total =
                per_weekday.get(&today.num_days_from_monday()).copied().unwrap_or_default();
            if average <= 0.0 || today_total <= average * UPLIFT_RATIO {
                continue;
            }

            ranked.push((today_total / average, product, today_total, average));
        }

        ranked.sort_by(|left, right| {
            right.0.total_cmp(&left.0).then_with(|| left.1.id.cmp(&right.1.id))
        });

        ranked
            .into_iter()
            .take(self.max_suggestions)
            .map(|(ratio, product, today_total, average)| {
                let uplift = ((ratio - 1.0) * 100.0).round();
                CandidateSuggestion::new(
                    SuggestionType::Trend,
                    SuggestionDomain::Sales,
                    SuggestionPriority::Medium,
                    format!("{} sells best on {}s", product.name, weekday_name(today)),
                    format!(
                        "{} usually sells {uplift:.0}% more on {}s ({} vs {} on other days). Prepare extra stock today.",
                        product.name,
                        weekday_name(today),
                        format_quantity(today_total),
                        format_quantity(average),
                    ),
                )
                .for_product(&product.id)
                .with_action(
                    ActionType::PrepareStock,
                    json!({
                        "product_id": product.id.0,
                        "weekday": weekday_label(today),
                        "weekday_total": today_total,
                        "weekday_average": average,
                        "uplift_percent": uplift,
                    }),
                )
            })
            .collect()
    }
}

fn weekday_label(weekday: Weekday) -> String {
    weekday_name(weekday).to_lowercase()
}

impl Default for TrendDetector {
    fn default() -> Self {
        Self::new(2)
    }
}

#[async_trait]
impl Detector for TrendDetector {
    fn name(&self) -> &'static str {
        "trend"
    }

    async fn detect(
        &self,
        snapshot: &InventorySnapshot,
    ) -> Result<Vec<CandidateSuggestion>, ApplicationError> {
        Ok(self.evaluate(snapshot))
    }
}
