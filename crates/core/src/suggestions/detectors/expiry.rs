use async_trait::async_trait;
use serde_json::json;

use super::{format_quantity, Detector};
use crate::domain::suggestion::{ActionType, SuggestionDomain, SuggestionPriority, SuggestionType};
use crate::errors::ApplicationError;
use crate::suggestions::types::{CandidateSuggestion, InventorySnapshot};

const CRITICAL_DAYS: i64 = 1;
const HIGH_DAYS: i64 = 3;

/// Flags stocked products whose expiry date is at most three days away.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpiryDetector;

impl ExpiryDetector {
    pub fn evaluate(&self, snapshot: &InventorySnapshot) -> Vec<CandidateSuggestion> {
        let mut candidates = Vec::new();

        for product in snapshot.products.iter().filter(|product| product.has_stock()) {
            let (Some(days_left), Some(expiry_date)) =
                (product.days_until_expiry(snapshot.now), product.expiry_date)
            else {
                continue;
            };

            let quantity = format_quantity(product.current_quantity);
            let action_data = json!({
                "product_id": product.id.0,
                "quantity": product.current_quantity,
                "unit": product.unit,
                "days_left": days_left,
                "expiry_date": expiry_date.to_rfc3339(),
            });

            if days_left <= CRITICAL_DAYS {
                candidates.push(
                    CandidateSuggestion::new(
                        SuggestionType::Expiry,
                        SuggestionDomain::Stock,
                        SuggestionPriority::Critical,
                        format!("{} expires tomorrow", product.name),
                        format!(
                            "{} ({quantity} {}) expires tomorrow. Sell it or use it today to avoid waste.",
                            product.name, product.unit
                        ),
                    )
                    .for_product(&product.id)
                    .with_action(ActionType::UseBeforeExpiry, action_data)
                    .expiring_at(expiry_date),
                );
            } else if days_left <= HIGH_DAYS {
                candidates.push(
                    CandidateSuggestion::new(
                        SuggestionType::Expiry,
                        SuggestionDomain::Stock,
                        SuggestionPriority::High,
                        format!("{} expires in {days_left} days", product.name),
                        format!(
                            "{} ({quantity} {}) expires in {days_left} days. Plan a promotion or use it first.",
                            product.name, product.unit
                        ),
                    )
                    .for_product(&product.id)
                    .with_action(ActionType::UseBeforeExpiry, action_data),
                );
            }
        }

        candidates
    }
}

#[async_trait]
impl Detector for ExpiryDetector {
    fn name(&self) -> &'static str {
        "expiry"
    }

    async fn detect(
        &self,
        snapshot: &InventorySnapshot,
    ) -> Result<Vec<CandidateSuggestion>, ApplicationError> {
        Ok(self.evaluate(snapshot))
    }
}
