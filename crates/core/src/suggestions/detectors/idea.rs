use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{format_quantity, Detector};
use crate::domain::product::ProductSnapshot;
use crate::domain::suggestion::{ActionType, SuggestionDomain, SuggestionPriority, SuggestionType};
use crate::errors::ApplicationError;
use crate::suggestions::ports::TextGenerator;
use crate::suggestions::types::{CandidateSuggestion, InventorySnapshot};

pub const IDEA_SYSTEM_INSTRUCTION: &str = "You are a retail and food-service advisor for small independent stores. \
Respond only with valid JSON of the form {\"titre\": string, \"description\": string, \"produits_utilises\": [string]}. \
Do not add any text outside the JSON object.";

const MAX_PRODUCTS: usize = 5;
const EXPIRING_WITHIN_DAYS: i64 = 3;
const OVERSTOCK_FACTOR: f64 = 3.0;

/// A creative idea returned by the language service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedIdea {
    pub titre: String,
    pub description: String,
    pub produits_utilises: Vec<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdeaParseError {
    #[error("response is not valid idea JSON: {0}")]
    InvalidJson(String),
    #[error("idea is missing a {0}")]
    MissingField(&'static str),
}

/// Parses a language-service reply, tolerating a surrounding code fence.
pub fn parse_idea_response(raw: &str) -> Result<GeneratedIdea, IdeaParseError> {
    let body = strip_code_fence(raw);
    let idea: GeneratedIdea =
        serde_json::from_str(body).map_err(|error| IdeaParseError::InvalidJson(error.to_string()))?;

    if idea.titre.trim().is_empty() {
        return Err(IdeaParseError::MissingField("titre"));
    }
    if idea.description.trim().is_empty() {
        return Err(IdeaParseError::MissingField("description"));
    }
    Ok(GeneratedIdea {
        titre: idea.titre.trim().to_string(),
        description: idea.description.trim().to_string(),
        produits_utilises: idea.produits_utilises,
    })
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Asks the language service for one sellable idea built from at-risk products.
pub struct UseItUpDetector {
    generator: Arc<dyn TextGenerator>,
    expiry: Duration,
}

impl UseItUpDetector {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator, expiry: Duration::hours(12) }
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Expiring products first, then overstocked ones.
    pub fn select_products<'a>(&self, snapshot: &'a InventorySnapshot) -> Vec<&'a ProductSnapshot> {
        let stocked = || snapshot.products.iter().filter(|product| product.has_stock());
        let expiring = stocked().filter(|product| {
            product
                .days_until_expiry(snapshot.now)
                .is_some_and(|days| days <= EXPIRING_WITHIN_DAYS)
        });
        let overstocked = stocked().filter(|product| {
            product.alert_threshold > 0.0
                && product.current_quantity > product.alert_threshold * OVERSTOCK_FACTOR
        });

        let mut selected: Vec<&ProductSnapshot> = Vec::new();
        for product in expiring.chain(overstocked) {
            if selected.len() == MAX_PRODUCTS {
                break;
            }
            if !selected.iter().any(|existing| existing.id == product.id) {
                selected.push(product);
            }
        }
        selected
    }

    pub fn build_prompt(&self, snapshot: &InventorySnapshot, products: &[&ProductSnapshot]) -> String {
        let mut prompt = format!(
            "Store type: {}.\nThese products need to be sold quickly:\n",
            snapshot.store.store_type
        );
        for product in products {
            let reason = match product.days_until_expiry(snapshot.now) {
                Some(days) if days <= EXPIRING_WITHIN_DAYS => format!("expires in {days} day(s)"),
                _ => "overstocked".to_string(),
            };
            prompt.push_str(&format!(
                "- {}: {} {} ({reason})\n",
                product.name,
                format_quantity(product.current_quantity),
                product.unit
            ));
        }
        prompt.push_str(
            "Suggest one creative and sellable idea (a special, a bundle or a recipe) that uses some of these products.",
        );
        prompt
    }
}

#[async_trait]
impl Detector for UseItUpDetector {
    fn name(&self) -> &'static str {
        "use_it_up"
    }

    async fn detect(
        &self,
        snapshot: &InventorySnapshot,
    ) -> Result<Vec<CandidateSuggestion>, ApplicationError> {
        let products = self.select_products(snapshot);
        if products.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = self.build_prompt(snapshot, &products);
        let raw = self.generator.generate(IDEA_SYSTEM_INSTRUCTION, &prompt).await?;

        let idea = match parse_idea_response(&raw) {
            Ok(idea) => idea,
            Err(error) => {
                tracing::warn!(
                    event_name = "suggestions.idea.malformed",
                    user_id = %snapshot.user_id.0,
                    error = %error,
                    "discarding malformed idea response"
                );
                return Ok(Vec::new());
            }
        };

        let product_ids = products.iter().map(|product| product.id.0.clone()).collect::<Vec<_>>();
        Ok(vec![CandidateSuggestion::new(
            SuggestionType::Idea,
            SuggestionDomain::Sales,
            SuggestionPriority::Medium,
            idea.titre.clone(),
            idea.description.clone(),
        )
        .with_action(
            ActionType::ApplyIdea,
            json!({
                "products_used": idea.produits_utilises,
                "candidate_product_ids": product_ids,
            }),
        )
        .expiring_at(snapshot.now + self.expiry)])
    }
}
