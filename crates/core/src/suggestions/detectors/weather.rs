use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{format_quantity, Detector};
use crate::domain::product::ProductSnapshot;
use crate::domain::suggestion::{ActionType, SuggestionDomain, SuggestionPriority, SuggestionType};
use crate::errors::ApplicationError;
use crate::suggestions::ports::WeatherService;
use crate::suggestions::types::{CandidateSuggestion, DailyForecast, InventorySnapshot, WeatherForecast};

pub const DEFAULT_FORECAST_DAYS: u8 = 3;
const HOT_MAX_TEMPERATURE: f64 = 28.0;
const COLD_MIN_TEMPERATURE: f64 = 5.0;
const LOW_STOCK_FACTOR: f64 = 2.0;
const MAX_PRODUCT_SUGGESTIONS: usize = 3;

const HOT_WEATHER_KEYWORDS: &[&str] = &[
    "glace", "ice cream", "boisson", "drink", "soda", "eau", "water", "bière", "beer", "salade",
    "salad", "sorbet", "rosé", "limonade", "lemonade", "fruit",
];

const COLD_WEATHER_KEYWORDS: &[&str] = &[
    "soupe", "soup", "chocolat", "chocolate", "café", "coffee", "thé", "tea", "vin chaud",
    "raclette", "fondue", "potage",
];

const RAIN_MARKERS: &[&str] = &["rain", "pluie", "storm", "orage", "drizzle", "shower"];
const SUN_MARKERS: &[&str] = &["sun", "clear", "soleil"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spell {
    Hot,
    Cold,
}

impl Spell {
    fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Hot => HOT_WEATHER_KEYWORDS,
            Self::Cold => COLD_WEATHER_KEYWORDS,
        }
    }
}

/// Matches weather-sensitive products against the store's short-range forecast.
pub struct WeatherImpactDetector {
    service: Arc<dyn WeatherService>,
    forecast_days: u8,
}

impl WeatherImpactDetector {
    pub fn new(service: Arc<dyn WeatherService>) -> Self {
        Self { service, forecast_days: DEFAULT_FORECAST_DAYS }
    }

    pub fn with_forecast_days(mut self, forecast_days: u8) -> Self {
        self.forecast_days = forecast_days.max(1);
        self
    }

    pub fn evaluate(
        &self,
        snapshot: &InventorySnapshot,
        forecast: &WeatherForecast,
    ) -> Vec<CandidateSuggestion> {
        let mut candidates = Vec::new();

        let spell = match (forecast.max_temperature(), forecast.min_temperature()) {
            (Some(max), _) if max >= HOT_MAX_TEMPERATURE => Some((Spell::Hot, max)),
            (_, Some(min)) if min <= COLD_MIN_TEMPERATURE => Some((Spell::Cold, min)),
            _ => None,
        };

        if let Some((spell, temperature)) = spell {
            candidates.extend(
                snapshot
                    .products
                    .iter()
                    .filter(|product| product.is_stock_within(LOW_STOCK_FACTOR))
                    .filter(|product| matches_keywords(product, spell.keywords()))
                    .take(MAX_PRODUCT_SUGGESTIONS)
                    .map(|product| product_candidate(product, spell, temperature)),
            );
        }

        if snapshot.store.is_hospitality() {
            if let Some(advisory) = forecast.forecasts.first().and_then(traffic_advisory) {
                candidates.push(advisory);
            }
        }

        candidates
    }
}

fn matches_keywords(product: &ProductSnapshot, keywords: &[&str]) -> bool {
    let text = product.search_text();
    keywords.iter().any(|keyword| text.contains(keyword))
}

fn product_candidate(product: &ProductSnapshot, spell: Spell, temperature: f64) -> CandidateSuggestion {
    let (title, message) = match spell {
        Spell::Hot => (
            format!("Heat ahead: stock up on {}", product.name),
            format!(
                "Up to {temperature:.0}°C forecast in the coming days and only {} {} of {} left. Demand usually rises with the heat.",
                format_quantity(product.current_quantity),
                product.unit,
                product.name,
            ),
        ),
        Spell::Cold => (
            format!("Cold snap ahead: stock up on {}", product.name),
            format!(
                "Down to {temperature:.0}°C forecast in the coming days and only {} {} of {} left. Demand usually rises in the cold.",
                format_quantity(product.current_quantity),
                product.unit,
                product.name,
            ),
        ),
    };

    CandidateSuggestion::new(
        SuggestionType::Weather,
        SuggestionDomain::Stock,
        SuggestionPriority::Medium,
        title,
        message,
    )
    .for_product(&product.id)
    .with_action(
        ActionType::Reorder,
        json!({
            "product_id": product.id.0,
            "quantity": product.current_quantity,
            "temperature": temperature,
            "weather": match spell {
                Spell::Hot => "hot",
                Spell::Cold => "cold",
            },
        }),
    )
}

fn traffic_advisory(day: &DailyForecast) -> Option<CandidateSuggestion> {
    let condition = day.condition.to_lowercase();
    let (title, message) = if RAIN_MARKERS.iter().any(|marker| condition.contains(marker)) {
        (
            "Rain expected: plan for fewer walk-ins",
            format!(
                "{} is forecast for {}. Expect quieter terrace traffic and push delivery or takeaway.",
                day.condition, day.date
            ),
        )
    } else if SUN_MARKERS.iter().any(|marker| condition.contains(marker)) {
        (
            "Sunny day ahead: expect more customers",
            format!(
                "{} is forecast for {}. Prepare the terrace and extra staff for a busier service.",
                day.condition, day.date
            ),
        )
    } else {
        return None;
    };

    Some(
        CandidateSuggestion::new(
            SuggestionType::Weather,
            SuggestionDomain::Operations,
            SuggestionPriority::Low,
            title,
            message,
        )
        .with_action(
            ActionType::PrepareStock,
            json!({ "date": day.date.to_string(), "condition": day.condition }),
        ),
    )
}

#[async_trait]
impl Detector for WeatherImpactDetector {
    fn name(&self) -> &'static str {
        "weather"
    }

    async fn detect(
        &self,
        snapshot: &InventorySnapshot,
    ) -> Result<Vec<CandidateSuggestion>, ApplicationError> {
        if !snapshot.store.has_city() {
            return Ok(Vec::new());
        }

        let Some(forecast) = self
            .service
            .forecast(&snapshot.store.city, &snapshot.store.country, self.forecast_days)
            .await
        else {
            tracing::warn!(
                event_name = "suggestions.weather.unavailable",
                user_id = %snapshot.user_id.0,
                city = %snapshot.store.city,
                "weather forecast unavailable, skipping weather suggestions"
            );
            return Ok(Vec::new());
        };

        Ok(self.evaluate(snapshot, &forecast))
    }
}
