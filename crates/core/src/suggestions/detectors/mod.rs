//! Independent heuristics that turn an inventory snapshot into candidates.
//!
//! Rule detectors are pure functions over the snapshot. The weather and
//! use-it-up detectors call out to external services and may fail or time
//! out; the engine isolates each detector so one failure never affects the
//! others.

mod anomaly;
mod expiry;
mod idea;
mod reorder;
mod rupture;
mod surstock;
mod trend;
mod weather;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Weekday;

pub use anomaly::AnomalyDetector;
pub use expiry::ExpiryDetector;
pub use idea::{
    parse_idea_response, GeneratedIdea, IdeaParseError, UseItUpDetector, IDEA_SYSTEM_INSTRUCTION,
};
pub use reorder::{supplier_order_days, ReorderReminderDetector};
pub use rupture::RuptureDetector;
pub use surstock::SurstockDetector;
pub use trend::TrendDetector;
pub use weather::WeatherImpactDetector;

use super::types::{CandidateSuggestion, InventorySnapshot};
use crate::errors::ApplicationError;

#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn detect(
        &self,
        snapshot: &InventorySnapshot,
    ) -> Result<Vec<CandidateSuggestion>, ApplicationError>;
}

/// The detectors that need nothing beyond the snapshot.
pub fn rule_detectors() -> Vec<Arc<dyn Detector>> {
    vec![
        Arc::new(ExpiryDetector),
        Arc::new(RuptureDetector),
        Arc::new(SurstockDetector),
        Arc::new(AnomalyDetector),
        Arc::new(TrendDetector::default()),
        Arc::new(ReorderReminderDetector),
    ]
}

/// Renders a quantity without a trailing `.0` for whole numbers.
pub(crate) fn format_quantity(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        format!("{value:.1}")
    }
}

pub(crate) fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
