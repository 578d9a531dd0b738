//! Proactive inventory suggestions.
//!
//! Detectors look at a store's products and sales and propose candidates.
//! The engine fingerprints them, drops the ones still active, scores the
//! rest and hands them to the store. Engagement tracking decides when a
//! popup may interrupt the user.

pub mod detectors;
mod engagement;
mod engine;
mod fingerprint;
pub mod memory;
pub mod ports;
mod scoring;
mod types;

pub use detectors::Detector;
pub use engagement::EngagementPolicy;
pub use engine::{EngineCollaborators, EngineSettings, SuggestionEngine};
pub use fingerprint::{content_hash, MESSAGE_PREFIX_CHARS};
pub use scoring::{severity_for, SeverityModel, MAX_SEVERITY_SCORE, MIN_SEVERITY_SCORE};
pub use types::*;
