//! Severity and priority model for suggestions

use chrono::{DateTime, Duration, Utc};

use super::fingerprint::content_hash;
use super::types::CandidateSuggestion;
use crate::domain::store::UserId;
use crate::domain::suggestion::{Suggestion, SuggestionId, SuggestionPriority, SuggestionStatus};

pub const MIN_SEVERITY_SCORE: u8 = 25;
pub const MAX_SEVERITY_SCORE: u8 = 100;

/// Fixed score for a qualitative priority.
pub fn severity_for(priority: SuggestionPriority) -> u8 {
    match priority {
        SuggestionPriority::Critical => 100,
        SuggestionPriority::High => 75,
        SuggestionPriority::Medium => 50,
        SuggestionPriority::Low => 25,
    }
}

/// Turns detector candidates into storable suggestions.
#[derive(Debug, Clone, Copy)]
pub struct SeverityModel {
    default_expiry: Duration,
}

impl SeverityModel {
    pub fn new(default_expiry: Duration) -> Self {
        Self { default_expiry }
    }

    pub fn default_expiry(&self) -> Duration {
        self.default_expiry
    }

    /// Explicit scores are clamped into the 25..=100 band.
    pub fn score(&self, candidate: &CandidateSuggestion) -> u8 {
        candidate
            .severity_score
            .map(|score| score.clamp(MIN_SEVERITY_SCORE, MAX_SEVERITY_SCORE))
            .unwrap_or_else(|| severity_for(candidate.priority))
    }

    pub fn annotate(
        &self,
        candidate: CandidateSuggestion,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Suggestion {
        let severity_score = self.score(&candidate);
        let content_hash = content_hash(
            candidate.suggestion_type,
            candidate.product_id.as_ref(),
            &candidate.message,
        );
        let expires_at = candidate.expires_at.unwrap_or(now + self.default_expiry);

        Suggestion {
            id: SuggestionId::generate(),
            user_id: user_id.clone(),
            suggestion_type: candidate.suggestion_type,
            domain: candidate.domain,
            priority: candidate.priority,
            severity_score,
            title: candidate.title,
            message: candidate.message,
            action_type: candidate.action_type,
            action_data: candidate.action_data,
            product_id: candidate.product_id,
            content_hash,
            status: SuggestionStatus::Pending,
            is_read: false,
            impact_value: candidate.impact_value,
            action_result: None,
            expires_at,
            created_at: now,
            updated_at: now,
            viewed_at: None,
            acted_at: None,
        }
    }
}

impl Default for SeverityModel {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}
