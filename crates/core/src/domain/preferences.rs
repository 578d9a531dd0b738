use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::store::UserId;

pub const DEFAULT_POPUP_FREQUENCY_MINUTES: u32 = 120;
pub const DEFAULT_ENGAGEMENT_RESET_DAYS: i64 = 7;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSuggestionPreferences {
    pub user_id: UserId,
    pub popup_frequency_minutes: u32,
    pub engagement_score: u32,
    pub last_engagement_reset_at: DateTime<Utc>,
    pub last_popup_at: Option<DateTime<Utc>>,
}

impl UserSuggestionPreferences {
    pub fn new(user_id: UserId, popup_frequency_minutes: u32, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            popup_frequency_minutes,
            engagement_score: 0,
            last_engagement_reset_at: now,
            last_popup_at: None,
        }
    }

    pub fn engagement_reset_due(&self, now: DateTime<Utc>, reset_after: Duration) -> bool {
        now - self.last_engagement_reset_at > reset_after
    }

    pub fn reset_engagement(&mut self, now: DateTime<Utc>) {
        self.engagement_score = 0;
        self.last_engagement_reset_at = now;
    }

    pub fn popup_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_popup_at {
            None => true,
            Some(last) => {
                now - last >= Duration::minutes(i64::from(self.popup_frequency_minutes))
            }
        }
    }
}
