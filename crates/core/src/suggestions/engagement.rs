//! Per-user engagement tracking and popup throttling.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::ports::PreferencesStore;
use crate::domain::preferences::{
    UserSuggestionPreferences, DEFAULT_ENGAGEMENT_RESET_DAYS, DEFAULT_POPUP_FREQUENCY_MINUTES,
};
use crate::domain::store::UserId;
use crate::errors::{ApplicationError, DomainError};

#[derive(Clone)]
pub struct EngagementPolicy {
    store: Arc<dyn PreferencesStore>,
    default_popup_frequency_minutes: u32,
    reset_after: Duration,
}

impl EngagementPolicy {
    pub fn new(store: Arc<dyn PreferencesStore>) -> Self {
        Self {
            store,
            default_popup_frequency_minutes: DEFAULT_POPUP_FREQUENCY_MINUTES,
            reset_after: Duration::days(DEFAULT_ENGAGEMENT_RESET_DAYS),
        }
    }

    pub fn with_default_popup_frequency(mut self, minutes: u32) -> Self {
        self.default_popup_frequency_minutes = minutes.max(1);
        self
    }

    pub fn with_reset_after(mut self, reset_after: Duration) -> Self {
        self.reset_after = reset_after;
        self
    }

    /// Creates the row on first use and applies the weekly engagement reset lazily.
    pub async fn get_or_create_preferences(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<UserSuggestionPreferences, ApplicationError> {
        match self.store.find(user_id).await? {
            None => {
                let preferences = UserSuggestionPreferences::new(
                    user_id.clone(),
                    self.default_popup_frequency_minutes,
                    now,
                );
                self.store.insert_if_absent(&preferences).await?;
                tracing::debug!(
                    event_name = "suggestions.preferences.created",
                    user_id = %user_id.0,
                    popup_frequency_minutes = preferences.popup_frequency_minutes,
                    "created suggestion preferences"
                );
                self.require(user_id).await
            }
            Some(preferences) if preferences.engagement_reset_due(now, self.reset_after) => {
                if self.store.reset_engagement(user_id, now - self.reset_after, now).await? {
                    tracing::debug!(
                        event_name = "suggestions.engagement.reset",
                        user_id = %user_id.0,
                        previous_score = preferences.engagement_score,
                        "engagement score reset"
                    );
                }
                self.require(user_id).await
            }
            Some(preferences) => Ok(preferences),
        }
    }

    pub async fn should_show_popup(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, ApplicationError> {
        Ok(self.get_or_create_preferences(user_id, now).await?.popup_due(now))
    }

    pub async fn record_popup_shown(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<UserSuggestionPreferences, ApplicationError> {
        let mut preferences = self.get_or_create_preferences(user_id, now).await?;
        self.store.set_last_popup_at(user_id, now).await?;
        preferences.last_popup_at = Some(now);
        Ok(preferences)
    }

    pub async fn record_interaction(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        self.get_or_create_preferences(user_id, now).await?;
        self.store.increment_engagement(user_id, 1).await
    }

    pub async fn update_popup_frequency(
        &self,
        user_id: &UserId,
        minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<UserSuggestionPreferences, ApplicationError> {
        if minutes == 0 {
            return Err(DomainError::InvariantViolation(
                "popup frequency must be at least one minute".to_string(),
            )
            .into());
        }

        let mut preferences = self.get_or_create_preferences(user_id, now).await?;
        self.store.set_popup_frequency(user_id, minutes).await?;
        preferences.popup_frequency_minutes = minutes;
        Ok(preferences)
    }

    async fn require(&self, user_id: &UserId) -> Result<UserSuggestionPreferences, ApplicationError> {
        self.store.find(user_id).await?.ok_or_else(|| {
            ApplicationError::NotFound(format!("suggestion preferences for user `{}`", user_id.0))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::EngagementPolicy;
    use crate::domain::preferences::UserSuggestionPreferences;
    use crate::domain::store::UserId;
    use crate::errors::{ApplicationError, DomainError};
    use crate::suggestions::memory::InMemoryPreferencesStore;
    use crate::suggestions::ports::PreferencesStore;

    fn user() -> UserId {
        UserId("u-1".to_string())
    }

    #[tokio::test]
    async fn engagement_reads_as_zero_after_eight_days() {
        let store = Arc::new(InMemoryPreferencesStore::default());
        let policy = EngagementPolicy::new(store.clone());
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

        policy.record_interaction(&user(), start).await.expect("interaction");
        policy.record_interaction(&user(), start).await.expect("interaction");
        let before = policy.get_or_create_preferences(&user(), start).await.expect("prefs");
        assert_eq!(before.engagement_score, 2);

        let later = start + Duration::days(8);
        let after = policy.get_or_create_preferences(&user(), later).await.expect("prefs");
        assert_eq!(after.engagement_score, 0);
        assert_eq!(after.last_engagement_reset_at, later);
    }

    #[tokio::test]
    async fn popup_throttle_follows_frequency() {
        let policy = EngagementPolicy::new(Arc::new(InMemoryPreferencesStore::default()));
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

        assert!(policy.should_show_popup(&user(), now).await.expect("check"));
        policy.record_popup_shown(&user(), now).await.expect("record");
        assert!(!policy.should_show_popup(&user(), now + Duration::minutes(90)).await.expect("check"));
        assert!(policy.should_show_popup(&user(), now + Duration::minutes(120)).await.expect("check"));

        policy.update_popup_frequency(&user(), 30, now).await.expect("update");
        assert!(policy.should_show_popup(&user(), now + Duration::minutes(30)).await.expect("check"));
    }

    /// Lands one interaction right after every read, before the caller writes.
    struct InterleavedInteractions(InMemoryPreferencesStore);

    #[async_trait]
    impl PreferencesStore for InterleavedInteractions {
        async fn find(
            &self,
            user_id: &UserId,
        ) -> Result<Option<UserSuggestionPreferences>, ApplicationError> {
            let found = self.0.find(user_id).await?;
            if found.is_some() {
                self.0.increment_engagement(user_id, 1).await?;
            }
            Ok(found)
        }

        async fn insert_if_absent(
            &self,
            preferences: &UserSuggestionPreferences,
        ) -> Result<(), ApplicationError> {
            self.0.insert_if_absent(preferences).await
        }

        async fn reset_engagement(
            &self,
            user_id: &UserId,
            due_before: DateTime<Utc>,
            now: DateTime<Utc>,
        ) -> Result<bool, ApplicationError> {
            self.0.reset_engagement(user_id, due_before, now).await
        }

        async fn set_last_popup_at(
            &self,
            user_id: &UserId,
            at: DateTime<Utc>,
        ) -> Result<(), ApplicationError> {
            self.0.set_last_popup_at(user_id, at).await
        }

        async fn set_popup_frequency(
            &self,
            user_id: &UserId,
            minutes: u32,
        ) -> Result<(), ApplicationError> {
            self.0.set_popup_frequency(user_id, minutes).await
        }

        async fn increment_engagement(
            &self,
            user_id: &UserId,
            by: u32,
        ) -> Result<(), ApplicationError> {
            self.0.increment_engagement(user_id, by).await
        }
    }

    #[tokio::test]
    async fn popup_bookkeeping_never_overwrites_concurrent_interactions() {
        let store = Arc::new(InterleavedInteractions(InMemoryPreferencesStore::default()));
        let policy = EngagementPolicy::new(store.clone());
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

        policy.record_popup_shown(&user(), now).await.expect("record");
        policy.update_popup_frequency(&user(), 45, now).await.expect("update");

        let stored = store.0.find(&user()).await.expect("find").expect("row");
        assert_eq!(stored.engagement_score, 2, "both interleaved interactions survive");
        assert_eq!(stored.last_popup_at, Some(now));
        assert_eq!(stored.popup_frequency_minutes, 45);
    }

    #[tokio::test]
    async fn zero_minute_frequency_is_rejected() {
        let policy = EngagementPolicy::new(Arc::new(InMemoryPreferencesStore::default()));
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

        let error = policy.update_popup_frequency(&user(), 0, now).await.expect_err("rejected");
        assert!(matches!(error, ApplicationError::Domain(DomainError::InvariantViolation(_))));
    }
}
