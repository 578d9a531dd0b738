use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use stockpulse_core::domain::preferences::UserSuggestionPreferences;
use stockpulse_core::domain::store::UserId;
use stockpulse_core::errors::ApplicationError;
use stockpulse_core::suggestions::ports::PreferencesStore;

use super::{
    format_optional_timestamp, format_timestamp, parse_optional_timestamp, parse_timestamp,
    parse_u32, RepositoryError,
};
use crate::DbPool;

pub struct SqlPreferencesStore {
    pool: DbPool,
}

impl SqlPreferencesStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn load(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserSuggestionPreferences>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, popup_frequency_minutes, engagement_score, last_engagement_reset_at,
                    last_popup_at
             FROM user_suggestion_preferences
             WHERE user_id = ?",
        )
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(UserSuggestionPreferences {
                user_id: UserId(row.try_get("user_id")?),
                popup_frequency_minutes: parse_u32(
                    "popup_frequency_minutes",
                    row.try_get("popup_frequency_minutes")?,
                )?,
                engagement_score: parse_u32("engagement_score", row.try_get("engagement_score")?)?,
                last_engagement_reset_at: parse_timestamp(
                    "last_engagement_reset_at",
                    row.try_get("last_engagement_reset_at")?,
                )?,
                last_popup_at: parse_optional_timestamp("last_popup_at", row.try_get("last_popup_at")?)?,
            })
        })
        .transpose()
    }

    pub async fn create(
        &self,
        preferences: &UserSuggestionPreferences,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_suggestion_preferences (
                user_id, popup_frequency_minutes, engagement_score, last_engagement_reset_at,
                last_popup_at
            ) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(&preferences.user_id.0)
        .bind(i64::from(preferences.popup_frequency_minutes))
        .bind(i64::from(preferences.engagement_score))
        .bind(format_timestamp(preferences.last_engagement_reset_at))
        .bind(format_optional_timestamp(preferences.last_popup_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Only one of several racing callers sees `true`.
    pub async fn reset_if_due(
        &self,
        user_id: &UserId,
        due_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE user_suggestion_preferences
             SET engagement_score = 0, last_engagement_reset_at = ?
             WHERE user_id = ? AND last_engagement_reset_at < ?",
        )
        .bind(format_timestamp(now))
        .bind(&user_id.0)
        .bind(format_timestamp(due_before))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn stamp_popup(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE user_suggestion_preferences SET last_popup_at = ? WHERE user_id = ?",
        )
        .bind(format_timestamp(at))
        .bind(&user_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn set_frequency(&self, user_id: &UserId, minutes: u32) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE user_suggestion_preferences SET popup_frequency_minutes = ? WHERE user_id = ?",
        )
        .bind(i64::from(minutes))
        .bind(&user_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Atomic increment so concurrent interactions never lose an update.
    pub async fn add_engagement(&self, user_id: &UserId, by: u32) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE user_suggestion_preferences
             SET engagement_score = engagement_score + ?
             WHERE user_id = ?",
        )
        .bind(i64::from(by))
        .bind(&user_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn missing_row(user_id: &UserId) -> ApplicationError {
    ApplicationError::NotFound(format!("suggestion preferences for user `{}`", user_id.0))
}

#[async_trait]
impl PreferencesStore for SqlPreferencesStore {
    async fn find(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserSuggestionPreferences>, ApplicationError> {
        Ok(self.load(user_id).await?)
    }

    async fn insert_if_absent(
        &self,
        preferences: &UserSuggestionPreferences,
    ) -> Result<(), ApplicationError> {
        Ok(self.create(preferences).await?)
    }

    async fn reset_engagement(
        &self,
        user_id: &UserId,
        due_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, ApplicationError> {
        Ok(self.reset_if_due(user_id, due_before, now).await?)
    }

    async fn set_last_popup_at(
        &self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        if self.stamp_popup(user_id, at).await? {
            Ok(())
        } else {
            Err(missing_row(user_id))
        }
    }

    async fn set_popup_frequency(
        &self,
        user_id: &UserId,
        minutes: u32,
    ) -> Result<(), ApplicationError> {
        if self.set_frequency(user_id, minutes).await? {
            Ok(())
        } else {
            Err(missing_row(user_id))
        }
    }

    async fn increment_engagement(
        &self,
        user_id: &UserId,
        by: u32,
    ) -> Result<(), ApplicationError> {
        if self.add_engagement(user_id, by).await? {
            Ok(())
        } else {
            Err(missing_row(user_id))
        }
    }
}
