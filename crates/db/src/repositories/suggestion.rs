use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use stockpulse_core::domain::product::ProductId;
use stockpulse_core::domain::store::UserId;
use stockpulse_core::domain::suggestion::{
    ActionType, Suggestion, SuggestionDomain, SuggestionId, SuggestionPriority, SuggestionStatus,
    SuggestionType,
};
use stockpulse_core::errors::ApplicationError;
use stockpulse_core::suggestions::ports::SuggestionStore;
use stockpulse_core::suggestions::{InsertOutcome, SuggestionFilter};

use super::{
    format_optional_timestamp, format_timestamp, parse_optional_timestamp, parse_timestamp,
    RepositoryError,
};
use crate::DbPool;

const SELECT_COLUMNS: &str = "id, user_id, suggestion_type, domain, priority, severity_score, \
     title, message, action_type, action_data, product_id, content_hash, status, is_read, \
     impact_value, action_result, expires_at, created_at, updated_at, viewed_at, acted_at";

pub struct SqlSuggestionStore {
    pool: DbPool,
}

impl SqlSuggestionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert_row(&self, suggestion: &Suggestion) -> Result<InsertOutcome, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO suggestion (
                id, user_id, suggestion_type, domain, priority, severity_score, title, message,
                action_type, action_data, product_id, content_hash, status, is_read, impact_value,
                action_result, expires_at, created_at, updated_at, viewed_at, acted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&suggestion.id.0)
        .bind(&suggestion.user_id.0)
        .bind(suggestion.suggestion_type.as_str())
        .bind(suggestion.domain.as_str())
        .bind(suggestion.priority.as_str())
        .bind(i64::from(suggestion.severity_score))
        .bind(&suggestion.title)
        .bind(&suggestion.message)
        .bind(suggestion.action_type.map(|action| action.as_str()))
        .bind(suggestion.action_data.to_string())
        .bind(suggestion.product_id.as_ref().map(|id| id.0.as_str()))
        .bind(&suggestion.content_hash)
        .bind(suggestion.status.as_str())
        .bind(suggestion.is_read)
        .bind(suggestion.impact_value.map(|value| value.to_string()))
        .bind(suggestion.action_result.as_ref().map(|value| value.to_string()))
        .bind(format_timestamp(suggestion.expires_at))
        .bind(format_timestamp(suggestion.created_at))
        .bind(format_timestamp(suggestion.updated_at))
        .bind(format_optional_timestamp(suggestion.viewed_at))
        .bind(format_optional_timestamp(suggestion.acted_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(error) => Err(error.into()),
        }
    }

    pub async fn find_row(&self, id: &SuggestionId) -> Result<Option<Suggestion>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM suggestion WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| suggestion_from_row(&row)).transpose()
    }

    pub async fn find_active_row(
        &self,
        user_id: &UserId,
        content_hash: &str,
    ) -> Result<Option<Suggestion>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM suggestion
             WHERE user_id = ? AND content_hash = ? AND status IN ('pending', 'viewed')"
        ))
        .bind(&user_id.0)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| suggestion_from_row(&row)).transpose()
    }

    pub async fn list_rows(
        &self,
        user_id: &UserId,
        filter: &SuggestionFilter,
    ) -> Result<Vec<Suggestion>, RepositoryError> {
        let status = filter.status.map(|status| status.as_str());
        let domain = filter.domain.map(|domain| domain.as_str());
        // SQLite treats a negative LIMIT as unbounded.
        let limit = filter.limit.map(i64::from).unwrap_or(-1);

        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM suggestion
             WHERE user_id = ?
               AND (? IS NULL OR status = ?)
               AND (? IS NULL OR domain = ?)
             ORDER BY severity_score DESC, created_at DESC, id ASC
             LIMIT ?"
        ))
        .bind(&user_id.0)
        .bind(status)
        .bind(status)
        .bind(domain)
        .bind(domain)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(suggestion_from_row).collect()
    }

    pub async fn update_if_status(
        &self,
        expected: SuggestionStatus,
        next: &Suggestion,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE suggestion
             SET status = ?, is_read = ?, action_result = ?, updated_at = ?, viewed_at = ?,
                 acted_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(next.status.as_str())
        .bind(next.is_read)
        .bind(next.action_result.as_ref().map(|value| value.to_string()))
        .bind(format_timestamp(next.updated_at))
        .bind(format_optional_timestamp(next.viewed_at))
        .bind(format_optional_timestamp(next.acted_at))
        .bind(&next.id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn set_read(&self, id: &SuggestionId, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE suggestion SET is_read = 1, updated_at = ? WHERE id = ?")
            .bind(format_timestamp(at))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn count_unread(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM suggestion
             WHERE user_id = ? AND status = 'pending' AND is_read = 0 AND expires_at > ?",
        )
        .bind(&user_id.0)
        .bind(format_timestamp(now))
        .fetch_one(&self.pool)
        .await?;

        u64::try_from(count)
            .map_err(|_| RepositoryError::Decode(format!("negative unread count: {count}")))
    }

    pub async fn expire_rows(
        &self,
        now: DateTime<Utc>,
        user_id: Option<&UserId>,
    ) -> Result<u64, RepositoryError> {
        let user = user_id.map(|id| id.0.as_str());
        let stamp = format_timestamp(now);
        let result = sqlx::query(
            "UPDATE suggestion
             SET status = 'expired', updated_at = ?
             WHERE status IN ('pending', 'viewed')
               AND expires_at <= ?
               AND (? IS NULL OR user_id = ?)",
        )
        .bind(&stamp)
        .bind(&stamp)
        .bind(user)
        .bind(user)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SuggestionStore for SqlSuggestionStore {
    async fn find_active_by_hash(
        &self,
        user_id: &UserId,
        content_hash: &str,
    ) -> Result<Option<Suggestion>, ApplicationError> {
        Ok(self.find_active_row(user_id, content_hash).await?)
    }

    async fn insert(&self, suggestion: &Suggestion) -> Result<InsertOutcome, ApplicationError> {
        Ok(self.insert_row(suggestion).await?)
    }

    async fn find_by_id(&self, id: &SuggestionId) -> Result<Option<Suggestion>, ApplicationError> {
        Ok(self.find_row(id).await?)
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        filter: &SuggestionFilter,
    ) -> Result<Vec<Suggestion>, ApplicationError> {
        Ok(self.list_rows(user_id, filter).await?)
    }

    async fn apply_transition(
        &self,
        expected: SuggestionStatus,
        next: &Suggestion,
    ) -> Result<bool, ApplicationError> {
        Ok(self.update_if_status(expected, next).await?)
    }

    async fn mark_read(
        &self,
        id: &SuggestionId,
        at: DateTime<Utc>,
    ) -> Result<bool, ApplicationError> {
        Ok(self.set_read(id, at).await?)
    }

    async fn unread_count(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, ApplicationError> {
        Ok(self.count_unread(user_id, now).await?)
    }

    async fn expire_stale(
        &self,
        now: DateTime<Utc>,
        user_id: Option<&UserId>,
    ) -> Result<u64, ApplicationError> {
        Ok(self.expire_rows(now, user_id).await?)
    }
}

fn suggestion_from_row(row: &SqliteRow) -> Result<Suggestion, RepositoryError> {
    let suggestion_type: String = row.try_get("suggestion_type")?;
    let domain: String = row.try_get("domain")?;
    let priority: String = row.try_get("priority")?;
    let status: String = row.try_get("status")?;
    let action_type: Option<String> = row.try_get("action_type")?;
    let severity_score: i64 = row.try_get("severity_score")?;
    let action_data: String = row.try_get("action_data")?;
    let action_result: Option<String> = row.try_get("action_result")?;
    let impact_value: Option<String> = row.try_get("impact_value")?;

    Ok(Suggestion {
        id: SuggestionId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        suggestion_type: SuggestionType::parse(&suggestion_type).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown suggestion type `{suggestion_type}`"))
        })?,
        domain: SuggestionDomain::parse(&domain)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown suggestion domain `{domain}`")))?,
        priority: SuggestionPriority::parse(&priority).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown suggestion priority `{priority}`"))
        })?,
        severity_score: u8::try_from(severity_score).map_err(|_| {
            RepositoryError::Decode(format!("severity score out of range: {severity_score}"))
        })?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        action_type: action_type
            .map(|value| {
                ActionType::parse(&value)
                    .ok_or_else(|| RepositoryError::Decode(format!("unknown action type `{value}`")))
            })
            .transpose()?,
        action_data: parse_json("action_data", &action_data)?,
        product_id: row.try_get::<Option<String>, _>("product_id")?.map(ProductId),
        content_hash: row.try_get("content_hash")?,
        status: SuggestionStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown suggestion status `{status}`")))?,
        is_read: row.try_get("is_read")?,
        impact_value: impact_value
            .map(|value| {
                Decimal::from_str(&value).map_err(|error| {
                    RepositoryError::Decode(format!("invalid impact value `{value}`: {error}"))
                })
            })
            .transpose()?,
        action_result: action_result.map(|value| parse_json("action_result", &value)).transpose()?,
        expires_at: parse_timestamp("expires_at", row.try_get("expires_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        viewed_at: parse_optional_timestamp("viewed_at", row.try_get("viewed_at")?)?,
        acted_at: parse_optional_timestamp("acted_at", row.try_get("acted_at")?)?,
    })
}

fn parse_json(column: &str, value: &str) -> Result<serde_json::Value, RepositoryError> {
    serde_json::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid json in `{column}`: {error}")))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    use stockpulse_core::domain::product::ProductId;
    use stockpulse_core::domain::store::{StoreProfile, UserId};
    use stockpulse_core::domain::suggestion::{
        ActionType, Suggestion, SuggestionDomain, SuggestionId, SuggestionPriority,
        SuggestionStatus, SuggestionType,
    };
    use stockpulse_core::suggestions::{InsertOutcome, SuggestionFilter};

    use super::SqlSuggestionStore;
    use crate::repositories::SqlStoreProfileRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlStoreProfileRepository::new(pool.clone())
            .upsert(&UserId("u-1".to_string()), &StoreProfile::generic("FR"))
            .await
            .expect("seed user");
        pool
    }

    fn suggestion(id: &str, hash: &str, priority: SuggestionPriority, score: u8) -> Suggestion {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        Suggestion {
            id: SuggestionId(id.to_string()),
            user_id: UserId("u-1".to_string()),
            suggestion_type: SuggestionType::Rupture,
            domain: SuggestionDomain::Stock,
            priority,
            severity_score: score,
            title: "Croissant is about to run out".to_string(),
            message: "Croissant covers less than a day of sales".to_string(),
            action_type: Some(ActionType::Reorder),
            action_data: json!({"product_id": "p-croissant", "suggested_quantity": 70}),
            product_id: Some(ProductId("p-croissant".to_string())),
            content_hash: hash.to_string(),
            status: SuggestionStatus::Pending,
            is_read: false,
            impact_value: Some(Decimal::new(1250, 2)),
            action_result: None,
            expires_at: now + Duration::hours(24),
            created_at: now,
            updated_at: now,
            viewed_at: None,
            acted_at: None,
        }
    }

    #[tokio::test]
    async fn insert_then_load_preserves_every_field() {
        let store = SqlSuggestionStore::new(setup_pool().await);
        let original = suggestion("sg-1", "hash-a", SuggestionPriority::Critical, 100);

        assert_eq!(store.insert_row(&original).await.expect("insert"), InsertOutcome::Inserted);
        let loaded = store.find_row(&original.id).await.expect("load").expect("row exists");

        assert_eq!(loaded, original);
        assert!(store.find_row(&SuggestionId("sg-missing".to_string())).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn second_active_row_with_same_fingerprint_is_a_duplicate() {
        let store = SqlSuggestionStore::new(setup_pool().await);
        let first = suggestion("sg-1", "hash-a", SuggestionPriority::High, 75);
        store.insert_row(&first).await.expect("insert first");

        let outcome = store
            .insert_row(&suggestion("sg-2", "hash-a", SuggestionPriority::High, 75))
            .await
            .expect("insert second");
        assert_eq!(outcome, InsertOutcome::Duplicate);

        let dismissed = first.transitioned(SuggestionStatus::Dismissed, first.created_at).expect("dismiss");
        assert!(store.update_if_status(SuggestionStatus::Pending, &dismissed).await.expect("update"));

        let outcome = store
            .insert_row(&suggestion("sg-3", "hash-a", SuggestionPriority::High, 75))
            .await
            .expect("insert after dismissal");
        assert_eq!(outcome, InsertOutcome::Inserted);
    }

    #[tokio::test]
    async fn conditional_update_rejects_stale_status() {
        let store = SqlSuggestionStore::new(setup_pool().await);
        let row = suggestion("sg-1", "hash-a", SuggestionPriority::High, 75);
        store.insert_row(&row).await.expect("insert");

        let mut acted = row
            .transitioned(SuggestionStatus::Acted, row.created_at + Duration::minutes(5))
            .expect("act");
        acted.action_result = Some(json!({"ordered": 70}));
        assert!(store.update_if_status(SuggestionStatus::Pending, &acted).await.expect("update"));

        let dismissed = row.transitioned(SuggestionStatus::Dismissed, row.created_at).expect("dismiss");
        assert!(!store.update_if_status(SuggestionStatus::Pending, &dismissed).await.expect("update"));

        let stored = store.find_row(&row.id).await.expect("load").expect("row exists");
        assert_eq!(stored.status, SuggestionStatus::Acted);
        assert_eq!(stored.action_result, Some(json!({"ordered": 70})));
        assert!(stored.acted_at.is_some());
    }

    #[tokio::test]
    async fn listing_orders_by_severity_and_applies_filters() {
        let store = SqlSuggestionStore::new(setup_pool().await);
        let mut low = suggestion("sg-low", "hash-low", SuggestionPriority::Low, 25);
        low.domain = SuggestionDomain::Operations;
        store.insert_row(&low).await.expect("insert low");
        store
            .insert_row(&suggestion("sg-critical", "hash-critical", SuggestionPriority::Critical, 100))
            .await
            .expect("insert critical");
        store
            .insert_row(&suggestion("sg-medium", "hash-medium", SuggestionPriority::Medium, 50))
            .await
            .expect("insert medium");

        let user = UserId("u-1".to_string());
        let ids = |rows: Vec<Suggestion>| rows.into_iter().map(|row| row.id.0).collect::<Vec<_>>();

        let all = store.list_rows(&user, &SuggestionFilter::default()).await.expect("list");
        assert_eq!(ids(all), vec!["sg-critical", "sg-medium", "sg-low"]);

        let limited =
            store.list_rows(&user, &SuggestionFilter::default().with_limit(2)).await.expect("list");
        assert_eq!(ids(limited), vec!["sg-critical", "sg-medium"]);

        let operations = store
            .list_rows(&user, &SuggestionFilter::default().with_domain(SuggestionDomain::Operations))
            .await
            .expect("list");
        assert_eq!(ids(operations), vec!["sg-low"]);

        let viewed = store
            .list_rows(&user, &SuggestionFilter::default().with_status(SuggestionStatus::Viewed))
            .await
            .expect("list");
        assert!(viewed.is_empty());
    }

    #[tokio::test]
    async fn unread_count_skips_read_and_lapsed_rows() {
        let store = SqlSuggestionStore::new(setup_pool().await);
        let user = UserId("u-1".to_string());
        let first = suggestion("sg-1", "hash-a", SuggestionPriority::High, 75);
        let now = first.created_at + Duration::hours(1);
        store.insert_row(&first).await.expect("insert");
        store.insert_row(&suggestion("sg-2", "hash-b", SuggestionPriority::High, 75)).await.expect("insert");
        let mut lapsed = suggestion("sg-3", "hash-c", SuggestionPriority::High, 75);
        lapsed.expires_at = now - Duration::minutes(1);
        store.insert_row(&lapsed).await.expect("insert");

        assert_eq!(store.count_unread(&user, now).await.expect("count"), 2);

        assert!(store.set_read(&first.id, now).await.expect("mark read"));
        assert_eq!(store.count_unread(&user, now).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn expire_rows_only_touches_active_lapsed_rows() {
        let pool = setup_pool().await;
        SqlStoreProfileRepository::new(pool.clone())
            .upsert(&UserId("u-2".to_string()), &StoreProfile::generic("FR"))
            .await
            .expect("seed second user");
        let store = SqlSuggestionStore::new(pool);

        let fresh = suggestion("sg-fresh", "hash-fresh", SuggestionPriority::High, 75);
        let now = fresh.expires_at + Duration::minutes(1);
        let mut still_valid = suggestion("sg-valid", "hash-valid", SuggestionPriority::High, 75);
        still_valid.expires_at = now + Duration::hours(1);
        let mut other_user = suggestion("sg-other", "hash-other", SuggestionPriority::High, 75);
        other_user.user_id = UserId("u-2".to_string());
        for row in [&fresh, &still_valid, &other_user] {
            store.insert_row(row).await.expect("insert");
        }

        let swept = store.expire_rows(now, Some(&UserId("u-1".to_string()))).await.expect("sweep");
        assert_eq!(swept, 1);
        assert_eq!(
            store.find_row(&other_user.id).await.expect("load").expect("row").status,
            SuggestionStatus::Pending
        );

        assert_eq!(store.expire_rows(now, None).await.expect("sweep all"), 1);
        assert_eq!(store.expire_rows(now, None).await.expect("sweep again"), 0);
        assert_eq!(
            store.find_row(&still_valid.id).await.expect("load").expect("row").status,
            SuggestionStatus::Pending
        );
    }
}
