use chrono::Utc;
use sqlx::Row;

use stockpulse_core::domain::store::{StoreProfile, UserId};
use stockpulse_core::errors::ApplicationError;
use stockpulse_core::suggestions::ports::StoreProfileProvider;

use super::{format_timestamp, RepositoryError};
use crate::DbPool;

/// Store owners and their profile (type, city, country).
pub struct SqlStoreProfileRepository {
    pool: DbPool,
}

impl SqlStoreProfileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(
        &self,
        user_id: &UserId,
        profile: &StoreProfile,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO store_user (id, store_type, city, country, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                store_type = excluded.store_type,
                city = excluded.city,
                country = excluded.country",
        )
        .bind(&user_id.0)
        .bind(&profile.store_type)
        .bind(&profile.city)
        .bind(&profile.country)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find(&self, user_id: &UserId) -> Result<Option<StoreProfile>, RepositoryError> {
        let row = sqlx::query("SELECT store_type, city, country FROM store_user WHERE id = ?")
            .bind(&user_id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(StoreProfile {
                store_type: row.try_get("store_type")?,
                city: row.try_get("city")?,
                country: row.try_get("country")?,
            })
        })
        .transpose()
    }

    pub async fn list_user_ids(&self) -> Result<Vec<UserId>, RepositoryError> {
        let rows = sqlx::query("SELECT id FROM store_user ORDER BY id").fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| Ok(UserId(row.try_get("id")?)))
            .collect()
    }
}

#[async_trait::async_trait]
impl StoreProfileProvider for SqlStoreProfileRepository {
    async fn store_info(&self, user_id: &UserId) -> Result<Option<StoreProfile>, ApplicationError> {
        Ok(self.find(user_id).await?)
    }
}
