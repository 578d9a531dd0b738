use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use stockpulse_core::domain::product::{ProductId, ProductSnapshot};
use stockpulse_core::domain::store::UserId;
use stockpulse_core::errors::ApplicationError;
use stockpulse_core::suggestions::ports::ProductSource;

use super::{format_optional_timestamp, format_timestamp, parse_optional_timestamp, RepositoryError};
use crate::DbPool;

const SELECT_COLUMNS: &str = "id, user_id, name, current_quantity, unit, alert_threshold, \
     supplier, category, expiry_date";

pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, product: &ProductSnapshot) -> Result<(), RepositoryError> {
        let now = format_timestamp(Utc::now());
        sqlx::query(
            "INSERT INTO product (
                id, user_id, name, current_quantity, unit, alert_threshold, supplier, category,
                expiry_date, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                current_quantity = excluded.current_quantity,
                unit = excluded.unit,
                alert_threshold = excluded.alert_threshold,
                supplier = excluded.supplier,
                category = excluded.category,
                expiry_date = excluded.expiry_date,
                updated_at = excluded.updated_at",
        )
        .bind(&product.id.0)
        .bind(&product.user_id.0)
        .bind(&product.name)
        .bind(product.current_quantity)
        .bind(&product.unit)
        .bind(product.alert_threshold)
        .bind(&product.supplier)
        .bind(&product.category)
        .bind(format_optional_timestamp(product.expiry_date))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find(&self, id: &ProductId) -> Result<Option<ProductSnapshot>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM product WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| product_from_row(&row)).transpose()
    }

    pub async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<ProductSnapshot>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM product WHERE user_id = ? ORDER BY name, id"
        ))
        .bind(&user_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(product_from_row).collect()
    }

    /// Removes the product and its sales. Suggestions that mention it are kept.
    pub async fn delete(&self, id: &ProductId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM product WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ProductSource for SqlProductRepository {
    async fn products_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ProductSnapshot>, ApplicationError> {
        Ok(self.list_for_user(user_id).await?)
    }
}

fn product_from_row(row: &SqliteRow) -> Result<ProductSnapshot, RepositoryError> {
    Ok(ProductSnapshot {
        id: ProductId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        name: row.try_get("name")?,
        current_quantity: row.try_get("current_quantity")?,
        unit: row.try_get("unit")?,
        alert_threshold: row.try_get("alert_threshold")?,
        supplier: row.try_get("supplier")?,
        category: row.try_get("category")?,
        expiry_date: parse_optional_timestamp("expiry_date", row.try_get("expiry_date")?)?,
    })
}
