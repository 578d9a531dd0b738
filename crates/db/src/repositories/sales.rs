use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::Row;

use stockpulse_core::domain::product::ProductId;
use stockpulse_core::domain::sales::SaleRecord;
use stockpulse_core::errors::ApplicationError;
use stockpulse_core::suggestions::ports::SalesSource;

use super::{format_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

/// Sales history. Windows are half-open: `(as_of - days_back, as_of]`.
pub struct SqlSalesRepository {
    pool: DbPool,
}

impl SqlSalesRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, id: &str, sale: &SaleRecord) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO sale (id, product_id, quantity_sold, sale_date) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(&sale.product_id.0)
            .bind(sale.quantity_sold)
            .bind(format_timestamp(sale.sale_date))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn in_window(
        &self,
        product_id: &ProductId,
        days_back: u32,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<SaleRecord>, RepositoryError> {
        let (from, to) = window(days_back, as_of);
        let rows = sqlx::query(
            "SELECT product_id, quantity_sold, sale_date FROM sale
             WHERE product_id = ? AND sale_date > ? AND sale_date <= ?
             ORDER BY sale_date",
        )
        .bind(&product_id.0)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(SaleRecord {
                    product_id: ProductId(row.try_get("product_id")?),
                    quantity_sold: row.try_get("quantity_sold")?,
                    sale_date: parse_timestamp("sale_date", row.try_get("sale_date")?)?,
                })
            })
            .collect()
    }

    pub async fn sum_in_window(
        &self,
        product_id: &ProductId,
        days_back: u32,
        as_of: DateTime<Utc>,
    ) -> Result<f64, RepositoryError> {
        let (from, to) = window(days_back, as_of);
        let total: Option<f64> = sqlx::query_scalar(
            "SELECT SUM(quantity_sold) FROM sale
             WHERE product_id = ? AND sale_date > ? AND sale_date <= ?",
        )
        .bind(&product_id.0)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(total.unwrap_or(0.0))
    }
}

fn window(days_back: u32, as_of: DateTime<Utc>) -> (String, String) {
    let from = as_of - Duration::days(i64::from(days_back));
    (format_timestamp(from), format_timestamp(as_of))
}

#[async_trait]
impl SalesSource for SqlSalesRepository {
    async fn sales_for_product(
        &self,
        product_id: &ProductId,
        days_back: u32,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<SaleRecord>, ApplicationError> {
        Ok(self.in_window(product_id, days_back, as_of).await?)
    }

    async fn total_sold(
        &self,
        product_id: &ProductId,
        days_back: u32,
        as_of: DateTime<Utc>,
    ) -> Result<f64, ApplicationError> {
        Ok(self.sum_in_window(product_id, days_back, as_of).await?)
    }
}
