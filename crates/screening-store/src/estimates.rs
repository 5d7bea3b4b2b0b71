use crate::{db::ScreeningDb, db_error, parse_timestamp};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use screening_core::{EstimateSource, ExternalEstimateRecord, ScreeningError};
use sqlx::Row;

impl ScreeningDb {
    pub async fn get_external_estimate(&self, company_code: &str) -> Result<Option<ExternalEstimateRecord>> {
        let row = sqlx::query(
            "SELECT company_code, revenue, operating_profit, source, updated_at
             FROM external_estimates WHERE company_code = ?",
        )
        .bind(company_code)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let updated_at: Option<String> = row.try_get("updated_at")?;
        Ok(Some(ExternalEstimateRecord {
            company_code: row.try_get("company_code")?,
            revenue: row.try_get("revenue")?,
            operating_profit: row.try_get("operating_profit")?,
            source: row.try_get("source")?,
            updated_at: updated_at.as_deref().and_then(parse_timestamp),
        }))
    }

    /// Insert or replace the estimate for its entity. A missing `updated_at` is stamped now.
    pub async fn upsert_external_estimate(&self, estimate: &ExternalEstimateRecord) -> Result<()> {
        let updated_at = estimate.updated_at.unwrap_or_else(Utc::now);

        sqlx::query(
            r#"
            INSERT INTO external_estimates (company_code, revenue, operating_profit, source, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(company_code) DO UPDATE SET
                revenue = excluded.revenue,
                operating_profit = excluded.operating_profit,
                source = excluded.source,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&estimate.company_code)
        .bind(estimate.revenue)
        .bind(estimate.operating_profit)
        .bind(&estimate.source)
        .bind(updated_at.to_rfc3339())
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

#[async_trait]
impl EstimateSource for ScreeningDb {
    async fn fetch_estimate(&self, company_code: &str) -> Result<Option<ExternalEstimateRecord>, ScreeningError> {
        self.get_external_estimate(company_code).await.map_err(db_error)
    }
}
