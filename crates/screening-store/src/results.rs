use crate::{db::ScreeningDb, db_error};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use screening_core::{
    DataStatus, FailedReason, JudgedRecord, ResultSink, ReviewReason, ScreeningError, ScreeningStatus,
};
use sqlx::Row;

const STALE_MESSAGE: &str = "Latest refresh failed; showing previously stored figures";

impl ScreeningDb {
    /// Insert or replace the latest judged record for each entity. A fetch-failed
    /// record is only inserted when the entity has no stored record, so figures from
    /// the last good fetch are never overwritten by an empty one. Returns rows written.
    pub async fn upsert_judged(&self, records: &[JudgedRecord]) -> Result<usize> {
        let mut tx = self.pool().begin().await?;
        let mut written = 0;

        for record in records {
            let on_conflict = if record.raw.is_fetch_failed() {
                "DO NOTHING"
            } else {
                "DO UPDATE SET
                    company_name = excluded.company_name,
                    status = excluded.status,
                    data_status = excluded.data_status,
                    review_reasons = excluded.review_reasons,
                    failed_reasons = excluded.failed_reasons,
                    payload = excluded.payload,
                    updated_at = excluded.updated_at"
            };
            let payload = serde_json::to_string(record)?;
            let review_reasons = serde_json::to_string(&record.review_reasons)?;
            let failed_reasons = serde_json::to_string(&record.failed_reasons)?;

            let sql = format!(
                "INSERT INTO screened_latest
                    (company_code, company_name, status, data_status, review_reasons, failed_reasons, payload, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(company_code) {}",
                on_conflict
            );

            let result = sqlx::query(&sql)
                .bind(record.company_code())
                .bind(&record.raw.company_name)
                .bind(record.status.as_str())
                .bind(record.raw.data_status.as_str())
                .bind(review_reasons)
                .bind(failed_reasons)
                .bind(payload)
                .bind(record.judged_at.to_rfc3339())
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to store {}", record.company_code()))?;

            written += result.rows_affected() as usize;
        }

        tx.commit().await?;
        tracing::debug!("Stored {} of {} judged records", written, records.len());

        Ok(written)
    }

    /// Latest stored record for an entity. Status, data status and reasons come from
    /// their own columns, which `mark_stale` updates without rewriting the payload.
    pub async fn get_screened(&self, company_code: &str) -> Result<Option<JudgedRecord>> {
        let row = sqlx::query(
            "SELECT status, data_status, review_reasons, failed_reasons, payload
             FROM screened_latest WHERE company_code = ?",
        )
        .bind(company_code)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload: String = row.try_get("payload")?;
        let mut record: JudgedRecord = serde_json::from_str(&payload)
            .with_context(|| format!("corrupt payload for {}", company_code))?;

        let status: String = row.try_get("status")?;
        record.status =
            ScreeningStatus::parse(&status).ok_or_else(|| anyhow!("unknown status {:?}", status))?;

        let data_status: String = row.try_get("data_status")?;
        record.raw.data_status = match data_status.as_str() {
            "stale" => DataStatus::Stale,
            _ => DataStatus::Fresh,
        };

        let review_reasons: String = row.try_get("review_reasons")?;
        record.review_reasons = serde_json::from_str::<Vec<ReviewReason>>(&review_reasons)?;
        let failed_reasons: String = row.try_get("failed_reasons")?;
        record.failed_reasons = serde_json::from_str::<Vec<FailedReason>>(&failed_reasons)?;

        Ok(Some(record))
    }

    /// Flag stored records whose refresh failed: status REVIEW, data status stale and
    /// `reason_code` appended once. Codes with no stored record are skipped.
    /// Returns the number of records updated.
    pub async fn mark_stale(&self, company_codes: &[String], reason_code: &str) -> Result<usize> {
        let mut tx = self.pool().begin().await?;
        let mut updated = 0;

        for code in company_codes {
            let existing: Option<(String,)> =
                sqlx::query_as("SELECT review_reasons FROM screened_latest WHERE company_code = ?")
                    .bind(code)
                    .fetch_optional(&mut *tx)
                    .await?;

            let Some((review_reasons,)) = existing else {
                tracing::debug!("No stored record to mark stale for {}", code);
                continue;
            };

            let mut reasons: Vec<ReviewReason> = serde_json::from_str(&review_reasons)
                .with_context(|| format!("corrupt review reasons for {}", code))?;
            if !reasons.iter().any(|r| r.code == reason_code) {
                reasons.push(ReviewReason::record(reason_code, STALE_MESSAGE));
            }

            sqlx::query(
                "UPDATE screened_latest
                 SET status = ?, data_status = ?, review_reasons = ?, updated_at = ?
                 WHERE company_code = ?",
            )
            .bind(ScreeningStatus::Review.as_str())
            .bind(DataStatus::Stale.as_str())
            .bind(serde_json::to_string(&reasons)?)
            .bind(Utc::now().to_rfc3339())
            .bind(code)
            .execute(&mut *tx)
            .await?;

            updated += 1;
        }

        tx.commit().await?;
        Ok(updated)
    }
}

#[async_trait]
impl ResultSink for ScreeningDb {
    async fn upsert_judged(&self, records: &[JudgedRecord]) -> Result<usize, ScreeningError> {
        ScreeningDb::upsert_judged(self, records).await.map_err(db_error)
    }

    async fn mark_stale(&self, company_codes: &[String], reason_code: &str) -> Result<usize, ScreeningError> {
        ScreeningDb::mark_stale(self, company_codes, reason_code)
            .await
            .map_err(db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundamental_screener::{codes, ScreeningEngine};
    use screening_core::{ExternalEstimateRecord, RawFinancialRecord};

    fn healthy(code: &str) -> RawFinancialRecord {
        RawFinancialRecord {
            company_code: code.to_string(),
            company_name: format!("Company {}", code),
            market_cap: Some(300.0),
            listing_date: chrono::NaiveDate::from_ymd_opt(2016, 3, 1),
            revenue_2y: Some(100.0),
            revenue_1y: Some(110.0),
            revenue_cy: Some(120.0),
            revenue_ny: Some(130.0),
            op_2y: Some(10.0),
            op_1y: Some(12.0),
            op_cy: Some(14.0),
            op_ny: Some(16.0),
            total_assets: Some(200.0),
            equity: Some(100.0),
            net_income: Some(10.0),
            operating_cf: Some(15.0),
            investing_cf: Some(-5.0),
            per_forward: Some(12.0),
            pbr: Some(1.2),
            dividend_yield: Some(2.0),
            ..Default::default()
        }
    }

    fn judged(code: &str) -> JudgedRecord {
        let estimate = ExternalEstimateRecord {
            company_code: code.to_string(),
            revenue: Some(118.0),
            operating_profit: Some(13.0),
            ..Default::default()
        };
        ScreeningEngine::new().screen(healthy(code), Some(&estimate))
    }

    #[tokio::test]
    async fn test_upsert_and_get_screened() {
        let db = ScreeningDb::new("sqlite::memory:").await.unwrap();
        let record = judged("7203");

        assert_eq!(db.upsert_judged(&[record.clone()]).await.unwrap(), 1);

        let stored = db.get_screened("7203").await.unwrap().unwrap();
        assert_eq!(stored.status, record.status);
        assert_eq!(stored.metrics.equity_ratio, Some(50.0));
        assert_eq!(stored.metrics.roa, Some(5.0));
        assert_eq!(stored.review_reasons, record.review_reasons);
        assert_eq!(stored.failed_reasons, record.failed_reasons);
        assert_eq!(stored.raw.company_name, "Company 7203");
        assert!(db.get_screened("0000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_code() {
        let db = ScreeningDb::new("sqlite::memory:").await.unwrap();
        db.upsert_judged(&[judged("7203")]).await.unwrap();

        let reviewed = ScreeningEngine::new().screen(RawFinancialRecord::new("7203", "Renamed"), None);
        db.upsert_judged(&[reviewed]).await.unwrap();

        let stored = db.get_screened("7203").await.unwrap().unwrap();
        assert_eq!(stored.status, ScreeningStatus::Review);
        assert_eq!(stored.raw.company_name, "Renamed");
    }

    #[tokio::test]
    async fn test_mark_stale_appends_reason_once() {
        let db = ScreeningDb::new("sqlite::memory:").await.unwrap();
        let record = judged("6758");
        let original_reasons = record.review_reasons.len();
        db.upsert_judged(&[record]).await.unwrap();

        let codes_to_mark = vec!["6758".to_string(), "0000".to_string()];
        assert_eq!(db.mark_stale(&codes_to_mark, codes::FETCH_FAILED).await.unwrap(), 1);
        assert_eq!(db.mark_stale(&codes_to_mark, codes::FETCH_FAILED).await.unwrap(), 1);

        let stored = db.get_screened("6758").await.unwrap().unwrap();
        assert_eq!(stored.status, ScreeningStatus::Review);
        assert_eq!(stored.raw.data_status, DataStatus::Stale);
        assert_eq!(stored.review_reasons.len(), original_reasons + 1);
        assert_eq!(
            stored
                .review_reasons
                .iter()
                .filter(|r| r.code == codes::FETCH_FAILED)
                .count(),
            1
        );
        // figures from the last good fetch are retained
        assert_eq!(stored.raw.revenue_1y, Some(110.0));
    }

    #[tokio::test]
    async fn test_mark_stale_rejects_corrupt_reasons() {
        let db = ScreeningDb::new("sqlite::memory:").await.unwrap();
        db.upsert_judged(&[judged("6758")]).await.unwrap();
        sqlx::query("UPDATE screened_latest SET review_reasons = 'not json' WHERE company_code = ?")
            .bind("6758")
            .execute(db.pool())
            .await
            .unwrap();

        let err = db
            .mark_stale(&["6758".to_string()], codes::FETCH_FAILED)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("corrupt review reasons for 6758"));
    }

    #[tokio::test]
    async fn test_fetch_failed_record_inserted_when_nothing_stored() {
        let db = ScreeningDb::new("sqlite::memory:").await.unwrap();
        let failed = ScreeningEngine::new().screen(RawFinancialRecord::fetch_failed("9999", "timeout"), None);

        assert_eq!(db.upsert_judged(&[failed]).await.unwrap(), 1);

        let stored = db.get_screened("9999").await.unwrap().unwrap();
        assert_eq!(stored.status, ScreeningStatus::Review);
        assert_eq!(stored.raw.data_status, DataStatus::Stale);
        assert_eq!(stored.review_reasons.len(), 1);
        assert_eq!(stored.review_reasons[0].code, codes::FETCH_FAILED);
    }

    #[tokio::test]
    async fn test_fetch_failed_record_keeps_last_good_figures() {
        let db = ScreeningDb::new("sqlite::memory:").await.unwrap();
        db.upsert_judged(&[judged("7203")]).await.unwrap();

        let codes_to_mark = vec!["7203".to_string()];
        assert_eq!(db.mark_stale(&codes_to_mark, codes::FETCH_FAILED).await.unwrap(), 1);
        let failed = ScreeningEngine::new().screen(RawFinancialRecord::fetch_failed("7203", "timeout"), None);
        assert_eq!(db.upsert_judged(&[failed]).await.unwrap(), 0);

        let stored = db.get_screened("7203").await.unwrap().unwrap();
        assert_eq!(stored.status, ScreeningStatus::Review);
        assert_eq!(stored.raw.data_status, DataStatus::Stale);
        assert_eq!(stored.raw.company_name, "Company 7203");
        assert_eq!(stored.raw.revenue_1y, Some(110.0));
    }

    #[tokio::test]
    async fn test_result_sink_trait() {
        let db = ScreeningDb::new("sqlite::memory:").await.unwrap();
        let sink: &dyn ResultSink = &db;

        let records = vec![judged("1301"), judged("1332")];
        assert_eq!(sink.upsert_judged(&records).await.unwrap(), 2);
        assert_eq!(sink.mark_stale(&[], codes::FETCH_FAILED).await.unwrap(), 0);
    }
}
