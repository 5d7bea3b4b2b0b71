use crate::{db::ScreeningDb, db_error};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use screening_core::{ScreeningError, Watchlist};

impl ScreeningDb {
    pub async fn watched_codes(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT company_code FROM watched_tickers ORDER BY company_code")
                .fetch_all(self.pool())
                .await?;

        Ok(rows.into_iter().map(|(code,)| code).collect())
    }

    /// Returns `false` when the code was already watched
    pub async fn add_watched(&self, company_code: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO watched_tickers (company_code, added_at) VALUES (?, ?)",
        )
        .bind(company_code)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Returns `false` when the code was not watched
    pub async fn remove_watched(&self, company_code: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM watched_tickers WHERE company_code = ?")
            .bind(company_code)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Watchlist for ScreeningDb {
    async fn watched_codes(&self) -> Result<Vec<String>, ScreeningError> {
        ScreeningDb::watched_codes(self).await.map_err(db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_remove_watched() {
        let db = ScreeningDb::new("sqlite::memory:").await.unwrap();

        assert!(db.add_watched("7203").await.unwrap());
        assert!(db.add_watched("1301").await.unwrap());
        assert!(!db.add_watched("7203").await.unwrap());

        assert_eq!(db.watched_codes().await.unwrap(), vec!["1301", "7203"]);

        assert!(db.remove_watched("7203").await.unwrap());
        assert!(!db.remove_watched("7203").await.unwrap());
        assert_eq!(db.watched_codes().await.unwrap(), vec!["1301"]);
    }

    #[tokio::test]
    async fn test_watchlist_trait() {
        let db = ScreeningDb::new("sqlite::memory:").await.unwrap();
        db.add_watched("6758").await.unwrap();

        let watchlist: &dyn Watchlist = &db;
        assert_eq!(watchlist.watched_codes().await.unwrap(), vec!["6758"]);
    }
}
