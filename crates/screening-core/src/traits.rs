use async_trait::async_trait;
use crate::{ExternalEstimateRecord, JudgedRecord, ListedInstrument, RawFinancialRecord, ScreeningError};

/// Source of raw financial figures for one entity
#[async_trait]
pub trait FinancialDataProvider: Send + Sync {
    async fn fetch_financials(&self, company_code: &str) -> Result<RawFinancialRecord, ScreeningError>;
}

/// Source of the external estimate used as the deviation baseline
#[async_trait]
pub trait EstimateSource: Send + Sync {
    /// `Ok(None)` when no estimate is on record for the entity
    async fn fetch_estimate(&self, company_code: &str) -> Result<Option<ExternalEstimateRecord>, ScreeningError>;
}

/// Master listing of tradable instruments with market/sector classification
#[async_trait]
pub trait InstrumentListing: Send + Sync {
    async fn list_instruments(&self) -> Result<Vec<ListedInstrument>, ScreeningError>;
}

/// The set of entity codes a run screens
#[async_trait]
pub trait Watchlist: Send + Sync {
    async fn watched_codes(&self) -> Result<Vec<String>, ScreeningError>;
}

/// Destination for judged records
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn upsert_judged(&self, records: &[JudgedRecord]) -> Result<usize, ScreeningError>;

    /// Flag previously stored records whose refresh failed
    async fn mark_stale(&self, company_codes: &[String], reason_code: &str) -> Result<usize, ScreeningError>;
}
