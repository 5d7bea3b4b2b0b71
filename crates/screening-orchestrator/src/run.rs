use fundamental_screener::{codes, ScreeningEngine};
use screening_core::{
    EstimateSource, FinancialDataProvider, InstrumentListing, JudgedRecord, ListedInstrument,
    RawFinancialRecord, ResultSink, RunSummary, ScreeningError,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Outcome of one screening run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Judged records ordered by company code
    pub results: Vec<JudgedRecord>,
    pub summary: RunSummary,
    /// Codes whose provider call errored or whose task died. Each still has a
    /// REVIEW record carrying `FETCH_FAILED` in `results`.
    pub failed_codes: Vec<String>,
    /// Tasks lost without a code to attribute them to
    pub task_errors: usize,
}

impl RunReport {
    fn new(mut results: Vec<JudgedRecord>, mut failed_codes: Vec<String>, task_errors: usize) -> Self {
        results.sort_by(|a, b| a.company_code().cmp(b.company_code()));
        failed_codes.sort();
        let summary = RunSummary::tally(&results);

        Self {
            results,
            summary,
            failed_codes,
            task_errors,
        }
    }
}

/// Fetches, derives and judges a set of entities with bounded concurrency.
pub struct ScreeningRun {
    provider: Arc<dyn FinancialDataProvider>,
    estimates: Arc<dyn EstimateSource>,
    listing: Option<Arc<dyn InstrumentListing>>,
    engine: Arc<ScreeningEngine>,
    concurrency: usize,
}

impl ScreeningRun {
    pub fn new(provider: Arc<dyn FinancialDataProvider>, estimates: Arc<dyn EstimateSource>) -> Self {
        Self {
            provider,
            estimates,
            listing: None,
            engine: Arc::new(ScreeningEngine::new()),
            concurrency: 5,
        }
    }

    /// Market and sector come from this listing when it knows the code
    pub fn with_listing(mut self, listing: Arc<dyn InstrumentListing>) -> Self {
        self.listing = Some(listing);
        self
    }

    pub fn with_engine(mut self, engine: ScreeningEngine) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn engine(&self) -> &ScreeningEngine {
        &self.engine
    }

    async fn instrument_map(&self) -> HashMap<String, ListedInstrument> {
        let Some(listing) = &self.listing else {
            return HashMap::new();
        };

        match listing.list_instruments().await {
            Ok(instruments) => instruments
                .into_iter()
                .map(|i| (i.company_code.clone(), i))
                .collect(),
            Err(e) => {
                tracing::warn!("Stock list unavailable, continuing without market/sector: {}", e);
                HashMap::new()
            }
        }
    }

    /// Screen every code. Individual failures never abort the run; a company whose
    /// fetch fails is judged REVIEW with `FETCH_FAILED`.
    pub async fn run(&self, codes: &[String]) -> RunReport {
        let start = Instant::now();
        tracing::info!(
            "📊 Screening {} companies (concurrency {})",
            codes.len(),
            self.concurrency
        );

        let instruments = Arc::new(self.instrument_map().await);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for code in codes {
            let provider = Arc::clone(&self.provider);
            let estimates = Arc::clone(&self.estimates);
            let engine = Arc::clone(&self.engine);
            let instruments = Arc::clone(&instruments);
            let semaphore = Arc::clone(&semaphore);
            let code = code.clone();

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let error = ScreeningError::Api(e.to_string());
                        return screen_failed(&engine, &instruments, &code, &error);
                    }
                };

                // inner task so a panic is attributed to its code
                let screened = tokio::spawn(screen_one(
                    provider,
                    estimates,
                    Arc::clone(&engine),
                    Arc::clone(&instruments),
                    code.clone(),
                ))
                .await;

                match screened {
                    Ok(judged) => judged,
                    Err(e) => {
                        let error = ScreeningError::Api(format!("screening task failed: {}", e));
                        screen_failed(&engine, &instruments, &code, &error)
                    }
                }
            });
        }

        let mut results = Vec::with_capacity(codes.len());
        let mut failed_codes = Vec::new();
        let mut task_errors = 0;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(judged) => {
                    if judged.raw.is_fetch_failed() {
                        failed_codes.push(judged.company_code().to_string());
                    }
                    results.push(judged);
                }
                Err(e) => {
                    tracing::error!("Task error: {}", e);
                    task_errors += 1;
                }
            }
        }

        let report = RunReport::new(results, failed_codes, task_errors);
        tracing::info!(
            "✅ Screening complete in {:.1}s: {} judged, {} fetch failures, {} lost tasks. {}",
            start.elapsed().as_secs_f64(),
            report.results.len(),
            report.failed_codes.len(),
            report.task_errors,
            report.summary
        );

        report
    }

    /// Flag previously stored records of failed codes as stale, then store every
    /// judged record. A fetch-failed record only lands where nothing was stored, so
    /// earlier figures survive a failed refresh.
    /// Returns (records stored, records marked stale).
    pub async fn persist(&self, report: &RunReport, sink: &dyn ResultSink) -> Result<(usize, usize), ScreeningError> {
        let stale = if report.failed_codes.is_empty() {
            0
        } else {
            sink.mark_stale(&report.failed_codes, codes::FETCH_FAILED).await?
        };

        let stored = sink.upsert_judged(&report.results).await?;

        tracing::info!("Stored {} records, marked {} stale", stored, stale);
        Ok((stored, stale))
    }
}

async fn screen_one(
    provider: Arc<dyn FinancialDataProvider>,
    estimates: Arc<dyn EstimateSource>,
    engine: Arc<ScreeningEngine>,
    instruments: Arc<HashMap<String, ListedInstrument>>,
    code: String,
) -> JudgedRecord {
    let (raw, estimate) = tokio::join!(
        provider.fetch_financials(&code),
        estimates.fetch_estimate(&code)
    );

    let raw = match raw {
        Ok(raw) => raw,
        Err(e) => return screen_failed(&engine, &instruments, &code, &e),
    };
    let estimate = estimate.unwrap_or_else(|e| {
        tracing::warn!("Estimate lookup failed for {}: {}", code, e);
        None
    });

    let raw = enrich(raw, instruments.get(&code));
    engine.screen(raw, estimate.as_ref())
}

/// REVIEW record for a company whose figures could not be fetched
fn screen_failed(
    engine: &ScreeningEngine,
    instruments: &HashMap<String, ListedInstrument>,
    code: &str,
    error: &ScreeningError,
) -> JudgedRecord {
    tracing::warn!("Financial fetch failed for {}: {}", code, error);
    let raw = RawFinancialRecord::fetch_failed(code, error.to_string());
    engine.screen(enrich(raw, instruments.get(code)), None)
}

/// Listing classification wins over whatever the provider reported
fn enrich(mut raw: RawFinancialRecord, listed: Option<&ListedInstrument>) -> RawFinancialRecord {
    let Some(listed) = listed else {
        return raw;
    };

    if !listed.market.is_empty() {
        raw.market = Some(listed.market.clone());
    }
    if !listed.sector.is_empty() {
        raw.sector = Some(listed.sector.clone());
    }
    if raw.company_name.is_empty() {
        raw.company_name = listed.company_name.clone();
    }
    raw
}
