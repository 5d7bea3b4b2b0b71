use async_trait::async_trait;
use screening_core::{InstrumentListing, ListedInstrument, ScreeningError};
use serde::Deserialize;
use std::path::PathBuf;

const DOMESTIC_SUFFIX: &str = "（内国株式）";

/// Instrument names marking funds, notes, trusts and preferred shares
const EXCLUDED_NAME_MARKERS: [&str; 5] = ["ETF", "ETN", "REIT", "優先", "Preferred"];

#[derive(Debug, Deserialize)]
struct ListingRow {
    company_code: String,
    company_name: String,
    market: String,
    #[serde(default)]
    sector: String,
}

/// Maps an exchange market segment to `Prime`, `Standard` or `Growth`.
/// Any other segment (ETFs, REITs, foreign stocks, PRO Market) yields `None`.
pub fn normalize_market(market: &str) -> Option<&'static str> {
    let segment = market.trim();
    let segment = segment.strip_suffix(DOMESTIC_SUFFIX).unwrap_or(segment).trim();

    match segment {
        "プライム" | "Prime" => Some("Prime"),
        "スタンダード" | "Standard" => Some("Standard"),
        "グロース" | "Growth" => Some("Growth"),
        _ => None,
    }
}

/// Parse listing CSV with columns `company_code, company_name, market, sector`,
/// keeping domestic common stocks only.
pub fn parse_listing(csv_data: &str) -> Result<Vec<ListedInstrument>, ScreeningError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(csv_data.as_bytes());

    let mut instruments = Vec::new();
    let mut skipped = 0usize;

    for result in reader.deserialize::<ListingRow>() {
        let row = result.map_err(|e| ScreeningError::Parse(format!("stock list: {}", e)))?;

        let Some(market) = normalize_market(&row.market) else {
            skipped += 1;
            continue;
        };
        if row.company_code.is_empty()
            || EXCLUDED_NAME_MARKERS.iter().any(|m| row.company_name.contains(m))
        {
            skipped += 1;
            continue;
        }

        instruments.push(ListedInstrument {
            company_code: row.company_code,
            company_name: row.company_name,
            market: market.to_string(),
            sector: row.sector,
        });
    }

    tracing::debug!("Parsed {} listed instruments ({} skipped)", instruments.len(), skipped);
    Ok(instruments)
}

/// Instrument master read from a local CSV file
#[derive(Debug, Clone)]
pub struct CsvInstrumentListing {
    path: PathBuf,
}

impl CsvInstrumentListing {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl InstrumentListing for CsvInstrumentListing {
    async fn list_instruments(&self) -> Result<Vec<ListedInstrument>, ScreeningError> {
        let data = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ScreeningError::Config(format!("cannot read {}: {}", self.path.display(), e))
        })?;

        let instruments = parse_listing(&data)?;
        tracing::info!("Loaded stock list: {} instruments", instruments.len());
        Ok(instruments)
    }
}
