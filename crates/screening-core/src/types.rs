use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a record reflects the latest fetch or a prior one kept after a failed refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataStatus {
    #[default]
    Fresh,
    Stale,
}

impl DataStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataStatus::Fresh => "fresh",
            DataStatus::Stale => "stale",
        }
    }
}

/// Unprocessed facts for one listed company, as produced by a data provider.
///
/// Currency figures are in oku-yen (100 million JPY). Periods: `2y` and `1y` are the
/// two most recent closed fiscal years, `cy` and `ny` the current and next fiscal
/// year estimates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFinancialRecord {
    pub company_code: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub listing_date: Option<NaiveDate>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub stock_price: Option<f64>,

    #[serde(default)]
    pub revenue_2y: Option<f64>,
    #[serde(default)]
    pub revenue_1y: Option<f64>,
    #[serde(default)]
    pub revenue_cy: Option<f64>,
    #[serde(default)]
    pub revenue_ny: Option<f64>,

    #[serde(default)]
    pub op_2y: Option<f64>,
    #[serde(default)]
    pub op_1y: Option<f64>,
    #[serde(default)]
    pub op_cy: Option<f64>,
    #[serde(default)]
    pub op_ny: Option<f64>,

    #[serde(default)]
    pub total_assets: Option<f64>,
    #[serde(default)]
    pub equity: Option<f64>,
    #[serde(default)]
    pub net_income: Option<f64>,
    #[serde(default)]
    pub operating_cf: Option<f64>,
    #[serde(default)]
    pub investing_cf: Option<f64>,

    #[serde(default)]
    pub per_forward: Option<f64>,
    #[serde(default)]
    pub pbr: Option<f64>,
    /// Percent, e.g. 2.5 for a 2.5% yield
    #[serde(default)]
    pub dividend_yield: Option<f64>,

    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data_status: DataStatus,
    /// Set together with `DataStatus::Stale` when the provider could not produce the figures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
}

impl RawFinancialRecord {
    pub fn new(company_code: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            company_code: company_code.into(),
            company_name: company_name.into(),
            ..Default::default()
        }
    }

    /// Placeholder for an entity whose figures could not be fetched at all
    pub fn fetch_failed(company_code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            company_code: company_code.into(),
            data_status: DataStatus::Stale,
            fetch_error: Some(error.into()),
            fetched_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn is_fetch_failed(&self) -> bool {
        self.data_status == DataStatus::Stale
    }
}

/// Independently sourced current-year estimate used as the deviation baseline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalEstimateRecord {
    pub company_code: String,
    pub revenue: Option<f64>,
    pub operating_profit: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Ratios derived from a `RawFinancialRecord`. `None` always has a matching review reason
/// unless it is covered by a record-scoped one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub equity_ratio: Option<f64>,
    pub revenue_growth_2y_1y: Option<f64>,
    pub revenue_growth_1y_cy: Option<f64>,
    pub revenue_growth_cy_ny: Option<f64>,
    pub op_growth_2y_1y: Option<f64>,
    pub op_growth_1y_cy: Option<f64>,
    pub op_growth_cy_ny: Option<f64>,
    pub operating_margin: Option<f64>,
    pub roa: Option<f64>,
    pub free_cf: Option<f64>,
    pub tk_deviation_revenue: Option<f64>,
    pub tk_deviation_op: Option<f64>,
}

/// A value a screening condition can be evaluated against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl FieldValue {
    /// Numbers rounded to two decimals, everything else unchanged
    pub fn rounded(&self) -> FieldValue {
        match self {
            FieldValue::Number(v) => FieldValue::Number((v * 100.0).round() / 100.0),
            other => other.clone(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(v) => write!(f, "{:.2}", v),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A field that is missing or could not be computed. Never a threshold failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewReason {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub message: String,
}

impl ReviewReason {
    pub fn for_field(
        code: impl Into<String>,
        field: impl Into<String>,
        display_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            field: Some(field.into()),
            display_name: Some(display_name.into()),
            message: message.into(),
        }
    }

    /// Reason that applies to the whole record rather than one field
    pub fn record(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            field: None,
            display_name: None,
            message: message.into(),
        }
    }
}

/// A computed field that did not satisfy its condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedReason {
    pub code: String,
    pub field: String,
    pub display_name: String,
    pub observed_value: FieldValue,
    pub condition_description: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScreeningStatus {
    Pass,
    Fail,
    Review,
}

impl ScreeningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreeningStatus::Pass => "PASS",
            ScreeningStatus::Fail => "FAIL",
            ScreeningStatus::Review => "REVIEW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PASS" => Some(ScreeningStatus::Pass),
            "FAIL" => Some(ScreeningStatus::Fail),
            "REVIEW" => Some(ScreeningStatus::Review),
            _ => None,
        }
    }
}

impl fmt::Display for ScreeningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw record plus derived metrics, before judgment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub raw: RawFinancialRecord,
    #[serde(flatten)]
    pub metrics: DerivedMetrics,
    pub review_reasons: Vec<ReviewReason>,
}

/// Final output of one screening run for one entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgedRecord {
    #[serde(flatten)]
    pub raw: RawFinancialRecord,
    #[serde(flatten)]
    pub metrics: DerivedMetrics,
    pub status: ScreeningStatus,
    pub review_reasons: Vec<ReviewReason>,
    pub failed_reasons: Vec<FailedReason>,
    pub judged_at: DateTime<Utc>,
}

impl JudgedRecord {
    pub fn company_code(&self) -> &str {
        &self.raw.company_code
    }
}

/// One row of the exchange's instrument master
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedInstrument {
    pub company_code: String,
    pub company_name: String,
    pub market: String,
    pub sector: String,
}

/// Status totals for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub review: usize,
}

impl RunSummary {
    /// Reduction over a finished result set; independent of the order results arrived in.
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a JudgedRecord>) -> Self {
        records.into_iter().fold(Self::default(), |mut acc, r| {
            acc.total += 1;
            match r.status {
                ScreeningStatus::Pass => acc.pass += 1,
                ScreeningStatus::Fail => acc.fail += 1,
                ScreeningStatus::Review => acc.review += 1,
            }
            acc
        })
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PASS={}, FAIL={}, REVIEW={}",
            self.pass, self.fail, self.review
        )
    }
}
