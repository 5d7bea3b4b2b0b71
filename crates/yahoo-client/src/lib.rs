use async_trait::async_trait;
use chrono::{DateTime, Utc};
use screening_core::{DataStatus, FinancialDataProvider, RawFinancialRecord, ScreeningError};
use serde_json::Value;
use std::time::Duration;

const BASE_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";

const MODULES: &str = "price,quoteType,summaryProfile,summaryDetail,defaultKeyStatistics,\
incomeStatementHistory,balanceSheetHistory,cashflowStatementHistory,earningsTrend";

/// Figures are reported in yen; the screener works in oku-yen (100 million JPY)
const HUNDRED_MILLION: f64 = 100_000_000.0;

/// Tokyo Stock Exchange listings are suffixed with `.T`
pub fn tse_symbol(company_code: &str) -> String {
    format!("{}.T", company_code)
}

#[derive(Debug, Clone)]
pub struct YahooConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Total attempts per request, including the first
    pub max_attempts: u32,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

/// Exponential backoff between attempts: 2s, 4s, 8s, capped at 10s
fn backoff_delay(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt + 1).min(10);
    Duration::from_secs(secs)
}

#[derive(Clone)]
pub struct YahooClient {
    client: reqwest::Client,
    config: YahooConfig,
}

impl YahooClient {
    pub fn new() -> Self {
        Self::with_config(YahooConfig::default())
    }

    pub fn with_config(config: YahooConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, config }
    }

    /// Send a request, retrying transport errors, 429 and 5xx with exponential backoff.
    async fn send_request(&self, url: &str, query: &[(&str, &str)]) -> Result<reqwest::Response, ScreeningError> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = backoff_delay(attempt - 1);
                tracing::warn!(
                    "Yahoo request failed ({}), retry {}/{} in {}s",
                    last_error,
                    attempt,
                    attempts - 1,
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
            }

            match self.client.get(url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_error = format!("HTTP {}", status);
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        Err(ScreeningError::Api(format!(
            "Yahoo request failed after {} attempts: {}",
            attempts, last_error
        )))
    }

    /// Raw `quoteSummary` result object for a symbol
    pub async fn get_quote_summary(&self, symbol: &str) -> Result<Value, ScreeningError> {
        let url = format!("{}/{}", self.config.base_url, symbol);
        let response = self.send_request(&url, &[("modules", MODULES)]).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScreeningError::Api(format!("HTTP {} for {}: {}", status, symbol, body)));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ScreeningError::Parse(e.to_string()))?;

        json.get("quoteSummary")
            .and_then(|v| v.get("result"))
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .cloned()
            .ok_or_else(|| ScreeningError::Api(format!("No quote summary found for {}", symbol)))
    }

    pub async fn fetch_financial_data(&self, company_code: &str) -> Result<RawFinancialRecord, ScreeningError> {
        let summary = self.get_quote_summary(&tse_symbol(company_code)).await?;
        let record = parse_financials(company_code, &summary);
        tracing::debug!("Fetched financials for {}", company_code);
        Ok(record)
    }
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FinancialDataProvider for YahooClient {
    async fn fetch_financials(&self, company_code: &str) -> Result<RawFinancialRecord, ScreeningError> {
        self.fetch_financial_data(company_code).await
    }
}

/// Yahoo wraps numbers as `{"raw": 1.0, "fmt": "1.00"}`; plain numbers are accepted too.
/// NaN and infinities are treated as missing.
fn raw_f64(value: Option<&Value>) -> Option<f64> {
    let value = value?;
    value
        .get("raw")
        .and_then(|v| v.as_f64())
        .or_else(|| value.as_f64())
        .filter(|v| v.is_finite())
}

fn to_oku(value: Option<f64>) -> Option<f64> {
    value.map(|v| v / HUNDRED_MILLION)
}

fn module<'a>(summary: &'a Value, name: &str) -> Option<&'a Value> {
    summary.get(name).filter(|v| !v.is_null())
}

/// Statement `index` (0 = latest fiscal year) of a history module
fn statement<'a>(summary: &'a Value, module_name: &str, list: &str, index: usize) -> Option<&'a Value> {
    module(summary, module_name)?
        .get(list)?
        .as_array()?
        .get(index)
}

fn statement_value(summary: &Value, module_name: &str, list: &str, index: usize, key: &str) -> Option<f64> {
    to_oku(raw_f64(statement(summary, module_name, list, index).and_then(|s| s.get(key))))
}

/// Analyst average revenue estimate for an `earningsTrend` period (`0y`, `+1y`)
fn revenue_estimate(summary: &Value, period: &str) -> Option<f64> {
    let trend = module(summary, "earningsTrend")?.get("trend")?.as_array()?;
    let entry = trend
        .iter()
        .find(|t| t.get("period").and_then(|p| p.as_str()) == Some(period))?;
    to_oku(raw_f64(entry.get("revenueEstimate").and_then(|r| r.get("avg"))))
}

fn string_field(summary: &Value, module_name: &str, key: &str) -> Option<String> {
    module(summary, module_name)?
        .get(key)?
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Maps a `quoteSummary` result object onto a raw record.
///
/// Operating-profit estimates are not published by this source, so `op_cy` and
/// `op_ny` stay absent.
pub fn parse_financials(company_code: &str, summary: &Value) -> RawFinancialRecord {
    const INCOME: (&str, &str) = ("incomeStatementHistory", "incomeStatementHistory");
    const BALANCE: (&str, &str) = ("balanceSheetHistory", "balanceSheetStatements");
    const CASHFLOW: (&str, &str) = ("cashflowStatementHistory", "cashflowStatements");

    let income = |index: usize, key: &str| statement_value(summary, INCOME.0, INCOME.1, index, key);
    let balance = |key: &str| statement_value(summary, BALANCE.0, BALANCE.1, 0, key);
    let cashflow = |key: &str| statement_value(summary, CASHFLOW.0, CASHFLOW.1, 0, key);
    let stat = |module_name: &str, key: &str| raw_f64(module(summary, module_name).and_then(|m| m.get(key)));

    let company_name = string_field(summary, "price", "longName")
        .or_else(|| string_field(summary, "price", "shortName"))
        .unwrap_or_default();

    let listing_date = stat("quoteType", "firstTradeDateEpochUtc")
        .and_then(|epoch| DateTime::from_timestamp(epoch as i64, 0))
        .map(|dt| dt.date_naive());

    let market_cap = stat("price", "marketCap").or_else(|| stat("summaryDetail", "marketCap"));

    RawFinancialRecord {
        company_code: company_code.to_string(),
        company_name,
        sector: string_field(summary, "summaryProfile", "sector"),
        market: None,
        listing_date,
        market_cap: to_oku(market_cap),
        stock_price: stat("price", "regularMarketPrice"),

        revenue_2y: income(1, "totalRevenue"),
        revenue_1y: income(0, "totalRevenue"),
        revenue_cy: revenue_estimate(summary, "0y"),
        revenue_ny: revenue_estimate(summary, "+1y"),

        op_2y: income(1, "operatingIncome"),
        op_1y: income(0, "operatingIncome"),
        op_cy: None,
        op_ny: None,

        total_assets: balance("totalAssets"),
        equity: balance("totalStockholderEquity"),
        net_income: income(0, "netIncome"),
        operating_cf: cashflow("totalCashFromOperatingActivities"),
        investing_cf: cashflow("totalCashflowsFromInvestingActivities"),

        per_forward: stat("defaultKeyStatistics", "forwardPE").or_else(|| stat("summaryDetail", "forwardPE")),
        pbr: stat("defaultKeyStatistics", "priceToBook"),
        dividend_yield: stat("summaryDetail", "dividendYield").map(|v| v * 100.0),

        data_source: Some("yahoo".to_string()),
        fetched_at: Some(Utc::now()),
        data_status: DataStatus::Fresh,
        fetch_error: None,
    }
}
