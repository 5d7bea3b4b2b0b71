use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub database_url: String,
    pub concurrency: usize,
    /// Attempts per upstream request, including the first
    pub retry_max: u32,
    pub stock_list_path: String,
    pub yahoo_base_url: Option<String>,
    pub http_timeout_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:screening.db".to_string(),
            concurrency: 5,
            retry_max: 3,
            stock_list_path: "data/stock_list.csv".to_string(),
            yahoo_base_url: None,
            http_timeout_secs: 30,
        }
    }
}

impl BatchConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            database_url: var("DATABASE_URL").unwrap_or(defaults.database_url),
            concurrency: match var("BATCH_CONCURRENCY") {
                Some(v) => v.parse().with_context(|| format!("BATCH_CONCURRENCY: invalid value {:?}", v))?,
                None => defaults.concurrency,
            },
            retry_max: match var("BATCH_RETRY_MAX") {
                Some(v) => v.parse().with_context(|| format!("BATCH_RETRY_MAX: invalid value {:?}", v))?,
                None => defaults.retry_max,
            },
            stock_list_path: var("STOCK_LIST_PATH").unwrap_or(defaults.stock_list_path),
            yahoo_base_url: var("YAHOO_BASE_URL"),
            http_timeout_secs: match var("HTTP_TIMEOUT_SECS") {
                Some(v) => v.parse().with_context(|| format!("HTTP_TIMEOUT_SECS: invalid value {:?}", v))?,
                None => defaults.http_timeout_secs,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("BATCH_CONCURRENCY must be at least 1");
        }
        if self.retry_max == 0 {
            bail!("BATCH_RETRY_MAX must be at least 1");
        }
        if self.http_timeout_secs == 0 {
            bail!("HTTP_TIMEOUT_SECS must be at least 1");
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
