use std::env;
use std::time::Duration;

use crate::error::{Result, ScanError};
use crate::pricing::margin::{MarginThresholds, INVESTIGATE_FLOOR_PCT, MIN_OPPORTUNITY, PROFIT_FLOOR_PCT};
use crate::scan::dispatcher::DispatcherConfig;
use crate::scan::job::ScanSettings;

pub const DEFAULT_SP_API_ENDPOINT: &str = "https://sellingpartnerapi-eu.amazon.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub requests_per_second: f64,
    pub jitter_fraction: f64,
    pub max_retries: u32,
    pub base_retry_delay_ms: u64,
    pub max_retry_delay_secs: u64,
    pub worker_count: usize,
    pub cancel_poll_interval_secs: u64,
    pub sp_api_endpoint: String,
    pub marketplace_id: String,
    pub seller_id: String,
    pub access_token: Option<String>,
    pub token_ttl_secs: u64,
    pub token_refresh_skew_secs: u64,
    pub request_timeout_secs: u64,
    pub catalog_path: String,
    pub cost_model_path: String,
    pub store_path: String,
    pub profit_floor_pct: f64,
    pub investigate_floor_pct: f64,
    pub min_opportunity: f64,
    /// Keys whose values were present but could not be parsed.
    pub invalid_keys: Vec<String>,
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    invalid: &mut Vec<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("⚠️ Ignoring unparseable {}={:?}", key, raw);
                invalid.push(key.to_string());
                default
            }
        },
        None => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Unparseable values fall
    /// back to their defaults and are listed in `invalid_keys`, which fails
    /// `validate`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = ScanSettings::default();
        let mut invalid = Vec::new();
        Config {
            requests_per_second: parsed(&lookup, &mut invalid, "SCAN_REQUESTS_PER_SECOND", defaults.requests_per_second),
            jitter_fraction: parsed(&lookup, &mut invalid, "SCAN_JITTER_FRACTION", defaults.jitter_fraction),
            max_retries: parsed(&lookup, &mut invalid, "SCAN_MAX_RETRIES", defaults.max_retries),
            base_retry_delay_ms: parsed(&lookup, &mut invalid, "SCAN_BASE_RETRY_DELAY_MS", 1000),
            max_retry_delay_secs: parsed(&lookup, &mut invalid, "SCAN_MAX_RETRY_DELAY_SECS", 300),
            worker_count: parsed(&lookup, &mut invalid, "SCAN_WORKER_COUNT", 4),
            cancel_poll_interval_secs: parsed(&lookup, &mut invalid, "SCAN_CANCEL_POLL_INTERVAL_SECS", 5),
            sp_api_endpoint: lookup("SP_API_ENDPOINT").unwrap_or_else(|| DEFAULT_SP_API_ENDPOINT.to_string()),
            marketplace_id: lookup("SP_API_MARKETPLACE_ID").unwrap_or_default(),
            seller_id: lookup("SP_API_SELLER_ID").unwrap_or_default(),
            access_token: lookup("SP_API_ACCESS_TOKEN").filter(|t| !t.trim().is_empty()),
            token_ttl_secs: parsed(&lookup, &mut invalid, "SP_API_TOKEN_TTL_SECS", 3600),
            token_refresh_skew_secs: parsed(&lookup, &mut invalid, "SP_API_TOKEN_REFRESH_SKEW_SECS", 60),
            request_timeout_secs: parsed(&lookup, &mut invalid, "SP_API_REQUEST_TIMEOUT_SECS", 15),
            catalog_path: lookup("CATALOG_PATH").unwrap_or_else(|| "catalog.json".to_string()),
            cost_model_path: lookup("COST_MODEL_PATH").unwrap_or_else(|| "cost_model.json".to_string()),
            store_path: lookup("STORE_PATH").unwrap_or_else(|| "scan_store.json".to_string()),
            profit_floor_pct: parsed(&lookup, &mut invalid, "PROFIT_FLOOR_PCT", PROFIT_FLOOR_PCT),
            investigate_floor_pct: parsed(&lookup, &mut invalid, "INVESTIGATE_FLOOR_PCT", INVESTIGATE_FLOOR_PCT),
            min_opportunity: parsed(&lookup, &mut invalid, "MIN_OPPORTUNITY", MIN_OPPORTUNITY),
            invalid_keys: invalid,
        }
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            requests_per_second: self.requests_per_second,
            jitter_fraction: self.jitter_fraction,
            max_retries: self.max_retries,
        }
    }

    pub fn thresholds(&self) -> MarginThresholds {
        MarginThresholds {
            profit_floor_pct: self.profit_floor_pct,
            investigate_floor_pct: self.investigate_floor_pct,
            min_opportunity: self.min_opportunity,
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            worker_count: self.worker_count,
            marketplace_id: self.marketplace_id.clone(),
            seller_id: self.seller_id.clone(),
            base_retry_delay: Duration::from_millis(self.base_retry_delay_ms),
            max_retry_delay: Duration::from_secs(self.max_retry_delay_secs),
            thresholds: self.thresholds(),
        }
    }

    pub fn cancel_poll_interval(&self) -> Duration {
        Duration::from_secs(self.cancel_poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.invalid_keys.is_empty() {
            return Err(ScanError::ConfigurationError(format!(
                "unparseable values for: {}",
                self.invalid_keys.join(", ")
            )));
        }
        self.scan_settings().validate()?;

        if self.worker_count == 0 {
            return Err(ScanError::ConfigurationError("SCAN_WORKER_COUNT must be at least 1".to_string()));
        }
        if self.max_retry_delay_secs * 1000 < self.base_retry_delay_ms {
            return Err(ScanError::ConfigurationError(
                "SCAN_MAX_RETRY_DELAY_SECS must not be below SCAN_BASE_RETRY_DELAY_MS".to_string(),
            ));
        }
        let thresholds = [self.profit_floor_pct, self.investigate_floor_pct, self.min_opportunity];
        if thresholds.iter().any(|v| !v.is_finite()) {
            return Err(ScanError::ConfigurationError("margin thresholds must be finite".to_string()));
        }
        if self.profit_floor_pct > self.investigate_floor_pct {
            return Err(ScanError::ConfigurationError(
                "PROFIT_FLOOR_PCT cannot exceed INVESTIGATE_FLOOR_PCT".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks the settings needed to call the pricing endpoint.
    pub fn validate_sp_api(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("SP_API_MARKETPLACE_ID", self.marketplace_id.is_empty()),
            ("SP_API_SELLER_ID", self.seller_id.is_empty()),
            ("SP_API_ACCESS_TOKEN", self.access_token.is_none()),
        ]
        .iter()
        .filter(|(_, missing)| *missing)
        .map(|(key, _)| *key)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ScanError::ConfigurationError(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn log_settings(&self) {
        log::info!(
            "Scan configuration: {:.3} req/s, jitter {:.2}, max retries {}, {} workers, base retry delay {}ms",
            self.requests_per_second,
            self.jitter_fraction,
            self.max_retries,
            self.worker_count,
            self.base_retry_delay_ms
        );
        log::info!(
            "SP-API: endpoint {}, marketplace {}, seller {}, token {}",
            self.sp_api_endpoint,
            self.marketplace_id,
            self.seller_id,
            if self.access_token.is_some() { "set" } else { "missing" }
        );
        log::info!(
            "Files: catalog {}, cost model {}, store {}",
            self.catalog_path,
            self.cost_model_path,
            self.store_path
        );
    }
}
