//! Runtime configuration.
//!
//! Defaults target the public Binance data archive. Every field can be
//! overridden through an `ATLAS_*` environment variable.
//!
//! | Field | Env var | Default |
//! |-------|---------|---------|
//! | `base_url` | `ATLAS_BASE_URL` | `https://s3-ap-northeast-1.amazonaws.com/data.binance.vision/` |
//! | `base_prefix` | `ATLAS_BASE_PREFIX` | `data/futures/um/daily/` |
//! | `cache_path` | `ATLAS_CACHE_PATH` | `cache.json` |
//! | `table_path` | `ATLAS_TABLE_PATH` | `binance_instruments.csv` |
//! | `max_workers` | `ATLAS_MAX_WORKERS` | `15` |
//! | `timeout_ms` | `ATLAS_TIMEOUT_MS` | `10000` |
//! | `reference_datatype` | `ATLAS_REFERENCE_DATATYPE` | `aggTrades` |
//! | `reference_instrument` | `ATLAS_REFERENCE_INSTRUMENT` | `BTCUSDT` |
//! | `cache_mode` | `ATLAS_CACHE_MODE` | `use` |
//! | `retry.max_retries` | `ATLAS_MAX_RETRIES` | `3` |

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheMode, WindowCache};
use crate::collector::{Collector, DEFAULT_MAX_WORKERS};
use crate::domain::InstrumentPair;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::listing::ListingClient;
use crate::resolver::WindowResolver;
use crate::retry::RetryConfig;
use crate::staleness::StalenessDetector;
use crate::AtlasError;

pub const DEFAULT_BASE_URL: &str = "https://s3-ap-northeast-1.amazonaws.com/data.binance.vision/";
pub const DEFAULT_BASE_PREFIX: &str = "data/futures/um/daily/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    pub base_url: String,
    pub base_prefix: String,
    pub cache_path: PathBuf,
    pub table_path: PathBuf,
    pub max_workers: usize,
    pub timeout_ms: u64,
    pub reference_datatype: String,
    pub reference_instrument: String,
    pub cache_mode: CacheMode,
    pub retry: RetryConfig,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            base_url: String::from(DEFAULT_BASE_URL),
            base_prefix: String::from(DEFAULT_BASE_PREFIX),
            cache_path: PathBuf::from("cache.json"),
            table_path: PathBuf::from("binance_instruments.csv"),
            max_workers: DEFAULT_MAX_WORKERS,
            timeout_ms: 10_000,
            reference_datatype: String::from("aggTrades"),
            reference_instrument: String::from("BTCUSDT"),
            cache_mode: CacheMode::Use,
            retry: RetryConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, AtlasError> {
    value
        .trim()
        .parse()
        .map_err(|_| AtlasError::Config(format!("{name} has invalid value '{value}'")))
}

fn parse_cache_mode(value: &str) -> Result<CacheMode, AtlasError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "use" => Ok(CacheMode::Use),
        "refresh" => Ok(CacheMode::Refresh),
        "bypass" => Ok(CacheMode::Bypass),
        other => Err(AtlasError::Config(format!(
            "ATLAS_CACHE_MODE must be one of use, refresh, bypass: '{other}'"
        ))),
    }
}

impl AtlasConfig {
    /// Defaults overlaid with `ATLAS_*` variables from the process environment.
    pub fn from_env() -> Result<Self, AtlasError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each `ATLAS_*` name.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AtlasError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("ATLAS_BASE_URL") {
            config.base_url = value;
        }
        if let Some(value) = lookup("ATLAS_BASE_PREFIX") {
            config.base_prefix = value;
        }
        if let Some(value) = lookup("ATLAS_CACHE_PATH") {
            config.cache_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("ATLAS_TABLE_PATH") {
            config.table_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("ATLAS_MAX_WORKERS") {
            config.max_workers = parse_env("ATLAS_MAX_WORKERS", &value)?;
        }
        if let Some(value) = lookup("ATLAS_TIMEOUT_MS") {
            config.timeout_ms = parse_env("ATLAS_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("ATLAS_REFERENCE_DATATYPE") {
            config.reference_datatype = value;
        }
        if let Some(value) = lookup("ATLAS_REFERENCE_INSTRUMENT") {
            config.reference_instrument = value;
        }
        if let Some(value) = lookup("ATLAS_CACHE_MODE") {
            config.cache_mode = parse_cache_mode(&value)?;
        }
        if let Some(value) = lookup("ATLAS_MAX_RETRIES") {
            config.retry.max_retries = parse_env("ATLAS_MAX_RETRIES", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AtlasError> {
        if self.max_workers == 0 {
            return Err(AtlasError::Config(String::from(
                "max_workers must be at least 1",
            )));
        }
        if !self.base_prefix.is_empty() && !self.base_prefix.ends_with('/') {
            return Err(AtlasError::Config(format!(
                "base_prefix must end with '/': '{}'",
                self.base_prefix
            )));
        }
        if self.base_url.trim().is_empty() {
            return Err(AtlasError::Config(String::from("base_url cannot be empty")));
        }
        if self.timeout_ms == 0 {
            return Err(AtlasError::Config(String::from(
                "timeout_ms must be greater than zero",
            )));
        }
        Ok(())
    }

    pub fn reference_pair(&self) -> InstrumentPair {
        InstrumentPair::new(&self.reference_datatype, &self.reference_instrument)
    }

    pub fn listing_client(&self, http_client: Arc<dyn HttpClient>) -> ListingClient {
        ListingClient::new(http_client, &self.base_url, &self.base_prefix)
            .with_timeout_ms(self.timeout_ms)
            .with_retry(self.retry.clone())
    }

    /// Wires a collector and staleness detector sharing one listing client.
    pub fn build_with(
        &self,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<(Collector, StalenessDetector), AtlasError> {
        self.validate()?;

        let listing = Arc::new(self.listing_client(http_client));
        let cache = WindowCache::load(&self.cache_path);
        let resolver = WindowResolver::new(Arc::clone(&listing), cache).with_mode(self.cache_mode);
        let collector = Collector::new(Arc::clone(&listing), resolver)
            .with_max_workers(self.max_workers);
        let detector = StalenessDetector::new(listing, &self.table_path, self.reference_pair());

        Ok((collector, detector))
    }

    /// [`build_with`](Self::build_with) using the reqwest transport.
    pub fn build(&self) -> Result<(Collector, StalenessDetector), AtlasError> {
        self.build_with(Arc::new(ReqwestHttpClient::new()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_the_public_archive() {
        let config = AtlasConfig::default();
        assert_eq!(config.base_prefix, "data/futures/um/daily/");
        assert_eq!(config.max_workers, 15);
        assert_eq!(config.timeout_ms, 10_000);
        assert_eq!(config.reference_pair(), InstrumentPair::new("aggTrades", "BTCUSDT"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = AtlasConfig::from_lookup(lookup(&[
            ("ATLAS_BASE_PREFIX", "data/spot/daily/"),
            ("ATLAS_MAX_WORKERS", "4"),
            ("ATLAS_CACHE_MODE", "refresh"),
            ("ATLAS_MAX_RETRIES", "1"),
        ]))
        .expect("valid overrides");

        assert_eq!(config.base_prefix, "data/spot/daily/");
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.cache_mode, CacheMode::Refresh);
        assert_eq!(config.retry.max_retries, 1);
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        let error = AtlasConfig::from_lookup(lookup(&[("ATLAS_MAX_WORKERS", "many")]))
            .expect_err("not a number");
        assert!(matches!(error, AtlasError::Config(_)));
    }

    #[test]
    fn zero_workers_and_unterminated_prefix_are_rejected() {
        assert!(AtlasConfig::from_lookup(lookup(&[("ATLAS_MAX_WORKERS", "0")])).is_err());
        assert!(AtlasConfig::from_lookup(lookup(&[("ATLAS_BASE_PREFIX", "data")])).is_err());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: AtlasConfig =
            serde_json::from_str(r#"{"max_workers": 3, "cache_mode": "bypass"}"#).expect("parse");
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.cache_mode, CacheMode::Bypass);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }
}
