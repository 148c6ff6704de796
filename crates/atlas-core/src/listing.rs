//! Bucket listing client.
//!
//! Issues `GET {base_url}?delimiter=/&prefix=...` queries against an
//! S3-compatible endpoint and extracts `<Prefix>` and `<LastModified>` markers
//! from the XML body. One response is read per query; continuation tokens are
//! not followed.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use time::Date;
use tracing::{debug, warn};

use crate::domain::{timestamp_date, InstrumentPair};
use crate::http_client::{HttpClient, HttpRequest};
use crate::retry::{execute_with_retry, RetryConfig};
use crate::AtlasError;

fn prefix_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<Prefix>([^<]*)</Prefix>").expect("prefix marker pattern is valid")
    })
}

fn last_modified_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<LastModified>([^<]*)</LastModified>")
            .expect("last-modified marker pattern is valid")
    })
}

/// Returns the names of the immediate children of `prefix` found in `xml`.
///
/// A `<Prefix>` value qualifies only when it starts with `prefix` exactly and
/// the remainder is a single non-empty segment terminated by `/`. The queried
/// prefix itself, which S3 echoes back, never qualifies.
pub fn parse_child_prefixes(xml: &str, prefix: &str) -> Vec<String> {
    prefix_marker()
        .captures_iter(xml)
        .filter_map(|captures| {
            let value = captures.get(1)?.as_str();
            let rest = value.strip_prefix(prefix)?;
            let name = rest.strip_suffix('/')?;
            if name.is_empty() || name.contains('/') {
                return None;
            }
            Some(name.to_owned())
        })
        .collect()
}

/// Returns the raw `<LastModified>` values in response order.
pub fn parse_timestamps(xml: &str) -> Vec<String> {
    last_modified_marker()
        .captures_iter(xml)
        .filter_map(|captures| captures.get(1).map(|m| m.as_str().trim().to_owned()))
        .collect()
}

/// Converts raw timestamps into calendar dates, skipping malformed entries.
pub fn timestamp_dates(timestamps: &[String]) -> Vec<Date> {
    timestamps
        .iter()
        .filter_map(|timestamp| match timestamp_date(timestamp) {
            Ok(date) => Some(date),
            Err(error) => {
                warn!(%timestamp, %error, "skipping unparseable LastModified value");
                None
            }
        })
        .collect()
}

/// Listing client bound to one bucket endpoint and base prefix.
#[derive(Clone)]
pub struct ListingClient {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    base_prefix: String,
    timeout_ms: u64,
    retry: RetryConfig,
}

impl ListingClient {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        base_prefix: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
            base_prefix: base_prefix.into(),
            timeout_ms: 10_000,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_prefix(&self) -> &str {
        &self.base_prefix
    }

    /// Builds the listing URL. `delimiter=/` restricts the answer to one level.
    pub fn listing_url(&self, prefix: &str, one_level: bool) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        let encoded_prefix = urlencoding::encode(prefix);
        if one_level {
            format!(
                "{}{separator}delimiter=%2F&prefix={encoded_prefix}",
                self.base_url
            )
        } else {
            format!("{}{separator}prefix={encoded_prefix}", self.base_url)
        }
    }

    async fn fetch(&self, prefix: &str, one_level: bool) -> Result<String, AtlasError> {
        let request = HttpRequest::get(self.listing_url(prefix, one_level))
            .with_header("Accept", "application/xml")
            .with_timeout_ms(self.timeout_ms);
        let response = execute_with_retry(self.http_client.as_ref(), &request, &self.retry).await?;
        Ok(response.body)
    }

    /// Immediate child prefix names under an absolute `prefix` (no guaranteed order).
    pub async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>, AtlasError> {
        let xml = self.fetch(prefix, true).await?;
        let children = parse_child_prefixes(&xml, prefix);
        debug!(prefix, count = children.len(), "listed child prefixes");
        Ok(children)
    }

    /// Every `<LastModified>` value under an absolute `prefix`, in response order.
    pub async fn list_timestamps(&self, prefix: &str) -> Result<Vec<String>, AtlasError> {
        let xml = self.fetch(prefix, false).await?;
        let timestamps = parse_timestamps(&xml);
        debug!(prefix, count = timestamps.len(), "listed object timestamps");
        Ok(timestamps)
    }

    /// Datatype categories directly under the base prefix.
    pub async fn list_datatypes(&self) -> Result<Vec<String>, AtlasError> {
        let prefix = self.base_prefix.clone();
        self.list_prefixes(&prefix).await
    }

    /// Instruments under one datatype.
    pub async fn list_instruments(&self, datatype: &str) -> Result<Vec<String>, AtlasError> {
        let prefix = format!("{}{datatype}/", self.base_prefix);
        self.list_prefixes(&prefix).await
    }

    /// Object timestamps for one `(datatype, instrument)` pair.
    pub async fn list_pair_timestamps(
        &self,
        pair: &InstrumentPair,
    ) -> Result<Vec<String>, AtlasError> {
        let prefix = format!("{}{}", self.base_prefix, pair.relative_prefix());
        self.list_timestamps(&prefix).await
    }
}
