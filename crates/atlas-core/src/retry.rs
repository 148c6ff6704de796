//! Retry logic with exponential backoff and jitter.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http_client::{HttpClient, HttpErrorKind, HttpRequest, HttpResponse};
use crate::AtlasError;

/// Backoff strategy for retrying failed requests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Delay is `base * (factor ^ attempt)`, capped at `max`.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(300),
            factor: 2.0,
            max: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based). Jitter scales the capped
    /// delay by a uniform factor in `[0.5, 1.5)`.
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = (base.as_secs_f64() * factor.powi(exponent)).min(max.as_secs_f64());
                let capped = Duration::from_secs_f64(seconds.max(0.0));
                if jitter {
                    capped.mul_f64(0.5 + fastrand::f64())
                } else {
                    capped
                }
            }
        }
    }
}

/// Configuration for the automatic retry mechanism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
    /// HTTP status codes that trigger a retry. Client errors never belong here.
    pub retry_on_status: Vec<u16>,
    pub retry_on_timeout: bool,
    pub retry_on_connect: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            backoff: Backoff::default(),
            retry_on_status: vec![500, 502, 503, 504],
            retry_on_timeout: true,
            retry_on_connect: true,
        }
    }
}

impl RetryConfig {
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status)
    }

    pub fn should_retry_error(&self, kind: HttpErrorKind) -> bool {
        match kind {
            HttpErrorKind::Timeout => self.retry_on_timeout,
            HttpErrorKind::Connect => self.retry_on_connect,
            HttpErrorKind::Body | HttpErrorKind::Other => false,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    const fn attempts(&self) -> u32 {
        if self.enabled {
            self.max_retries + 1
        } else {
            1
        }
    }
}

/// Executes `request` until it succeeds, fails permanently, or the retry
/// budget is exhausted. Non-2xx responses are converted to transport errors.
pub async fn execute_with_retry(
    client: &dyn HttpClient,
    request: &HttpRequest,
    config: &RetryConfig,
) -> Result<HttpResponse, AtlasError> {
    let attempts = config.attempts();
    let mut attempt = 0;

    loop {
        let has_budget = attempt + 1 < attempts;
        let outcome = client.execute(request.clone()).await;

        let retry = match &outcome {
            Ok(response) if response.is_success() => false,
            Ok(response) => has_budget && config.should_retry_status(response.status),
            Err(error) => has_budget && config.should_retry_error(error.kind()),
        };

        if !retry {
            return match outcome {
                Ok(response) if response.is_success() => Ok(response),
                Ok(response) => Err(AtlasError::transport_status(
                    response.status,
                    format!("GET {} returned status {}", request.url, response.status),
                )),
                Err(error) => Err(AtlasError::transport(format!(
                    "GET {} failed: {}",
                    request.url,
                    error.message()
                ))),
            };
        }

        let delay = config.delay_for_attempt(attempt);
        debug!(
            url = %request.url,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "retrying listing request"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
