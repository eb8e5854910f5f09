//! C2 — reliability layer: rate limit, retry-with-backoff, circuit breaker.
//!
//! Wraps a [`Transport`] per logical source client. The teacher has no
//! precedent for this (no rate limiter, no breaker anywhere in
//! `polymarket/client.rs`), so the state machine here is new, shaped after
//! the reconnect/backoff loop in `live_scores/websocket.rs`
//! (`backoff_secs = (backoff_secs * 2).min(cap)`).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use serde::de::DeserializeOwned;

use crate::error::PipelineError;
use crate::http::transport::{Body, RawResponse, Transport};

#[derive(Debug, Default, Clone)]
pub struct Metrics {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
}

struct BreakerState {
    failures: u32,
    opened_at: Option<DateTime<Utc>>,
    is_open: bool,
}

impl BreakerState {
    fn new() -> Self {
        BreakerState {
            failures: 0,
            opened_at: None,
            is_open: false,
        }
    }
}

struct RateLimitState {
    last_request_at: Option<DateTime<Utc>>,
}

/// Per-instance reliability wrapper. One of these per logical source
/// (ESPN, odds provider, weather, ratings feed), never shared across
/// sources — breaker state does not fate-share between clients.
pub struct ReliableClient {
    transport: Transport,
    name: String,
    rate_limit: Duration,
    retry_attempts: u32,
    backoff_cap: Duration,
    breaker_threshold: u32,
    breaker_reset: chrono::Duration,
    rate_state: Mutex<RateLimitState>,
    breaker: Mutex<BreakerState>,
    metrics: Mutex<Metrics>,
}

impl ReliableClient {
    pub fn new(
        transport: Transport,
        name: impl Into<String>,
        rate_limit_ms: u64,
        retry_attempts: u32,
        backoff_cap_secs: u64,
        breaker_threshold: u32,
        breaker_reset_secs: i64,
    ) -> Arc<Self> {
        Arc::new(ReliableClient {
            transport,
            name: name.into(),
            rate_limit: Duration::from_millis(rate_limit_ms),
            retry_attempts,
            backoff_cap: Duration::from_secs(backoff_cap_secs),
            breaker_threshold,
            breaker_reset: chrono::Duration::seconds(breaker_reset_secs),
            rate_state: Mutex::new(RateLimitState {
                last_request_at: None,
            }),
            breaker: Mutex::new(BreakerState::new()),
            metrics: Mutex::new(Metrics::default()),
        })
    }

    pub async fn metrics(&self) -> Metrics {
        self.metrics.lock().await.clone()
    }

    /// GET through the full C1 -> C2 stack: breaker check, rate-limit
    /// sleep, retry with exponential backoff.
    pub async fn get(&self, url: &str) -> Result<RawResponse, PipelineError> {
        self.check_breaker().await?;
        self.enforce_rate_limit().await;

        let mut attempt = 0u32;
        let mut backoff = Duration::from_secs(1);
        loop {
            attempt += 1;
            {
                let mut m = self.metrics.lock().await;
                m.requests += 1;
            }

            match self.transport.get(url).await {
                Ok(raw) if raw.status >= 500 => {
                    self.record_failure().await;
                    if attempt >= self.retry_attempts {
                        return Err(PipelineError::TransientNetwork(format!(
                            "{}: HTTP {} after {} attempts",
                            self.name, raw.status, attempt
                        )));
                    }
                    self.sleep_backoff(&mut backoff, attempt).await;
                }
                Ok(raw) if raw.status >= 400 => {
                    // 4xx: not retried (§4.2), except 429 handled by caller via Retry-After.
                    self.record_failure().await;
                    return Err(PipelineError::ClientError {
                        status: raw.status,
                        message: format!("{} returned HTTP {}", self.name, raw.status),
                    });
                }
                Ok(raw) => {
                    self.record_success().await;
                    return Ok(raw);
                }
                Err(e) => {
                    self.record_failure().await;
                    if attempt >= self.retry_attempts {
                        return Err(PipelineError::TransientNetwork(format!(
                            "{}: {} after {} attempts",
                            self.name, e, attempt
                        )));
                    }
                    self.sleep_backoff(&mut backoff, attempt).await;
                }
            }
        }
    }

    /// GET and decode a JSON body, for adapters that only want the typed
    /// payload and not the raw transport response.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, PipelineError> {
        let raw = self.get(url).await?;
        match raw.body {
            Body::Json(v) => serde_json::from_value(v).map_err(|e| PipelineError::ParseError {
                source: self.name.clone(),
                message: e.to_string(),
            }),
            Body::Bytes(bytes) => serde_json::from_slice(&bytes).map_err(|e| PipelineError::ParseError {
                source: self.name.clone(),
                message: e.to_string(),
            }),
        }
    }

    async fn sleep_backoff(&self, backoff: &mut Duration, attempt: u32) {
        {
            let mut m = self.metrics.lock().await;
            m.retries += 1;
        }
        // Full jitter (0..backoff) so N clients backing off together don't
        // all retry on the same tick.
        let jittered = Duration::from_secs_f64(backoff.as_secs_f64() * rand::random::<f64>());
        debug!(client = %self.name, attempt, backoff_secs = jittered.as_secs_f64(), "retrying");
        tokio::time::sleep(jittered).await;
        *backoff = (*backoff * 2).min(self.backoff_cap);
    }

    async fn enforce_rate_limit(&self) {
        let mut state = self.rate_state.lock().await;
        if let Some(last) = state.last_request_at {
            let elapsed = Utc::now() - last;
            let elapsed = elapsed.to_std().unwrap_or(Duration::ZERO);
            if elapsed < self.rate_limit {
                tokio::time::sleep(self.rate_limit - elapsed).await;
            }
        }
        state.last_request_at = Some(Utc::now());
    }

    async fn check_breaker(&self) -> Result<(), PipelineError> {
        let breaker = self.breaker.lock().await;
        if breaker.is_open {
            if let Some(opened_at) = breaker.opened_at {
                if Utc::now() < opened_at + self.breaker_reset {
                    return Err(PipelineError::BreakerOpen {
                        reset_at: opened_at + self.breaker_reset,
                    });
                }
                // half-open: fall through, let this call probe.
            }
        }
        Ok(())
    }

    async fn record_failure(&self) {
        {
            let mut m = self.metrics.lock().await;
            m.failures += 1;
        }
        let mut breaker = self.breaker.lock().await;
        breaker.failures += 1;
        if breaker.failures >= self.breaker_threshold && !breaker.is_open {
            breaker.is_open = true;
            breaker.opened_at = Some(Utc::now());
            warn!(client = %self.name, failures = breaker.failures, "circuit breaker opened");
        } else if breaker.is_open {
            // Half-open probe failed: re-open the window.
            breaker.opened_at = Some(Utc::now());
        }
    }

    async fn record_success(&self) {
        {
            let mut m = self.metrics.lock().await;
            m.successes += 1;
        }
        let mut breaker = self.breaker.lock().await;
        if breaker.failures > 0 {
            breaker.failures -= 1;
        }
        if breaker.is_open && breaker.failures == 0 {
            breaker.is_open = false;
            breaker.opened_at = None;
        }
    }
}
