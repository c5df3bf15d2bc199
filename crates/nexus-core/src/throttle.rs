//! Per-host request throttling for polite page fetching.
//!
//! Wraps any [`Fetcher`] so that two requests to the same host are at least
//! `delay` apart, plus an optional random jitter.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use nexus_core::throttle::{ThrottledFetcher, ThrottleConfig};
//! # use nexus_core::traits::Fetcher;
//! # #[derive(Clone)] struct MyFetcher;
//! # impl Fetcher for MyFetcher {
//! #     async fn fetch(&self, _: &str) -> Result<String, nexus_core::error::AppError> { todo!() }
//! # }
//! let config = ThrottleConfig::new(Duration::from_secs(1)).with_jitter(Duration::from_secs(1));
//! let fetcher = ThrottledFetcher::new(MyFetcher, config);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::config::RateLimitConfig;
use crate::error::AppError;
use crate::traits::Fetcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Minimum delay between consecutive requests to the same host.
    pub delay: Duration,
    /// Upper bound of the uniform random delay added on top of `delay`.
    pub jitter: Duration,
}

impl ThrottleConfig {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn effective_delay(&self) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return self.delay;
        }
        self.delay + Duration::from_millis(fastrand::u64(..jitter_ms))
    }
}

impl From<&RateLimitConfig> for ThrottleConfig {
    fn from(rate_limit: &RateLimitConfig) -> Self {
        Self::new(rate_limit.delay()).with_jitter(rate_limit.jitter())
    }
}

/// A [`Fetcher`] wrapper that spaces out requests per host.
///
/// The first request to a host goes out immediately.
#[derive(Clone)]
pub struct ThrottledFetcher<F> {
    inner: F,
    config: ThrottleConfig,
    /// Earliest instant the next request to each host may start.
    next_slot: Arc<Mutex<HashMap<String, Instant>>>,
}

impl<F: Fetcher> ThrottledFetcher<F> {
    pub fn new(inner: F, config: ThrottleConfig) -> Self {
        Self {
            inner,
            config,
            next_slot: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `scheme://host:port`, or `None` for URLs without a host.
    fn host_key(url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        let host = url.host_str()?;
        let port = url.port_or_known_default().unwrap_or(0);
        Some(format!("{}://{}:{}", url.scheme(), host, port))
    }

    /// Reserve the next slot for `host` and sleep until it starts.
    ///
    /// The reservation is made under the lock, the sleep happens outside it,
    /// so concurrent callers queue up without blocking other hosts.
    async fn acquire_slot(&self, host: &str) {
        let now = Instant::now();
        let start = {
            let mut slots = self.next_slot.lock().await;
            let start = slots.get(host).copied().map_or(now, |slot| slot.max(now));
            slots.insert(host.to_string(), start + self.config.effective_delay());
            start
        };

        if start > now {
            let wait = start - now;
            tracing::debug!(host = %host, sleep_ms = %wait.as_millis(), "Throttling request");
            tokio::time::sleep_until(start).await;
        }
    }
}

impl<F: Fetcher> Fetcher for ThrottledFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        if let Some(host) = Self::host_key(url) {
            self.acquire_slot(&host).await;
        }
        self.inner.fetch(url).await
    }
}
