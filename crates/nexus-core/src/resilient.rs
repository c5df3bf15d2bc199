//! HTTP client with a per-client circuit breaker and exponential-backoff retries.
//!
//! Every verb goes through [`ResilientClient::request_with_retry`]:
//!
//! - the path is resolved, then the breaker is consulted; an open circuit
//!   fails fast with no request;
//! - transport errors (including timeouts) and 5xx responses count as breaker
//!   failures and are retried after `backoff_factor * 2^attempt` seconds;
//!   errors that [`AppError::should_trip_circuit`] rejects end the call with no
//!   breaker update;
//! - any status below 500 is a completed round trip: breaker success, no retry.
//!
//! Expected network failures never surface as errors. Callers get `None`
//! (or `false` for DELETE); only configuration problems return `Err`.

use std::collections::BTreeMap;
use std::time::Duration;

use url::Url;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::AppError;
use crate::models::{HttpMethod, HttpRequest, HttpResponse, ResponseBody};
use crate::traits::Transport;

/// Per-call options for the resilient client.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Merged over the client's default headers.
    pub headers: BTreeMap<String, String>,
    /// Appended to the resolved URL as query parameters.
    pub query: Vec<(String, String)>,
    /// Retries after the first attempt, so at most `retries + 1` requests.
    pub retries: u32,
    pub backoff_factor: f64,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: BTreeMap::new(),
            query: Vec::new(),
            retries: 3,
            backoff_factor: 1.0,
            timeout: Duration::from_secs(30),
        }
    }
}

impl RequestOptions {
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Delay before the retry that follows `attempt` (0-indexed).
pub fn backoff_delay(backoff_factor: f64, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let secs = (backoff_factor * 2f64.powi(exponent)).max(0.0);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Resilient HTTP client bound to one base URL.
///
/// Owns its transport for the lifetime of the session; dropping the client
/// releases it on every exit path.
pub struct ResilientClient<T: Transport> {
    base_url: Url,
    headers: BTreeMap<String, String>,
    transport: T,
    breaker: CircuitBreaker,
    redact_paths: bool,
}

impl<T: Transport> ResilientClient<T> {
    /// Creates a client with the default breaker (5 failures, 60s open timeout).
    ///
    /// Fails with [`AppError::ConfigError`] if `base_url` cannot be parsed.
    pub fn new(base_url: &str, transport: T) -> Result<Self, AppError> {
        Self::with_breaker_config(base_url, transport, CircuitBreakerConfig::default())
    }

    pub fn with_breaker_config(
        base_url: &str,
        transport: T,
        config: CircuitBreakerConfig,
    ) -> Result<Self, AppError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid base URL '{base_url}': {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(AppError::ConfigError(format!(
                "Base URL '{base_url}' cannot be used to resolve paths"
            )));
        }

        tracing::debug!(origin = %parsed.origin().ascii_serialization(), "Opening HTTP session");

        Ok(Self {
            breaker: CircuitBreaker::new(parsed.as_str(), config),
            base_url: parsed,
            headers: BTreeMap::new(),
            transport,
            redact_paths: false,
        })
    }

    /// Keep paths and queries out of logs and the breaker name.
    ///
    /// For endpoints whose URL carries a credential, such as chat webhooks or
    /// bot tokens.
    pub fn with_redacted_paths(mut self) -> Self {
        self.breaker = CircuitBreaker::new(redacted(&self.base_url), self.breaker.config().clone());
        self.redact_paths = true;
        self
    }

    /// Headers sent with every request of this session.
    pub fn with_default_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Resolves `path` against the base URL with URL-join semantics.
    pub fn resolve(&self, path: &str, query: &[(String, String)]) -> Result<Url, AppError> {
        let mut url = self.base_url.join(path).map_err(|e| {
            let shown = if self.redact_paths { "<redacted>" } else { path };
            AppError::ConfigError(format!(
                "Cannot resolve '{shown}' against {}: {e}",
                self.display_url(&self.base_url)
            ))
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    pub async fn get(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<Option<ResponseBody>, AppError> {
        let response = self
            .request_with_retry(HttpMethod::Get, path, None, options)
            .await?;
        Ok(response.filter(|r| r.status == 200).map(|r| r.decode()))
    }

    pub async fn post(
        &self,
        path: &str,
        body: Option<&serde_json::Value>,
        options: &RequestOptions,
    ) -> Result<Option<ResponseBody>, AppError> {
        let response = self
            .request_with_retry(HttpMethod::Post, path, body, options)
            .await?;
        Ok(response.filter(|r| r.status < 300).map(|r| r.decode()))
    }

    pub async fn put(
        &self,
        path: &str,
        body: Option<&serde_json::Value>,
        options: &RequestOptions,
    ) -> Result<Option<ResponseBody>, AppError> {
        let response = self
            .request_with_retry(HttpMethod::Put, path, body, options)
            .await?;
        Ok(response.filter(|r| r.status < 300).map(|r| r.decode()))
    }

    /// Returns true iff the server answered with a status below 300.
    pub async fn delete(&self, path: &str, options: &RequestOptions) -> Result<bool, AppError> {
        let response = self
            .request_with_retry(HttpMethod::Delete, path, None, options)
            .await?;
        Ok(response.is_some_and(|r| r.status < 300))
    }

    /// Issues the request, retrying transport errors and 5xx responses.
    ///
    /// Returns `Ok(None)` when the circuit is open or all attempts failed.
    /// An unresolvable `path` is reported before the breaker is consulted, so
    /// it never uses up a half-open trial.
    pub async fn request_with_retry(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&serde_json::Value>,
        options: &RequestOptions,
    ) -> Result<Option<HttpResponse>, AppError> {
        let url = self.resolve(path, &options.query)?;
        let shown = self.display_url(&url);

        if !self.breaker.is_allowed() {
            tracing::warn!(
                circuit = %self.breaker.name(),
                %method,
                url = %shown,
                "Circuit breaker is open, request not sent"
            );
            return Ok(None);
        }

        let mut headers = self.headers.clone();
        headers.extend(options.headers.clone());

        let mut last_error: Option<AppError> = None;

        for attempt in 0..=options.retries {
            let request = HttpRequest {
                method,
                url: url.to_string(),
                headers: headers.clone(),
                body: body.cloned(),
                timeout: options.timeout,
            };

            let outcome = tokio::time::timeout(options.timeout, self.transport.issue(request))
                .await
                .unwrap_or_else(|_| Err(AppError::Timeout(options.timeout.as_secs())));

            match outcome {
                Ok(response) if !response.is_server_error() => {
                    self.breaker.record_success();
                    tracing::debug!(%method, url = %shown, status = response.status, "Request completed");
                    return Ok(Some(response));
                }
                Ok(response) => {
                    self.breaker.record_failure();
                    tracing::warn!(
                        %method,
                        url = %shown,
                        status = response.status,
                        attempt = attempt + 1,
                        "HTTP {} for {}",
                        response.status,
                        shown
                    );
                    last_error = Some(AppError::ServerError {
                        status: response.status,
                        url: shown.clone(),
                    });
                }
                Err(e) if e.should_trip_circuit() => {
                    self.breaker.record_failure();
                    tracing::warn!(
                        %method,
                        url = %shown,
                        attempt = attempt + 1,
                        error = %e,
                        "Request failed (attempt {})",
                        attempt + 1
                    );
                    last_error = Some(e);
                }
                Err(e) => {
                    // Not an endpoint fault: leave the breaker alone and stop.
                    tracing::error!(%method, url = %shown, error = %e, "Request aborted");
                    return Ok(None);
                }
            }

            if attempt < options.retries {
                let wait = backoff_delay(options.backoff_factor, attempt);
                tracing::info!(wait_secs = wait.as_secs_f64(), "Waiting before retry");
                tokio::time::sleep(wait).await;
            }
        }

        let last_error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        tracing::error!(%method, url = %shown, error = %last_error, "All retries failed for {}", shown);
        Ok(None)
    }

    /// The form of `url` that goes into logs.
    fn display_url(&self, url: &Url) -> String {
        if self.redact_paths {
            redacted(url)
        } else {
            url.to_string()
        }
    }
}

/// Origin of `url` with the path and query hidden.
fn redacted(url: &Url) -> String {
    format!("{}/<redacted>", url.origin().ascii_serialization())
}

impl<T: Transport> Drop for ResilientClient<T> {
    fn drop(&mut self) {
        tracing::debug!(base_url = %self.display_url(&self.base_url), "Closing HTTP session");
    }
}
