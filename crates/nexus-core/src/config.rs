//! Hub configuration, loaded from a JSON file.
//!
//! ```json
//! {
//!   "targets": [{
//!     "name": "books",
//!     "mode": "static",
//!     "base_url": "https://books.toscrape.com",
//!     "start_paths": ["/"],
//!     "selectors": {
//!       "item": "article.product_pod",
//!       "fields": { "title": "h3 a::attr(title)", "price": ".price_color::text" }
//!     },
//!     "storage": { "type": "csv", "path": "data/books.csv" }
//!   }],
//!   "rate_limit": { "delay_seconds": 1.0, "jitter": true },
//!   "daemon_interval": 3600
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::AppError;
use crate::resilient::RequestOptions;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; HEX/1.0)";

/// Top-level configuration for the automation hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub targets: Vec<TargetConfig>,
    /// One is picked at random per session.
    pub user_agents: Vec<String>,
    pub rate_limit: RateLimitConfig,
    /// Seconds between two daemon passes over all targets.
    #[serde(rename = "daemon_interval")]
    pub daemon_interval_secs: u64,
    pub http: HttpConfig,
    pub notifications: NotificationConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            user_agents: vec![DEFAULT_USER_AGENT.to_string()],
            rate_limit: RateLimitConfig::default(),
            daemon_interval_secs: 3600,
            http: HttpConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl HubConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a config document.
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let config: HubConfig = serde_json::from_str(raw)
            .map_err(|e| AppError::ConfigError(format!("Invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.name.as_str()) {
                return Err(AppError::ConfigError(format!(
                    "Duplicate target name '{}'",
                    target.name
                )));
            }
            target.validate()?;
        }

        if self.http.timeout_secs == 0 {
            return Err(AppError::ConfigError(
                "http.timeout_secs must be at least 1".into(),
            ));
        }
        if self.http.failure_threshold == 0 {
            return Err(AppError::ConfigError(
                "http.failure_threshold must be at least 1".into(),
            ));
        }
        if !(self.http.backoff_factor.is_finite() && self.http.backoff_factor >= 0.0) {
            return Err(AppError::ConfigError(
                "http.backoff_factor must be a non-negative number".into(),
            ));
        }
        if !(self.rate_limit.delay_seconds.is_finite() && self.rate_limit.delay_seconds >= 0.0) {
            return Err(AppError::ConfigError(
                "rate_limit.delay_seconds must be a non-negative number".into(),
            ));
        }

        Ok(())
    }

    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn daemon_interval(&self) -> Duration {
        Duration::from_secs(self.daemon_interval_secs)
    }

    /// User agent for a new session, chosen at random from the configured list.
    pub fn pick_user_agent(&self) -> &str {
        if self.user_agents.is_empty() {
            return DEFAULT_USER_AGENT;
        }
        &self.user_agents[fastrand::usize(..self.user_agents.len())]
    }
}

/// How a target is collected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    /// HTML pages scraped with CSS selectors.
    #[default]
    Static,
    /// JSON API fetched through the resilient client.
    Api,
    /// Any other mode (e.g. browser-driven); skipped.
    #[serde(other)]
    Unsupported,
}

/// One scraping or API target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    #[serde(default)]
    pub mode: TargetMode,
    pub base_url: String,
    #[serde(default = "default_start_paths")]
    pub start_paths: Vec<String>,
    #[serde(default)]
    pub selectors: SelectorConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Send a summary through the configured notification channels.
    #[serde(default)]
    pub notify: bool,
}

fn default_start_paths() -> Vec<String> {
    vec!["/".to_string()]
}

impl TargetConfig {
    fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::ConfigError("Target name must not be empty".into()));
        }
        Url::parse(&self.base_url).map_err(|e| {
            AppError::ConfigError(format!(
                "Target '{}' has invalid base_url '{}': {e}",
                self.name, self.base_url
            ))
        })?;
        if self.mode == TargetMode::Static && self.selectors.item.trim().is_empty() {
            return Err(AppError::ConfigError(format!(
                "Target '{}' needs selectors.item in static mode",
                self.name
            )));
        }
        if self.pagination.max_pages == 0 {
            return Err(AppError::ConfigError(format!(
                "Target '{}': pagination.max_pages must be at least 1",
                self.name
            )));
        }
        Ok(())
    }
}

/// CSS selectors for static targets.
///
/// Field selectors accept a `::text` or `::attr(name)` suffix; a bare
/// selector extracts text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub item: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Selector for the "next page" link (its `href` is followed).
    pub next_selector: Option<String>,
    /// URL template with a `{page}` placeholder, used when no link is found.
    pub next_url_template: Option<String>,
    /// Pages visited per start path, the start page included.
    pub max_pages: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            next_selector: None,
            next_url_template: None,
            max_pages: 1,
        }
    }
}

/// Record shaping for API targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// JSON pointer to the array of records inside the response (e.g. `/data`).
    pub records_pointer: Option<String>,
    /// Output field → JSON pointer into each source record. Empty keeps records as-is.
    pub fields: BTreeMap<String, String>,
    /// Truncate projected string values to this many characters.
    pub max_field_len: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Csv,
    #[default]
    Jsonl,
    Sqlite,
}

impl StorageKind {
    pub fn extension(&self) -> &'static str {
        match self {
            StorageKind::Csv => "csv",
            StorageKind::Jsonl => "jsonl",
            StorageKind::Sqlite => "db",
        }
    }
}

impl std::str::FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(StorageKind::Csv),
            "jsonl" => Ok(StorageKind::Jsonl),
            "sqlite" => Ok(StorageKind::Sqlite),
            _ => Err(format!("Unknown storage type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub kind: StorageKind,
    pub path: Option<PathBuf>,
    /// SQLite only: rows whose value for this field already exists are skipped.
    pub unique_key: Option<String>,
}

impl StorageConfig {
    /// Configured path, or `output_<target>.<ext>` in the working directory.
    pub fn resolved_path(&self, target_name: &str) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            PathBuf::from(format!("output_{target_name}.{}", self.kind.extension()))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum delay between two page requests to the same host.
    pub delay_seconds: f64,
    /// Add up to one extra second of random delay.
    pub jitter: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            delay_seconds: 1.0,
            jitter: false,
        }
    }
}

impl RateLimitConfig {
    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay_seconds).unwrap_or_default()
    }

    pub fn jitter(&self) -> Duration {
        if self.jitter {
            Duration::from_secs(1)
        } else {
            Duration::ZERO
        }
    }
}

/// Settings for the resilient HTTP path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub retries: u32,
    pub backoff_factor: f64,
    pub failure_threshold: u32,
    pub open_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retries: 3,
            backoff_factor: 1.0,
            failure_threshold: 5,
            open_timeout_secs: 60,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            open_timeout: Duration::from_secs(self.open_timeout_secs),
        }
    }

    pub fn request_options(&self) -> RequestOptions {
        RequestOptions::default()
            .with_retries(self.retries)
            .with_backoff_factor(self.backoff_factor)
            .with_timeout(self.timeout())
    }
}

const DEFAULT_SMTP_PORT: u16 = 587;

/// Credentials and webhook URLs for notification channels.
///
/// Any field left out of the file is filled from the environment by
/// [`merge_env`](Self::merge_env).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub slack_webhook_url: Option<String>,
    pub discord_webhook_url: Option<String>,
    /// SMTP relay; STARTTLS is always used.
    pub email_host: Option<String>,
    /// Defaults to 587 when unset.
    pub email_port: Option<u16>,
    /// SMTP login, also used as the sender address.
    pub email_user: Option<String>,
    pub email_password: Option<String>,
    pub email_to: Option<String>,
}

impl NotificationConfig {
    /// Fill missing fields from `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`,
    /// `SLACK_WEBHOOK_URL`, `DISCORD_WEBHOOK_URL` and the `EMAIL_*` variables
    /// (`EMAIL_HOST`, `EMAIL_PORT`, `EMAIL_USER`, `EMAIL_PASSWORD`, `EMAIL_TO`).
    pub fn merge_env(self) -> Self {
        self.merge_with(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    pub fn merge_with(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            telegram_bot_token: self
                .telegram_bot_token
                .or_else(|| lookup("TELEGRAM_BOT_TOKEN")),
            telegram_chat_id: self.telegram_chat_id.or_else(|| lookup("TELEGRAM_CHAT_ID")),
            slack_webhook_url: self
                .slack_webhook_url
                .or_else(|| lookup("SLACK_WEBHOOK_URL")),
            discord_webhook_url: self
                .discord_webhook_url
                .or_else(|| lookup("DISCORD_WEBHOOK_URL")),
            email_host: self.email_host.or_else(|| lookup("EMAIL_HOST")),
            email_port: self
                .email_port
                .or_else(|| lookup("EMAIL_PORT").and_then(|v| v.trim().parse().ok())),
            email_user: self.email_user.or_else(|| lookup("EMAIL_USER")),
            email_password: self.email_password.or_else(|| lookup("EMAIL_PASSWORD")),
            email_to: self.email_to.or_else(|| lookup("EMAIL_TO")),
        }
    }

    pub fn smtp_port(&self) -> u16 {
        self.email_port.unwrap_or(DEFAULT_SMTP_PORT)
    }

    /// True when every setting the email channel needs is present.
    pub fn has_email(&self) -> bool {
        self.email_host.is_some()
            && self.email_user.is_some()
            && self.email_password.is_some()
            && self.email_to.is_some()
    }

    pub fn has_channels(&self) -> bool {
        (self.telegram_bot_token.is_some() && self.telegram_chat_id.is_some())
            || self.slack_webhook_url.is_some()
            || self.discord_webhook_url.is_some()
            || self.has_email()
    }
}
