use thiserror::Error;

/// Application-wide error types for Nexus.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed for a reason other than connectivity.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Upstream answered with a 5xx status.
    #[error("Server error (HTTP {status}) for {url}")]
    ServerError { status: u16, url: String },

    /// Upstream answered with a 4xx status.
    #[error("Client error (HTTP {status}) for {url}")]
    ClientError { status: u16, url: String },

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error (refused, reset, DNS).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Page disallowed by the site's robots.txt.
    #[error("Disallowed by robots.txt: {0}")]
    RobotsDisallowed(String),

    /// Invalid configuration (bad base URL, unparseable config file, ...).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Named target does not exist in the configuration.
    #[error("Target '{0}' not found in config")]
    TargetNotFound(String),

    /// CSS selector could not be parsed or applied.
    #[error("Selector error: {0}")]
    SelectorError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Writing records to a sink failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// One or more notification channels failed.
    #[error("Notification error: {0}")]
    NotificationError(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AppError {
    /// Returns true if this error should count as a circuit breaker failure.
    ///
    /// Client errors mean the endpoint answered, so they never trip the circuit.
    pub fn should_trip_circuit(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::ServerError { .. }
            | AppError::HttpError(_) => true,
            _ => false,
        }
    }
}
