use std::future::Future;

use crate::config::{PaginationConfig, SelectorConfig, TargetConfig};
use crate::error::AppError;
use crate::models::{ExtractedPage, HttpRequest, HttpResponse, Record};

/// Issues a single HTTP request. Implementations enforce `request.timeout`
/// and report it as [`AppError::Timeout`].
pub trait Transport: Send + Sync + Clone {
    fn issue(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, AppError>> + Send;
}

/// Fetches raw HTML content from a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Extracts records from an HTML page using configured selectors.
pub trait Extractor: Send + Sync + Clone {
    /// `page_url` is used to resolve relative pagination links.
    fn extract(
        &self,
        html: &str,
        page_url: &str,
        selectors: &SelectorConfig,
        pagination: &PaginationConfig,
    ) -> Result<ExtractedPage, AppError>;
}

/// Persists a batch of records.
pub trait RecordSink: Send + Sync {
    /// Writes the records and returns how many rows were stored.
    fn write(&self, records: &[Record]) -> impl Future<Output = Result<usize, AppError>> + Send;
}

/// Creates the sink configured for a target.
pub trait SinkFactory: Send + Sync + Clone {
    type Sink: RecordSink;

    fn open(&self, target: &TargetConfig) -> Result<Self::Sink, AppError>;
}

/// Delivers a human-readable message to the configured channels.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// A no-op Notifier for use when no channel is configured.
#[derive(Debug, Clone, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    async fn notify(&self, _message: &str) -> Result<(), AppError> {
        Ok(())
    }
}
