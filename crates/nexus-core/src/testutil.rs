//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use crate::config::{PaginationConfig, SelectorConfig, TargetConfig};
use crate::error::AppError;
use crate::models::{ExtractedPage, HttpRequest, HttpResponse, Record};
use crate::traits::{Extractor, Fetcher, Notifier, RecordSink, SinkFactory, Transport};

/// Build a record from `(field, value)` pairs.
pub fn record(fields: &[(&str, &str)]) -> Record {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect()
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// Mock transport that replays a queue of outcomes and records every request.
#[derive(Clone)]
pub struct MockTransport {
    /// Each call pops the first element. If empty, returns `200 {}`.
    responses: Arc<Mutex<Vec<Result<HttpResponse, AppError>>>>,
    calls: Arc<Mutex<Vec<(HttpRequest, Instant)>>>,
    hang: bool,
}

impl MockTransport {
    pub fn empty() -> Self {
        Self::with_responses(Vec::new())
    }

    pub fn with_responses(responses: Vec<Result<HttpResponse, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(Mutex::new(Vec::new())),
            hang: false,
        }
    }

    /// Transport whose requests never complete.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::empty()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(r, _)| r.clone())
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

impl Transport for MockTransport {
    async fn issue(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        self.calls.lock().unwrap().push((request, Instant::now()));
        if self.hang {
            std::future::pending::<()>().await;
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(HttpResponse::new(200, "{}"))
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that serves pages by URL and records fetched URLs.
#[derive(Clone)]
pub struct MockFetcher {
    pages: Arc<Mutex<HashMap<String, String>>>,
    errors: Arc<Mutex<HashMap<String, AppError>>>,
    pub fetched: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            pages: Arc::new(Mutex::new(HashMap::new())),
            errors: Arc::new(Mutex::new(HashMap::new())),
            fetched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), html.to_string());
        self
    }

    /// The first fetch of `url` fails with `error`.
    pub fn with_error(self, url: &str, error: AppError) -> Self {
        self.errors.lock().unwrap().insert(url.to_string(), error);
        self
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.fetched.lock().unwrap().push(url.to_string());
        if let Some(e) = self.errors.lock().unwrap().remove(url) {
            return Err(e);
        }
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::ClientError {
                status: 404,
                url: url.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Mock extractor that returns one record per call, tagged with the page URL,
/// and a configurable next link per page.
#[derive(Clone)]
pub struct MockExtractor {
    next_links: Arc<Mutex<HashMap<String, String>>>,
    pub seen_pages: Arc<Mutex<Vec<String>>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            next_links: Arc::new(Mutex::new(HashMap::new())),
            seen_pages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_next(self, page_url: &str, next_url: &str) -> Self {
        self.next_links
            .lock()
            .unwrap()
            .insert(page_url.to_string(), next_url.to_string());
        self
    }
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for MockExtractor {
    fn extract(
        &self,
        html: &str,
        page_url: &str,
        _selectors: &SelectorConfig,
        _pagination: &PaginationConfig,
    ) -> Result<ExtractedPage, AppError> {
        self.seen_pages.lock().unwrap().push(page_url.to_string());
        Ok(ExtractedPage {
            records: vec![record(&[("page", page_url), ("html", html)])],
            next_url: self.next_links.lock().unwrap().get(page_url).cloned(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockSinkFactory
// ---------------------------------------------------------------------------

/// Mock sink factory; every opened sink appends to a shared list.
#[derive(Clone)]
pub struct MockSinkFactory {
    /// (target name, records) per write.
    pub writes: Arc<Mutex<Vec<(String, Vec<Record>)>>>,
    open_error: Arc<Mutex<Option<AppError>>>,
}

impl MockSinkFactory {
    pub fn new() -> Self {
        Self {
            writes: Arc::new(Mutex::new(Vec::new())),
            open_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_open_error(error: AppError) -> Self {
        Self {
            writes: Arc::new(Mutex::new(Vec::new())),
            open_error: Arc::new(Mutex::new(Some(error))),
        }
    }

    pub fn written(&self) -> Vec<(String, Vec<Record>)> {
        self.writes.lock().unwrap().clone()
    }
}

impl Default for MockSinkFactory {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MockSink {
    target: String,
    writes: Arc<Mutex<Vec<(String, Vec<Record>)>>>,
}

impl RecordSink for MockSink {
    async fn write(&self, records: &[Record]) -> Result<usize, AppError> {
        self.writes
            .lock()
            .unwrap()
            .push((self.target.clone(), records.to_vec()));
        Ok(records.len())
    }
}

impl SinkFactory for MockSinkFactory {
    type Sink = MockSink;

    fn open(&self, target: &TargetConfig) -> Result<MockSink, AppError> {
        if let Some(e) = self.open_error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(MockSink {
            target: target.name.clone(),
            writes: Arc::clone(&self.writes),
        })
    }
}

// ---------------------------------------------------------------------------
// MockNotifier
// ---------------------------------------------------------------------------

/// Mock notifier that records messages, optionally failing every send.
#[derive(Clone, Default)]
pub struct MockNotifier {
    pub messages: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for MockNotifier {
    async fn notify(&self, message: &str) -> Result<(), AppError> {
        self.messages.lock().unwrap().push(message.to_string());
        if self.fail {
            return Err(AppError::NotificationError("mock channel down".into()));
        }
        Ok(())
    }
}
