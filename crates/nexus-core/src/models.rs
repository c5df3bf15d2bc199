use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A single extracted row: field name → value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// HTTP verbs issued by the resilient client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved request handed to a [`Transport`](crate::traits::Transport).
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// JSON body, sent with `Content-Type: application/json`.
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

/// Raw response returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON, keeping the raw text when it is not JSON.
    pub fn decode(&self) -> ResponseBody {
        match serde_json::from_slice(&self.body) {
            Ok(value) => ResponseBody::Json(value),
            Err(e) => {
                let text = self.text();
                tracing::warn!(error = %e, body = %text, "Failed to parse JSON response");
                ResponseBody::Raw(text)
            }
        }
    }
}

/// Decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// The body was valid JSON.
    Json(serde_json::Value),
    /// The body was not JSON; the raw text is kept as-is.
    Raw(String),
}

impl ResponseBody {
    pub fn is_json(&self) -> bool {
        matches!(self, ResponseBody::Json(_))
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(v) => Some(v),
            ResponseBody::Raw(_) => None,
        }
    }

    /// Collapses the body into a JSON value; raw text becomes `{"content": text}`.
    pub fn into_value(self) -> serde_json::Value {
        match self {
            ResponseBody::Json(v) => v,
            ResponseBody::Raw(text) => serde_json::json!({ "content": text }),
        }
    }
}

/// Records found on one page, plus the link to the next page if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    pub records: Vec<Record>,
    pub next_url: Option<String>,
}

/// Outcome of running one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub name: String,
    pub records: usize,
    pub written: usize,
    pub pages: usize,
    pub skipped: bool,
}

impl TargetReport {
    pub fn skipped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: 0,
            written: 0,
            pages: 0,
            skipped: true,
        }
    }
}
