pub mod api;
pub mod automation;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod models;
pub mod resilient;
pub mod scrape;
pub mod throttle;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::AppError;
pub use models::{HttpMethod, HttpRequest, HttpResponse, Record, ResponseBody};
pub use resilient::{RequestOptions, ResilientClient};
pub use traits::{Extractor, Fetcher, Notifier, RecordSink, SinkFactory, Transport};
