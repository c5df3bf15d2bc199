use nexus_core::error::AppError;
use nexus_core::models::{HttpMethod, HttpRequest, HttpResponse};
use nexus_core::traits::Transport;
use reqwest::{Client, Method};

pub(crate) const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; HEX/1.0)";

/// [`Transport`] backed by a pooled reqwest client.
///
/// Cloning shares the connection pool. Timeouts are applied per request from
/// [`HttpRequest::timeout`].
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, AppError> {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(user_agent: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        Ok(Self { client })
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Map a reqwest failure onto the transport error taxonomy.
pub(crate) fn classify_error(e: reqwest::Error, timeout_secs: u64) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(timeout_secs)
    } else if e.is_connect() {
        AppError::NetworkError(format!("Connection failed: {e}"))
    } else {
        AppError::HttpError(e.to_string())
    }
}

impl Transport for ReqwestTransport {
    async fn issue(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        let timeout_secs = request.timeout.as_secs();
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_error(e, timeout_secs))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify_error(e, timeout_secs))?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn request(method: HttpMethod, url: String) -> HttpRequest {
        HttpRequest {
            method,
            url,
            headers: BTreeMap::new(),
            body: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"id": 1}]"#))
            .expect(1)
            .mount(&server)
            .await;
        let transport = ReqwestTransport::new().unwrap();

        let response = transport
            .issue(request(HttpMethod::Get, format!("{}/posts", server.uri())))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.text(), r#"[{"id": 1}]"#);
    }

    #[tokio::test]
    async fn error_statuses_are_responses_not_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/boom"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;
        let transport = ReqwestTransport::new().unwrap();

        let boom = transport
            .issue(request(HttpMethod::Get, format!("{}/boom", server.uri())))
            .await
            .unwrap();
        // Unmatched routes get wiremock's default 404.
        let missing = transport
            .issue(request(HttpMethod::Delete, format!("{}/missing", server.uri())))
            .await
            .unwrap();

        assert_eq!(boom.status, 503);
        assert_eq!(boom.text(), "unavailable");
        assert_eq!(missing.status, 404);
    }

    #[tokio::test]
    async fn sends_method_headers_and_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/items"))
            .and(header("x-trace", "abc"))
            .and(header("user-agent", "nexus-test/1.0"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"name": "widget"})))
            .respond_with(ResponseTemplate::new(201).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;
        let transport = ReqwestTransport::with_user_agent("nexus-test/1.0").unwrap();
        let mut req = request(HttpMethod::Put, format!("{}/items", server.uri()));
        req.headers.insert("X-Trace".into(), "abc".into());
        req.body = Some(json!({"name": "widget"}));

        let response = transport.issue(req).await.unwrap();

        assert_eq!(response.status, 201);
    }

    #[tokio::test]
    async fn slow_response_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        let transport = ReqwestTransport::new().unwrap();
        let mut req = request(HttpMethod::Get, format!("{}/slow", server.uri()));
        req.timeout = Duration::from_millis(200);

        let err = transport.issue(req).await.unwrap_err();

        assert!(matches!(err, AppError::Timeout(_)));
        assert!(err.should_trip_circuit());
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = ReqwestTransport::new().unwrap();
        let err = transport
            .issue(request(HttpMethod::Get, format!("http://{addr}/")))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NetworkError(_)));
        assert!(err.should_trip_circuit());
    }
}
