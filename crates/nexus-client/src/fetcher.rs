use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nexus_core::error::AppError;
use nexus_core::traits::Fetcher;
use reqwest::Client;
use robotstxt::DefaultMatcher;
use tokio::sync::Mutex;
use url::Url;

use crate::transport::{DEFAULT_USER_AGENT, classify_error};

const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP fetcher using reqwest.
///
/// Downloads raw HTML with a configurable User-Agent and timeout. Before each
/// page the origin's `robots.txt` is consulted (fetched once per origin and
/// cached); an unreachable `robots.txt` allows everything.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    user_agent: String,
    timeout_secs: u64,
    respect_robots: bool,
    robots: Arc<Mutex<HashMap<String, Option<String>>>>,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_options(DEFAULT_USER_AGENT, Duration::from_secs(30))
    }

    pub fn with_options(user_agent: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
            timeout_secs: timeout.as_secs(),
            respect_robots: true,
            robots: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Skip the `robots.txt` check entirely.
    pub fn ignore_robots(mut self) -> Self {
        self.respect_robots = false;
        self
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    async fn check_robots(&self, url: &Url) -> Result<(), AppError> {
        let origin = url.origin().ascii_serialization();

        // Never hold the lock across the robots.txt download.
        let cached = self.robots.lock().await.get(&origin).cloned();
        let body = match cached {
            Some(body) => body,
            None => {
                let body = self.fetch_robots(&origin).await;
                self.robots
                    .lock()
                    .await
                    .entry(origin)
                    .or_insert(body)
                    .clone()
            }
        };

        let Some(body) = body else {
            return Ok(());
        };
        let mut matcher = DefaultMatcher::default();
        if matcher.one_agent_allowed_by_robots(&body, &self.user_agent, url.as_str()) {
            Ok(())
        } else {
            tracing::warn!(%url, "Path disallowed by robots.txt");
            Err(AppError::RobotsDisallowed(url.to_string()))
        }
    }

    async fn fetch_robots(&self, origin: &str) -> Option<String> {
        let robots_url = format!("{origin}/robots.txt");
        let result = self
            .client
            .get(&robots_url)
            .timeout(ROBOTS_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => response.text().await.ok(),
            Ok(response) => {
                tracing::debug!(%robots_url, status = response.status().as_u16(), "No robots.txt");
                None
            }
            Err(e) => {
                tracing::warn!(%robots_url, error = %e, "Could not check robots.txt");
                None
            }
        }
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let parsed = Url::parse(url).map_err(|e| AppError::HttpError(format!("Invalid URL: {e}")))?;

        if self.respect_robots {
            self.check_robots(&parsed).await?;
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| classify_error(e, self.timeout_secs))?;

        let status = response.status().as_u16();
        if status >= 500 {
            return Err(AppError::ServerError {
                status,
                url: url.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(AppError::ClientError {
                status,
                url: url.to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const ROBOTS: &str = "User-agent: *\nDisallow: /private/\n";

    async fn page(server: &MockServer, route: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    async fn robots(server: &MockServer, expected_hits: u64) {
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ROBOTS))
            .expect(expected_hits)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn fetches_allowed_page() {
        let server = MockServer::start().await;
        robots(&server, 1).await;
        page(&server, "/books.html", 200, "<html>books</html>").await;
        let fetcher = ReqwestFetcher::new().unwrap();

        let html = fetcher
            .fetch(&format!("{}/books.html", server.uri()))
            .await
            .unwrap();

        assert_eq!(html, "<html>books</html>");
    }

    #[tokio::test]
    async fn disallowed_page_is_never_requested() {
        let server = MockServer::start().await;
        robots(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/private/a.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
            .expect(0)
            .mount(&server)
            .await;
        let fetcher = ReqwestFetcher::new().unwrap();

        let err = fetcher
            .fetch(&format!("{}/private/a.html", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RobotsDisallowed(_)));
    }

    #[tokio::test]
    async fn robots_fetched_once_per_origin() {
        let server = MockServer::start().await;
        robots(&server, 1).await;
        page(&server, "/a.html", 200, "a").await;
        page(&server, "/b.html", 200, "b").await;
        let fetcher = ReqwestFetcher::new().unwrap();

        fetcher.fetch(&format!("{}/a.html", server.uri())).await.unwrap();
        fetcher.fetch(&format!("{}/b.html", server.uri())).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let robots_hits = requests
            .iter()
            .filter(|r| r.url.path() == "/robots.txt")
            .count();
        assert_eq!(robots_hits, 1);
    }

    #[tokio::test]
    async fn missing_robots_allows_everything() {
        let server = MockServer::start().await;
        page(&server, "/private/a.html", 200, "ok").await;
        let fetcher = ReqwestFetcher::new().unwrap();

        let html = fetcher
            .fetch(&format!("{}/private/a.html", server.uri()))
            .await
            .unwrap();

        assert_eq!(html, "ok");
    }

    #[tokio::test]
    async fn ignore_robots_skips_check() {
        let server = MockServer::start().await;
        robots(&server, 0).await;
        page(&server, "/private/a.html", 200, "secret").await;
        let fetcher = ReqwestFetcher::new().unwrap().ignore_robots();

        let html = fetcher
            .fetch(&format!("{}/private/a.html", server.uri()))
            .await
            .unwrap();

        assert_eq!(html, "secret");
    }

    #[tokio::test]
    async fn slow_robots_does_not_block_other_origins() {
        let slow = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(ROBOTS)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&slow)
            .await;
        page(&slow, "/a.html", 200, "slow").await;
        let fast = MockServer::start().await;
        robots(&fast, 1).await;
        page(&fast, "/b.html", 200, "fast").await;
        let fetcher = ReqwestFetcher::new().unwrap();

        let slow_url = format!("{}/a.html", slow.uri());
        let fast_url = format!("{}/b.html", fast.uri());
        let (slow_html, (fast_html, fast_elapsed)) = tokio::join!(fetcher.fetch(&slow_url), async {
            // Let the slow origin take the cache first.
            tokio::task::yield_now().await;
            let started = Instant::now();
            let html = fetcher.fetch(&fast_url).await;
            (html, started.elapsed())
        });

        assert_eq!(slow_html.unwrap(), "slow");
        assert_eq!(fast_html.unwrap(), "fast");
        assert!(
            fast_elapsed < Duration::from_secs(1),
            "fast origin waited {fast_elapsed:?} behind the slow robots.txt"
        );
    }

    #[tokio::test]
    async fn http_errors_are_classified() {
        let server = MockServer::start().await;
        page(&server, "/down", 502, "bad gateway").await;
        let fetcher = ReqwestFetcher::new().unwrap().ignore_robots();

        let server_err = fetcher
            .fetch(&format!("{}/down", server.uri()))
            .await
            .unwrap_err();
        let client_err = fetcher
            .fetch(&format!("{}/gone", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(server_err, AppError::ServerError { status: 502, .. }));
        assert!(matches!(client_err, AppError::ClientError { status: 404, .. }));
    }
}
