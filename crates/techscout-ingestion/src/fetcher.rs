//! Rate-limited HTTP fetcher.
//!
//! Enforces, per pipeline run:
//! - a cap on total in-flight requests
//! - a tighter cap on in-flight requests per host
//! - a minimum spacing between two requests to the same domain
//! - a per-request timeout
//!
//! Non-200 responses and transport errors come back as `Err`, never panics.
//! The per-domain clock lives inside the instance: build one fetcher per run
//! and do not share it between runs for different entities.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, ClientBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;

use techscout_common::{Result, ScoutError};

const USER_AGENT: &str = concat!("TechScout/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_connections_per_host")]
    pub max_connections_per_host: usize,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_max_connections()          -> usize  { 10 }
fn default_max_connections_per_host() -> usize  { 2 }
fn default_min_interval_ms()          -> u64    { 1000 }
fn default_timeout_secs()             -> u64    { 30 }
fn default_user_agent()               -> String { USER_AGENT.to_string() }

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_connections_per_host: default_max_connections_per_host(),
            min_interval_ms: default_min_interval_ms(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// HTTP client with bounded concurrency and per-domain request spacing.
#[derive(Debug)]
pub struct RateLimitedFetcher {
    client: Client,
    total: Semaphore,
    per_host_limit: usize,
    per_host: Mutex<HashMap<String, Arc<Semaphore>>>,
    /// Domain -> time slot reserved by the most recent request.
    last_request: Mutex<HashMap<String, Instant>>,
    min_interval: Duration,
}

impl RateLimitedFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        if config.max_connections == 0 || config.max_connections_per_host == 0 {
            return Err(ScoutError::Config(
                "fetcher connection caps must be at least 1".to_string(),
            ));
        }

        let per_host_limit = config.max_connections_per_host.min(config.max_connections);

        let client = ClientBuilder::new()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(per_host_limit)
            .build()?;

        Ok(Self {
            client,
            total: Semaphore::new(config.max_connections),
            per_host_limit,
            per_host: Mutex::new(HashMap::new()),
            last_request: Mutex::new(HashMap::new()),
            min_interval: Duration::from_millis(config.min_interval_ms),
        })
    }

    /// GET `url` and return the body as text.
    #[instrument(skip(self))]
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        self.get(url).await
    }

    /// GET `url` and parse the body as JSON.
    #[instrument(skip(self))]
    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        let body = self.get(url).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get(&self, url: &str) -> Result<String> {
        let domain = domain_of(url)?;
        self.wait_for_slot(&domain).await;

        let host = self.host_semaphore(&domain).await;
        let _host_permit = host
            .acquire()
            .await
            .map_err(|e| ScoutError::Pipeline(format!("host limiter closed: {e}")))?;
        let _permit = self
            .total
            .acquire()
            .await
            .map_err(|e| ScoutError::Pipeline(format!("connection limiter closed: {e}")))?;

        let resp = self.client.get(url).send().await.map_err(|e| {
            warn!(url, error = %e, "request failed");
            ScoutError::Http(e)
        })?;

        let status = resp.status();
        if status != StatusCode::OK {
            warn!(url, status = status.as_u16(), "non-200 response");
            return Err(ScoutError::HttpStatus { status: status.as_u16(), url: url.to_string() });
        }

        Ok(resp.text().await?)
    }

    /// Reserve the next free slot for `domain` and sleep until it arrives.
    /// The slot is claimed under the lock, so concurrent callers queue up
    /// one interval apart instead of racing on the same timestamp.
    async fn wait_for_slot(&self, domain: &str) {
        if self.min_interval.is_zero() {
            return;
        }

        let wait = {
            let mut last = self.last_request.lock().await;
            let now = Instant::now();
            let slot = match last.get(domain) {
                Some(prev) => (*prev + self.min_interval).max(now),
                None => now,
            };
            last.insert(domain.to_string(), slot);
            slot - now
        };

        if !wait.is_zero() {
            debug!(domain, wait_ms = wait.as_millis() as u64, "rate limit wait");
            tokio::time::sleep(wait).await;
        }
    }

    async fn host_semaphore(&self, domain: &str) -> Arc<Semaphore> {
        let mut map = self.per_host.lock().await;
        map.entry(domain.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_host_limit)))
            .clone()
    }
}

/// Host plus explicit port, e.g. `api.crossref.org` or `127.0.0.1:8080`.
pub fn domain_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| ScoutError::InvalidUrl(format!("{url}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| ScoutError::InvalidUrl(format!("{url}: no host")))?;
    Ok(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config(min_interval_ms: u64) -> FetcherConfig {
        FetcherConfig { min_interval_ms, timeout_secs: 5, ..Default::default() }
    }

    #[test]
    fn test_default_config() {
        let cfg = FetcherConfig::default();
        assert_eq!(cfg.max_connections, 10);
        assert_eq!(cfg.max_connections_per_host, 2);
        assert!(cfg.max_connections_per_host < cfg.max_connections);
        assert_eq!(cfg.min_interval_ms, 1000);
        assert_eq!(cfg.timeout_secs, 30);
    }

    #[test]
    fn test_zero_caps_rejected() {
        let cfg = FetcherConfig { max_connections_per_host: 0, ..Default::default() };
        assert!(matches!(RateLimitedFetcher::new(&cfg), Err(ScoutError::Config(_))));
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("https://api.crossref.org/works?q=x").unwrap(), "api.crossref.org");
        assert_eq!(domain_of("http://127.0.0.1:8080/a").unwrap(), "127.0.0.1:8080");
        assert!(matches!(domain_of("not a url"), Err(ScoutError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_fetch_text_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let fetcher = RateLimitedFetcher::new(&fast_config(0)).unwrap();
        let body = fetcher.fetch_text(&format!("{}/page", server.uri())).await.unwrap();
        assert_eq!(body, "hello");
    }

    #[tokio::test]
    async fn test_fetch_json_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"n": 3})))
            .mount(&server)
            .await;

        let fetcher = RateLimitedFetcher::new(&fast_config(0)).unwrap();
        let v = fetcher.fetch_json(&format!("{}/data", server.uri())).await.unwrap();
        assert_eq!(v["n"], 3);
    }

    #[tokio::test]
    async fn test_non_200_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = RateLimitedFetcher::new(&fast_config(0)).unwrap();
        let err = fetcher.fetch_text(&format!("{}/x", server.uri())).await.unwrap_err();
        assert!(matches!(err, ScoutError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_transport_error_is_failure() {
        let fetcher = RateLimitedFetcher::new(&fast_config(0)).unwrap();
        // Port 9 (discard) is not listening on loopback in test environments.
        let err = fetcher.fetch_text("http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(err, ScoutError::Http(_)));
    }

    #[tokio::test]
    async fn test_invalid_json_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let fetcher = RateLimitedFetcher::new(&fast_config(0)).unwrap();
        let err = fetcher.fetch_json(&server.uri()).await.unwrap_err();
        assert!(matches!(err, ScoutError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_same_domain_requests_are_spaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let interval = 150;
        let fetcher = RateLimitedFetcher::new(&fast_config(interval)).unwrap();
        let url = format!("{}/r", server.uri());

        let n = 4;
        let t0 = std::time::Instant::now();
        for _ in 0..n {
            fetcher.fetch_text(&url).await.unwrap();
        }
        let elapsed = t0.elapsed();
        assert!(
            elapsed >= Duration::from_millis((n - 1) * interval),
            "elapsed {elapsed:?} shorter than {} intervals",
            n - 1
        );
    }

    #[tokio::test]
    async fn test_concurrent_same_domain_requests_are_spaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let fetcher = RateLimitedFetcher::new(&fast_config(100)).unwrap();
        let url = format!("{}/r", server.uri());

        let t0 = std::time::Instant::now();
        let (a, b, c) = tokio::join!(
            fetcher.fetch_text(&url),
            fetcher.fetch_text(&url),
            fetcher.fetch_text(&url),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert!(t0.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_distinct_domains_do_not_wait_on_each_other() {
        let first = MockServer::start().await;
        let second = MockServer::start().await;
        for server in [&first, &second] {
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
                .mount(server)
                .await;
        }

        let fetcher = RateLimitedFetcher::new(&fast_config(2_000)).unwrap();
        let (first_url, second_url) = (first.uri(), second.uri());
        let t0 = std::time::Instant::now();
        let (a, b) = tokio::join!(
            fetcher.fetch_text(&first_url),
            fetcher.fetch_text(&second_url),
        );
        assert!(a.is_ok() && b.is_ok());
        assert!(t0.elapsed() < Duration::from_millis(1_500));
    }

    async fn slow_server(delay_ms: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("ok")
                    .set_delay(Duration::from_millis(delay_ms)),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_per_host_cap_limits_in_flight_requests() {
        let server = slow_server(300).await;
        // Default per-host cap is 2: four requests need two rounds.
        let fetcher = RateLimitedFetcher::new(&fast_config(0)).unwrap();
        let url = format!("{}/slow", server.uri());

        let t0 = std::time::Instant::now();
        let results = futures_util::future::join_all((0..4).map(|_| fetcher.fetch_text(&url))).await;
        let elapsed = t0.elapsed();

        assert!(results.iter().all(|r| r.is_ok()));
        assert!(elapsed >= Duration::from_millis(600), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_total_cap_limits_requests_across_hosts() {
        let mut servers = Vec::new();
        for _ in 0..4 {
            servers.push(slow_server(300).await);
        }
        let urls: Vec<String> = servers.iter().map(|s| format!("{}/slow", s.uri())).collect();

        let config = FetcherConfig { max_connections: 2, ..fast_config(0) };
        let fetcher = RateLimitedFetcher::new(&config).unwrap();

        let t0 = std::time::Instant::now();
        let results = futures_util::future::join_all(urls.iter().map(|u| fetcher.fetch_text(u))).await;
        let elapsed = t0.elapsed();

        assert!(results.iter().all(|r| r.is_ok()));
        assert!(elapsed >= Duration::from_millis(600), "elapsed {elapsed:?}");
    }
}
