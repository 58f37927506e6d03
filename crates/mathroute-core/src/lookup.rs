//! External computational-answer lookup.
//!
//! The router calls this only when the knowledge base has nothing above the
//! threshold. Lookups never fail past this boundary: every outcome, including
//! a missing credential or a dead network, is a [`LookupResult`].

use crate::config::{LOOKUP_TIMEOUT, WOLFRAM_RESULT_URL};
use crate::error::LookupError;
use crate::types::{LookupOrigin, LookupResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Short-answer lookup service.
#[async_trait]
pub trait LookupClient: Send + Sync {
    async fn lookup(&self, query: &str) -> LookupResult;
}

/// WolframAlpha Short Answers client.
///
/// One GET per lookup with parameters `i` (the query) and `appid`, bounded by
/// [`LOOKUP_TIMEOUT`].
pub struct WolframClient {
    http: reqwest::Client,
    app_id: String,
    endpoint: String,
}

impl WolframClient {
    /// Creates a client. An empty `app_id` disables the lookup: every call
    /// returns a `no_api_key` result without touching the network.
    ///
    /// # Errors
    ///
    /// `LookupError::ClientBuild` if the HTTP client cannot be initialised.
    pub fn new(app_id: impl Into<String>) -> Result<Self, LookupError> {
        Self::with_endpoint(app_id, WOLFRAM_RESULT_URL)
    }

    /// Creates a client against a different endpoint (e.g. a local stub).
    pub fn with_endpoint(
        app_id: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, LookupError> {
        Self::with_timeout(app_id, endpoint, LOOKUP_TIMEOUT)
    }

    /// Creates a client whose requests are abandoned after `timeout`.
    pub fn with_timeout(
        app_id: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::ClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            app_id: app_id.into(),
            endpoint: endpoint.into(),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.app_id.is_empty()
    }
}

#[async_trait]
impl LookupClient for WolframClient {
    #[instrument(skip_all)]
    async fn lookup(&self, query: &str) -> LookupResult {
        if !self.is_configured() {
            debug!("No lookup credential configured, skipping");
            return LookupResult::no_api_key();
        }

        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("i", query), ("appid", self.app_id.as_str())])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!("Lookup request failed: {}", e);
                return LookupResult::transport_error(e.to_string());
            }
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => result_from_status(status, body),
            Err(e) => {
                warn!("Lookup response could not be read: {}", e);
                LookupResult::transport_error(e.to_string())
            }
        }
    }
}

/// Maps an HTTP exchange onto a lookup result. Only 200 counts as an answer.
fn result_from_status(status: u16, body: String) -> LookupResult {
    if status == 200 {
        LookupResult {
            content: body,
            succeeded: true,
            origin: LookupOrigin::WolframAlphaHttp,
        }
    } else {
        debug!("Lookup returned status {}", status);
        LookupResult {
            content: format!("No answer (status {})", status),
            succeeded: false,
            origin: LookupOrigin::WolframAlphaHttp,
        }
    }
}

/// Delay before retry `attempt` (1-based): 100, 200, 400, then 800 ms.
pub fn backoff_delay(attempt: u32) -> Duration {
    let ms = match attempt {
        0 | 1 => 100,
        2 => 200,
        3 => 400,
        _ => 800,
    };
    Duration::from_millis(ms)
}

/// Retries transport failures of an inner client.
///
/// Only results with origin `error` are retried; a service answer of any
/// status and a missing credential are returned as-is. With `retries == 0`
/// this is a pass-through.
pub struct RetryingLookup<L> {
    inner: L,
    retries: u32,
}

impl<L: LookupClient> RetryingLookup<L> {
    pub fn new(inner: L, retries: u32) -> Self {
        Self { inner, retries }
    }
}

#[async_trait]
impl<L: LookupClient> LookupClient for RetryingLookup<L> {
    async fn lookup(&self, query: &str) -> LookupResult {
        let mut result = self.inner.lookup(query).await;
        let mut attempt = 0;
        while result.origin == LookupOrigin::Error && attempt < self.retries {
            attempt += 1;
            let delay = backoff_delay(attempt);
            debug!("Retrying lookup (attempt {}) after {:?}", attempt, delay);
            tokio::time::sleep(delay).await;
            result = self.inner.lookup(query).await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{serve_once, unused_local_url, ScriptedLookup};

    #[test]
    fn test_status_200_is_success() {
        let result = result_from_status(200, "x = 2".to_string());
        assert!(result.succeeded);
        assert_eq!(result.content, "x = 2");
        assert_eq!(result.origin, LookupOrigin::WolframAlphaHttp);
    }

    #[test]
    fn test_other_status_is_diagnostic() {
        let result = result_from_status(501, "Wolfram|Alpha did not understand".to_string());
        assert!(!result.succeeded);
        assert_eq!(result.content, "No answer (status 501)");
        assert_eq!(result.origin, LookupOrigin::WolframAlphaHttp);
    }

    #[tokio::test]
    async fn test_no_app_id_skips_network() {
        // The endpoint is unreachable; a request would produce origin `error`
        let client = WolframClient::with_endpoint("", unused_local_url().await).unwrap();
        let result = client.lookup("integrate x^2").await;
        assert_eq!(result, LookupResult::no_api_key());
    }

    #[tokio::test]
    async fn test_live_exchange_sends_query_and_app_id() {
        let (url, request) = serve_once(200, "2x").await;
        let client = WolframClient::with_endpoint("TEST-ID", url).unwrap();

        let result = client.lookup("derivative of x^2").await;
        assert!(result.succeeded);
        assert_eq!(result.content, "2x");

        let request_line = request.await.unwrap();
        assert!(request_line.contains("appid=TEST-ID"));
        assert!(request_line.contains("i=derivative"));
    }

    #[tokio::test]
    async fn test_live_non_200() {
        let (url, _request) = serve_once(501, "no short answer").await;
        let client = WolframClient::with_endpoint("TEST-ID", url).unwrap();

        let result = client.lookup("prove the Riemann hypothesis").await;
        assert!(!result.succeeded);
        assert_eq!(result.content, "No answer (status 501)");
    }

    #[tokio::test]
    async fn test_transport_error() {
        let client = WolframClient::with_endpoint("TEST-ID", unused_local_url().await).unwrap();
        let result = client.lookup("1+1").await;
        assert!(!result.succeeded);
        assert_eq!(result.origin, LookupOrigin::Error);
        assert!(!result.content.is_empty());
    }

    #[tokio::test]
    async fn test_silent_server_times_out_as_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        // Accept the connection and never answer
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let client =
            WolframClient::with_timeout("TEST-ID", url, Duration::from_millis(200)).unwrap();
        let started = std::time::Instant::now();
        let result = client.lookup("1+1").await;

        assert_eq!(result.origin, LookupOrigin::Error);
        assert!(!result.succeeded);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_default_client_builds() {
        let client = WolframClient::new("TEST-ID").unwrap();
        assert!(client.is_configured());
        assert!(!WolframClient::new("").unwrap().is_configured());
    }

    #[test]
    fn test_backoff_steps() {
        assert_eq!(backoff_delay(1), Duration::from_millis(100));
        assert_eq!(backoff_delay(2), Duration::from_millis(200));
        assert_eq!(backoff_delay(3), Duration::from_millis(400));
        assert_eq!(backoff_delay(9), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transport_errors() {
        let inner = ScriptedLookup::new(vec![
            LookupResult::transport_error("connection reset"),
            LookupResult::transport_error("connection reset"),
            LookupResult {
                content: "4".to_string(),
                succeeded: true,
                origin: LookupOrigin::WolframAlphaHttp,
            },
        ]);
        let calls = inner.calls();
        let lookup = RetryingLookup::new(inner, 3);

        let result = lookup.lookup("2+2").await;
        assert!(result.succeeded);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_budget() {
        let inner = ScriptedLookup::repeating(LookupResult::transport_error("timeout"));
        let calls = inner.calls();
        let lookup = RetryingLookup::new(inner, 2);

        let result = lookup.lookup("2+2").await;
        assert_eq!(result.origin, LookupOrigin::Error);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_ignores_service_answers() {
        let inner = ScriptedLookup::repeating(result_from_status(501, String::new()));
        let calls = inner.calls();
        let lookup = RetryingLookup::new(inner, 5);

        lookup.lookup("2+2").await;
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
