//! Rate-limit aware request execution with bounded retry.
//!
//! [`RateLimitedClient::send`] classifies every response:
//!
//! - **200** returns the parsed JSON body.
//! - **429** waits for the server's `Retry-After` (or the configured default)
//!   and re-issues the identical request. These waits do not consume the
//!   retry budget and, unless a cap is configured, repeat until the server
//!   stops rate limiting.
//! - **anything else**, including network errors and unparseable 200 bodies,
//!   consumes one attempt; after `max_attempts` a [`RequestFailure`] is
//!   returned as an ordinary value.

use async_trait::async_trait;
use http::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::http::{ApiRequest, RawResponse, Transport};

/// Longest body excerpt written to logs
const LOG_BODY_LIMIT: usize = 500;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts allowed for non-429 failures, including the first
    pub max_attempts: u32,
    /// Fixed delay between failed attempts
    pub base_delay: Duration,
    /// Wait applied to a 429 that carries no usable `Retry-After`
    pub default_retry_after: Duration,
    /// Cap on consecutive 429 waits; `None` waits indefinitely
    pub max_rate_limit_waits: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            default_retry_after: Duration::from_secs(30),
            max_rate_limit_waits: None,
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }
}

/// Suspends the calling flow; every delay in a harvest goes through this
#[async_trait]
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A request that could not be completed within the retry budget
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("request failed after {attempts} attempt(s){}: {message}", status_suffix(.status))]
pub struct RequestFailure {
    /// Last HTTP status seen, `None` for network failures
    pub status: Option<StatusCode>,
    /// Unparsed response body or network error message
    pub message: String,
    pub attempts: u32,
}

/// Per-request retry bookkeeping, discarded once the request resolves
#[derive(Debug, Default)]
struct RetryState {
    failures: u32,
    rate_limit_waits: u32,
}

/// Issues requests through a [`Transport`], absorbing rate limits and
/// transient failures
#[derive(Debug, Clone)]
pub struct RateLimitedClient {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl RateLimitedClient {
    pub fn new(transport: Arc<dyn Transport>, sleeper: Arc<dyn Sleeper>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Wait between calls to the same endpoint; zero durations are skipped
    pub async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            self.sleeper.sleep(duration).await;
        }
    }

    /// Send `request` until it succeeds or the retry budget is spent
    pub async fn send(&self, request: &ApiRequest) -> Result<Value, RequestFailure> {
        let mut state = RetryState::default();

        loop {
            let failure = match self.transport.execute(request).await {
                Ok(response) if response.status == StatusCode::OK => {
                    match serde_json::from_str::<Value>(&response.body) {
                        Ok(body) => {
                            if state.failures > 0 {
                                tracing::info!(
                                    "Request succeeded on attempt {} after {} failure(s)",
                                    state.failures + 1,
                                    state.failures
                                );
                            }
                            return Ok(body);
                        }
                        Err(e) => RequestFailure {
                            status: Some(response.status),
                            message: format!("Invalid JSON body: {}", e),
                            attempts: 0,
                        },
                    }
                }
                Ok(response) if response.status == StatusCode::TOO_MANY_REQUESTS => {
                    state.rate_limit_waits += 1;
                    if let Some(cap) = self.policy.max_rate_limit_waits {
                        if state.rate_limit_waits > cap {
                            tracing::warn!("Giving up after {} rate-limit waits", cap);
                            return Err(RequestFailure {
                                status: Some(response.status),
                                message: response.body,
                                attempts: state.failures + state.rate_limit_waits,
                            });
                        }
                    }
                    let wait = self.rate_limit_wait(&response);
                    tracing::warn!(
                        "Rate limit reached for {}. Waiting {} seconds...",
                        request.url,
                        wait.as_secs_f64()
                    );
                    self.sleeper.sleep(wait).await;
                    continue;
                }
                Ok(response) => {
                    tracing::warn!(
                        "Error {} from {}: {}",
                        response.status,
                        request.url,
                        excerpt(&response.body)
                    );
                    RequestFailure {
                        status: Some(response.status),
                        message: response.body,
                        attempts: 0,
                    }
                }
                Err(e) => {
                    tracing::warn!("Network error for {}: {}", request.url, e);
                    RequestFailure {
                        status: None,
                        message: e.to_string(),
                        attempts: 0,
                    }
                }
            };

            state.failures += 1;
            if state.failures >= self.policy.max_attempts {
                tracing::warn!(
                    "Request failed after {} attempts: {}",
                    state.failures,
                    request.describe()
                );
                return Err(RequestFailure {
                    attempts: state.failures,
                    ..failure
                });
            }

            tracing::debug!(
                "Attempt {}/{} failed, retrying in {:?}",
                state.failures,
                self.policy.max_attempts,
                self.policy.base_delay
            );
            self.pause(self.policy.base_delay).await;
        }
    }

    fn rate_limit_wait(&self, response: &RawResponse) -> Duration {
        response
            .retry_after_delay()
            .unwrap_or(self.policy.default_retry_after)
    }
}

fn status_suffix(status: &Option<StatusCode>) -> String {
    status
        .map(|s| format!(" with status {}", s))
        .unwrap_or_default()
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(LOG_BODY_LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::mock::{RecordingSleeper, ScriptedTransport};
    use crate::sources::SourceError;
    use serde_json::json;

    fn client(transport: &Arc<ScriptedTransport>, sleeper: &Arc<RecordingSleeper>) -> RateLimitedClient {
        RateLimitedClient::new(
            transport.clone(),
            sleeper.clone(),
            RetryPolicy::default().base_delay(Duration::from_millis(100)),
        )
    }

    fn request() -> ApiRequest {
        ApiRequest::get("https://api.example.com/search").param("q", "x")
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![Ok(RawResponse::ok(
            &json!({"ok": true}),
        ))]));
        let sleeper = Arc::new(RecordingSleeper::new());

        let body = client(&transport, &sleeper).send(&request()).await.unwrap();

        assert_eq!(body, json!({"ok": true}));
        assert_eq!(transport.request_count(), 1);
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_waits_then_reissues_same_request() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            Ok(RawResponse::new(StatusCode::TOO_MANY_REQUESTS, "slow down").with_retry_after("5")),
            Ok(RawResponse::ok(&json!({"results": []}))),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());

        let body = client(&transport, &sleeper).send(&request()).await.unwrap();

        assert_eq!(body, json!({"results": []}));
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(5)]);
        let sent = transport.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
    }

    #[tokio::test]
    async fn test_rate_limit_without_header_uses_default() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            Ok(RawResponse::new(StatusCode::TOO_MANY_REQUESTS, "")),
            Ok(RawResponse::ok(&json!({}))),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());

        client(&transport, &sleeper).send(&request()).await.unwrap();

        assert_eq!(sleeper.waits(), vec![Duration::from_secs(30)]);
    }

    #[tokio::test]
    async fn test_rate_limit_does_not_consume_retry_budget() {
        let mut script = Vec::new();
        for _ in 0..10 {
            script.push(Ok(RawResponse::new(StatusCode::TOO_MANY_REQUESTS, "").with_retry_after("1")));
        }
        script.push(Ok(RawResponse::ok(&json!({"done": 1}))));
        let transport = Arc::new(ScriptedTransport::sequence(script));
        let sleeper = Arc::new(RecordingSleeper::new());

        let body = client(&transport, &sleeper).send(&request()).await.unwrap();

        assert_eq!(body, json!({"done": 1}));
        assert_eq!(transport.request_count(), 11);
        assert_eq!(sleeper.waits().len(), 10);
    }

    #[tokio::test]
    async fn test_rate_limit_cap_surfaces_failure() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            Ok(RawResponse::new(StatusCode::TOO_MANY_REQUESTS, "").with_retry_after("1")),
            Ok(RawResponse::new(StatusCode::TOO_MANY_REQUESTS, "").with_retry_after("1")),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let policy = RetryPolicy {
            max_rate_limit_waits: Some(1),
            ..RetryPolicy::default()
        };
        let client = RateLimitedClient::new(transport.clone(), sleeper.clone(), policy);

        let failure = client.send(&request()).await.unwrap_err();

        assert_eq!(failure.status, Some(StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_after_three_attempts() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            Ok(RawResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom 1")),
            Ok(RawResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom 2")),
            Ok(RawResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom 3")),
            Ok(RawResponse::ok(&json!({"never": "reached"}))),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());

        let failure = client(&transport, &sleeper).send(&request()).await.unwrap_err();

        assert_eq!(transport.request_count(), 3);
        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(failure.message, "boom 3");
        assert_eq!(sleeper.waits(), vec![Duration::from_millis(100); 2]);
    }

    #[tokio::test]
    async fn test_network_error_then_success() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            Err(SourceError::Network("connection refused".to_string())),
            Ok(RawResponse::ok(&json!({"ok": 1}))),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());

        let body = client(&transport, &sleeper).send(&request()).await.unwrap();

        assert_eq!(body, json!({"ok": 1}));
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_network_failure_has_no_status() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            Err(SourceError::Network("dns".to_string())),
            Err(SourceError::Network("dns".to_string())),
            Err(SourceError::Network("dns".to_string())),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());

        let failure = client(&transport, &sleeper).send(&request()).await.unwrap_err();

        assert_eq!(failure.status, None);
        assert!(failure.message.contains("dns"));
        assert!(failure.to_string().contains("3 attempt(s)"));
    }

    #[tokio::test]
    async fn test_invalid_json_counts_as_failure() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            Ok(RawResponse::new(StatusCode::OK, "<html>maintenance</html>")),
            Ok(RawResponse::ok(&json!({"ok": 1}))),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());

        let body = client(&transport, &sleeper).send(&request()).await.unwrap();

        assert_eq!(body, json!({"ok": 1}));
        assert_eq!(sleeper.waits(), vec![Duration::from_millis(100)]);
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let body = "ä".repeat(LOG_BODY_LIMIT + 10);
        assert_eq!(excerpt(&body).chars().count(), LOG_BODY_LIMIT);
        assert_eq!(excerpt("short"), "short");
    }
}
