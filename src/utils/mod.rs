//! Utility modules supporting harvest operations.
//!
//! - [`HttpClient`]: shared reqwest client with timeouts and user agent
//! - [`ApiRequest`] / [`RawResponse`]: transport-neutral request and response
//! - [`Transport`]: executes one request; [`ReqwestTransport`] in production
//! - [`RateLimitedClient`]: retry on failure, wait out HTTP 429
//! - [`Sleeper`]: every delay goes through it; [`TokioSleeper`] in production
//! - [`DedupAccumulator`]: first-seen-wins result set keyed by DOI
//!
//! # Sending a request
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use research_harvester::utils::{
//!     ApiRequest, HttpClient, RateLimitedClient, ReqwestTransport, RetryPolicy, TokioSleeper,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = ReqwestTransport::new(HttpClient::new(Duration::from_secs(30))?);
//! let client = RateLimitedClient::new(
//!     Arc::new(transport),
//!     Arc::new(TokioSleeper),
//!     RetryPolicy::default(),
//! );
//! let body = client
//!     .send(&ApiRequest::get("https://api.example.com/search").param("q", "x"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod dedup;
mod http;
mod retry;

pub use dedup::DedupAccumulator;
pub use self::http::{ApiRequest, HttpClient, RawResponse, ReqwestTransport, Transport};
pub use retry::{RateLimitedClient, RequestFailure, RetryPolicy, Sleeper, TokioSleeper};
