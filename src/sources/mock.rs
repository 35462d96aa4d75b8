//! Mock source and test doubles.
//!
//! [`MockSource`] speaks a deliberately tiny JSON dialect so harvest tests
//! can script responses by hand. [`ScriptedTransport`] and
//! [`RecordingSleeper`] stand in for the network and the clock.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::models::{NaturalKey, Query, Record};
use crate::sources::sciencedirect::checked_url;
use crate::sources::{count_value, records_from, SearchPage, Source, SourceCapabilities, SourceError};
use crate::utils::{ApiRequest, RawResponse, Sleeper, Transport};

/// A mock source for testing.
///
/// Search: `GET {base}/search?q=&offset=&show=` answered by
/// `{"total": n, "items": [...]}`.
/// Lookup: `GET {base}/lookup?key=` answered by `{"entries": [...]}`.
#[derive(Debug, Clone)]
pub struct MockSource {
    id: String,
    base_url: String,
}

impl MockSource {
    /// Create a new mock source.
    pub fn new(base_url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            id: "mock".to_string(),
            base_url: checked_url(base_url)?,
        })
    }

    /// Register under another id, so several mocks can share a registry
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH | SourceCapabilities::DOI_LOOKUP
    }

    fn search_request(&self, query: &Query, offset: usize, page_size: usize) -> ApiRequest {
        ApiRequest::get(format!("{}/search", self.base_url))
            .param("q", query)
            .param("offset", offset)
            .param("show", page_size)
    }

    fn parse_search_page(&self, body: &Value) -> Result<SearchPage, SourceError> {
        let items = body
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(SearchPage {
            total: body.get("total").and_then(count_value),
            records: records_from(items, self.id()),
        })
    }

    fn lookup_request(&self, key: &NaturalKey) -> Result<ApiRequest, SourceError> {
        Ok(ApiRequest::get(format!("{}/lookup", self.base_url)).param("key", key))
    }

    fn parse_lookup(&self, body: &Value) -> Result<Vec<Record>, SourceError> {
        match body.get("entries") {
            Some(Value::Array(items)) => Ok(records_from(items, self.id())),
            _ => Err(SourceError::Parse("mock lookup has no 'entries'".to_string())),
        }
    }
}

type Handler = Box<dyn Fn(&ApiRequest) -> Result<RawResponse, SourceError> + Send + Sync>;

/// A [`Transport`] that answers from a script instead of the network
/// and remembers every request it was given.
pub struct ScriptedTransport {
    handler: Handler,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    /// Answer requests with the given responses, in order. Once the script
    /// runs out every further request fails with a network error.
    pub fn sequence(responses: Vec<Result<RawResponse, SourceError>>) -> Self {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::routed(move |_| {
            lock(&queue)
                .pop_front()
                .unwrap_or_else(|| Err(SourceError::Network("script exhausted".to_string())))
        })
    }

    /// Answer each request by inspecting it
    pub fn routed<F>(handler: F) -> Self
    where
        F: Fn(&ApiRequest) -> Result<RawResponse, SourceError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<ApiRequest> {
        lock(&self.requests).clone()
    }
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("requests", &self.request_count())
            .finish()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse, SourceError> {
        lock(&self.requests).push(request.clone());
        (self.handler)(request)
    }
}

/// A [`Sleeper`] that returns immediately and records what it was asked
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        lock(&self.waits).clone()
    }

    pub fn total(&self) -> Duration {
        lock(&self.waits).iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.waits).push(duration);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Helper function to create a record keyed by `doi` for testing.
pub fn make_record(doi: &str, title: &str) -> Record {
    Record::new().with("doi", doi).with("title", title)
}
