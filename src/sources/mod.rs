//! Publisher API adapters with a trait-based plugin architecture.
//!
//! A [`Source`] knows how to phrase search and lookup requests for one
//! publisher and how to read the bodies that come back. It never performs
//! I/O itself: requests are executed by the
//! [`RateLimitedClient`](crate::utils::RateLimitedClient), which keeps
//! retry and pacing policy in one place.
//!
//! # Built-in sources
//!
//! - `sciencedirect` - Elsevier ScienceDirect search + article metadata lookup
//!   (requires `ELSEVIER_API_KEY`)
//! - `springer` - Springer Nature metadata API (requires `SPRINGER_API_KEY`)
//! - `mock` - a tiny JSON shape used by tests
//!
//! # Implementing a New Source
//!
//! 1. Create a struct that implements `Source`
//! 2. Implement `search_request` and `parse_search_page`
//! 3. Implement `lookup_request` and `parse_lookup` if the API can resolve a
//!    single DOI, and advertise [`SourceCapabilities::DOI_LOOKUP`]
//! 4. Add the source to [`SourceRegistry::from_config`]

pub mod mock;
mod registry;
mod sciencedirect;
mod springer;

pub use mock::MockSource;
pub use registry::{SourceCapabilities, SourceRegistry};
pub use sciencedirect::ScienceDirectSource;
pub use springer::SpringerSource;

use serde_json::Value;

use crate::models::{NaturalKey, Query, Record};
use crate::utils::{ApiRequest, RequestFailure};

/// One page of search results as reported by a publisher
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    /// Total hits the server claims for the query
    pub total: Option<u64>,
    /// Records in server order
    pub records: Vec<Record>,
}

/// The Source trait defines the interface for all publisher adapters.
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this source (used in configuration, e.g., "springer")
    fn id(&self) -> &str;

    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// Describe the capabilities of this source
    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
    }

    /// Whether this source supports lookup by DOI
    fn supports_doi_lookup(&self) -> bool {
        self.capabilities().contains(SourceCapabilities::DOI_LOOKUP)
    }

    // ========== SEARCH ==========

    /// Request for `page_size` results of `query` starting at zero-based `offset`
    fn search_request(&self, query: &Query, offset: usize, page_size: usize) -> ApiRequest;

    /// Extract the reported total and the records from a search body
    fn parse_search_page(&self, body: &Value) -> Result<SearchPage, SourceError>;

    // ========== LOOKUP ==========

    /// Request resolving a single natural key
    fn lookup_request(&self, _key: &NaturalKey) -> Result<ApiRequest, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Entries returned by a lookup, in server order
    fn parse_lookup(&self, _body: &Value) -> Result<Vec<Record>, SourceError> {
        Err(SourceError::NotImplemented)
    }
}

/// Errors that can occur when interacting with a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The requested operation is not implemented for this source
    #[error("Operation not implemented for this source")]
    NotImplemented,

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// Response body did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A request exhausted its retry budget
    #[error(transparent)]
    Request(#[from] RequestFailure),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

/// Read a count that publishers send either as a number or a numeric string
pub(crate) fn count_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Turn a JSON array into records, skipping anything that is not an object
pub(crate) fn records_from(items: &[Value], source: &str) -> Vec<Record> {
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match Record::from_value(item.clone()) {
            Some(record) => records.push(record),
            None => tracing::warn!("Skipping non-object entry from {}: {}", source, item),
        }
    }
    records
}
