//! Springer research source implementation.
//!
//! Uses the Springer Nature Meta API (v2) for searching publications from
//! Springer Link.
//! API documentation: <https://dev.springernature.com>
//!
//! Requires a free API key from dev.springernature.com

use serde_json::Value;

use crate::models::{NaturalKey, Query, Record};
use crate::sources::sciencedirect::checked_url;
use crate::sources::{count_value, records_from, SearchPage, Source, SourceCapabilities, SourceError};
use crate::utils::ApiRequest;

const SPRINGER_API_BASE: &str = "https://api.springernature.com/meta/v2/json";

/// Springer research source
#[derive(Debug, Clone)]
pub struct SpringerSource {
    api_key: String,
    search_url: String,
    lookup_url: String,
    date_from: Option<String>,
}

impl SpringerSource {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            search_url: SPRINGER_API_BASE.to_string(),
            lookup_url: SPRINGER_API_BASE.to_string(),
            date_from: None,
        }
    }

    /// Point searches and lookups elsewhere; lookups follow the search
    /// endpoint unless given their own
    pub fn with_endpoints(
        mut self,
        search_url: Option<&str>,
        lookup_url: Option<&str>,
    ) -> Result<Self, SourceError> {
        if let Some(url) = search_url {
            self.search_url = checked_url(url)?;
            self.lookup_url = self.search_url.clone();
        }
        if let Some(url) = lookup_url {
            self.lookup_url = checked_url(url)?;
        }
        Ok(self)
    }

    /// Restrict searches to publications dated on or after `date`
    pub fn with_date_from(mut self, date: impl Into<String>) -> Self {
        self.date_from = Some(date.into());
        self
    }

    fn request(&self, url: &str, q: String, start: usize, page_size: usize) -> ApiRequest {
        ApiRequest::get(url)
            .param("q", q)
            .param("p", page_size)
            .param("s", start)
            .param("api_key", self.api_key.as_str())
    }
}

impl Source for SpringerSource {
    fn id(&self) -> &str {
        "springer"
    }

    fn name(&self) -> &str {
        "Springer"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH | SourceCapabilities::DOI_LOOKUP
    }

    fn search_request(&self, query: &Query, offset: usize, page_size: usize) -> ApiRequest {
        let q = match &self.date_from {
            Some(date) => format!("{} AND dateFrom:\"{}\"", query, date),
            None => query.to_string(),
        };
        // Springer's `s` is the 1-based index of the first record
        self.request(&self.search_url, q, offset + 1, page_size)
    }

    fn parse_search_page(&self, body: &Value) -> Result<SearchPage, SourceError> {
        let total = body
            .get("result")
            .and_then(Value::as_array)
            .and_then(|r| r.first())
            .and_then(|r| r.get("total"))
            .and_then(count_value);

        let records = match body.get("records") {
            Some(Value::Array(items)) => records_from(items, self.id()),
            None if total == Some(0) => Vec::new(),
            _ => {
                return Err(SourceError::Parse(
                    "Springer response has no 'records' list".to_string(),
                ))
            }
        };

        Ok(SearchPage {
            total: total.or(Some(records.len() as u64)),
            records,
        })
    }

    fn lookup_request(&self, key: &NaturalKey) -> Result<ApiRequest, SourceError> {
        Ok(self.request(&self.lookup_url, format!("doi:\"{}\"", key), 1, 1))
    }

    fn parse_lookup(&self, body: &Value) -> Result<Vec<Record>, SourceError> {
        Ok(self.parse_search_page(body)?.records)
    }
}
