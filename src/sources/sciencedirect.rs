//! ScienceDirect research source implementation.
//!
//! Uses the Elsevier ScienceDirect Search API (v2, `PUT` with a JSON body)
//! and the article metadata API for single-DOI lookups.
//! API documentation: <https://dev.elsevier.com>
//!
//! Requires an API key from dev.elsevier.com

use serde_json::{json, Value};
use url::Url;

use crate::models::{NaturalKey, Query, Record};
use crate::sources::{count_value, records_from, SearchPage, Source, SourceCapabilities, SourceError};
use crate::utils::ApiRequest;

const SEARCH_URL: &str = "https://api.elsevier.com/content/search/sciencedirect";
const METADATA_URL: &str = "https://api.elsevier.com/content/metadata/article";

/// Fields requested from the metadata API
const LOOKUP_FIELDS: &str =
    "identifier,title,description,author,publicationName,coverDate,openAccess,link";

/// ScienceDirect research source
#[derive(Debug, Clone)]
pub struct ScienceDirectSource {
    api_key: String,
    search_url: String,
    metadata_url: String,
}

impl ScienceDirectSource {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            search_url: SEARCH_URL.to_string(),
            metadata_url: METADATA_URL.to_string(),
        }
    }

    /// Point search and/or lookup at different endpoints
    pub fn with_endpoints(
        mut self,
        search_url: Option<&str>,
        metadata_url: Option<&str>,
    ) -> Result<Self, SourceError> {
        if let Some(url) = search_url {
            self.search_url = checked_url(url)?;
        }
        if let Some(url) = metadata_url {
            self.metadata_url = checked_url(url)?;
        }
        Ok(self)
    }

    fn authorized(&self, request: ApiRequest) -> ApiRequest {
        request
            .header("Accept", "application/json")
            .header("X-ELS-APIKey", self.api_key.as_str())
    }
}

pub(crate) fn checked_url(raw: &str) -> Result<String, SourceError> {
    let url = Url::parse(raw)
        .map_err(|e| SourceError::InvalidRequest(format!("invalid endpoint '{}': {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SourceError::InvalidRequest(format!(
            "endpoint '{}' must use http or https",
            raw
        )));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

impl Source for ScienceDirectSource {
    fn id(&self) -> &str {
        "sciencedirect"
    }

    fn name(&self) -> &str {
        "ScienceDirect"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH | SourceCapabilities::DOI_LOOKUP
    }

    fn search_request(&self, query: &Query, offset: usize, page_size: usize) -> ApiRequest {
        self.authorized(ApiRequest::put(&self.search_url)).json(json!({
            "qs": query.as_str(),
            "offset": offset,
            "show": page_size,
        }))
    }

    fn parse_search_page(&self, body: &Value) -> Result<SearchPage, SourceError> {
        let reported = body
            .get("resultsFound")
            .and_then(count_value)
            .or_else(|| body.get("totalResults").and_then(count_value));

        match body.get("results") {
            Some(Value::Array(items)) => Ok(SearchPage {
                total: reported.or(Some(items.len() as u64)),
                records: records_from(items, self.id()),
            }),
            // Zero-hit responses omit the list entirely
            None if reported == Some(0) => Ok(SearchPage {
                total: Some(0),
                records: Vec::new(),
            }),
            Some(other) => Err(SourceError::Parse(format!(
                "ScienceDirect 'results' is not a list: {}",
                other
            ))),
            None => Err(SourceError::Parse(
                "ScienceDirect response has no 'results'".to_string(),
            )),
        }
    }

    fn lookup_request(&self, key: &NaturalKey) -> Result<ApiRequest, SourceError> {
        Ok(self
            .authorized(ApiRequest::get(&self.metadata_url))
            .param("query", format!("doi({})", key))
            .param("field", LOOKUP_FIELDS))
    }

    fn parse_lookup(&self, body: &Value) -> Result<Vec<Record>, SourceError> {
        let results = body.get("search-results").ok_or_else(|| {
            SourceError::Parse("metadata response has no 'search-results'".to_string())
        })?;

        let entries = match results.get("entry") {
            Some(Value::Array(items)) => items.as_slice(),
            Some(Value::Null) | None => &[],
            Some(other) => {
                return Err(SourceError::Parse(format!(
                    "metadata 'entry' is not a list: {}",
                    other
                )))
            }
        };

        // Elsevier reports an empty result set as a single entry with an
        // `error` member
        Ok(records_from(entries, self.id())
            .into_iter()
            .filter(|r| r.get("error").is_none())
            .collect())
    }
}
