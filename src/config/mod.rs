//! Configuration management.
//!
//! Every pacing constant lives here rather than in the engine: the delays
//! only need to keep a run under the publisher's published rate limit, so
//! operators tune them per API plan.

mod file_config;

pub use file_config::{find_config_file, load_config, save_config, CONFIG_FILE_NAME};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::TermGroup;
use crate::utils::RetryPolicy;

/// Source ids the registry knows how to build
pub const KNOWN_SOURCES: &[&str] = &["sciencedirect", "springer"];

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub harvest: HarvestConfig,

    #[serde(default)]
    pub pacing: PacingConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub terms: TermsConfig,

    /// Publishers to query, in order; earlier sources win dedup ties
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    #[serde(default)]
    pub normalize: NormalizeConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            harvest: HarvestConfig::default(),
            pacing: PacingConfig::default(),
            retry: RetryConfig::default(),
            terms: TermsConfig::default(),
            sources: default_sources(),
            enrichment: EnrichmentConfig::default(),
            normalize: NormalizeConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_sources() -> Vec<SourceConfig> {
    vec![SourceConfig::new("sciencedirect")]
}

impl Config {
    /// A ready-to-edit configuration with example term groups
    pub fn starter() -> Self {
        let mut config = Self::default();
        config.terms.groups = vec![
            TermGroup::new(
                "responsible_ai",
                ["responsible AI", "trustworthy AI", "ethical AI", "explainable AI"],
            ),
            TermGroup::new(
                "manufacturing",
                ["cyber-physical systems", "manufacturing", "Industry 4.0", "smart factory"],
            ),
            TermGroup::new(
                "design",
                ["value-sensitive design", "ethics by design", "design methodology"],
            ),
        ];
        config
    }

    /// Checks shared by every mode: sizes, timeouts and source ids
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.harvest.page_size == 0 {
            return Err(ConfigError::Invalid("harvest.page_size must be > 0".into()));
        }
        if self.harvest.max_results_per_query == 0 {
            return Err(ConfigError::Invalid(
                "harvest.max_results_per_query must be > 0".into(),
            ));
        }
        if self.harvest.key_field.trim().is_empty() {
            return Err(ConfigError::Invalid("harvest.key_field must not be empty".into()));
        }
        if self.retry.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "retry.request_timeout_secs must be > 0".into(),
            ));
        }

        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("at least one source is required".into()));
        }
        for source in &self.sources {
            if !KNOWN_SOURCES.contains(&source.id.as_str()) {
                return Err(ConfigError::UnknownSource(source.id.clone()));
            }
        }

        if let Some(id) = &self.enrichment.source {
            if !KNOWN_SOURCES.contains(&id.as_str()) {
                return Err(ConfigError::UnknownSource(id.clone()));
            }
        }

        Ok(())
    }

    /// Everything [`validate`](Self::validate) checks, plus usable search terms
    pub fn validate_harvest(&self) -> Result<(), ConfigError> {
        self.validate()?;
        self.terms.validate()
    }

    /// Configuration for a source id, if one is listed
    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }
}

/// Pagination and output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Results requested per page (ScienceDirect accepts 10, 25, 50, 100)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Safety cap on results fetched for one query, independent of the
    /// total the publisher reports
    #[serde(default = "default_max_results")]
    pub max_results_per_query: usize,

    /// Record field holding the natural key
    #[serde(default = "default_key_field")]
    pub key_field: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_results_per_query: default_max_results(),
            key_field: default_key_field(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_page_size() -> usize {
    25
}

fn default_max_results() -> usize {
    500
}

fn default_key_field() -> String {
    "doi".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

/// Fixed delays between calls to the same endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "default_page_delay")]
    pub page_delay_ms: u64,

    /// Pause after each query; after an empty query it is multiplied by the
    /// current empty streak
    #[serde(default = "default_query_delay")]
    pub query_delay_ms: u64,

    #[serde(default = "default_lookup_delay")]
    pub lookup_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            page_delay_ms: default_page_delay(),
            query_delay_ms: default_query_delay(),
            lookup_delay_ms: default_lookup_delay(),
        }
    }
}

impl PacingConfig {
    /// No delays at all
    pub fn none() -> Self {
        Self {
            page_delay_ms: 0,
            query_delay_ms: 0,
            lookup_delay_ms: 0,
        }
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn query_delay(&self) -> Duration {
        Duration::from_millis(self.query_delay_ms)
    }

    pub fn lookup_delay(&self) -> Duration {
        Duration::from_millis(self.lookup_delay_ms)
    }
}

fn default_page_delay() -> u64 {
    700
}

fn default_query_delay() -> u64 {
    700
}

fn default_lookup_delay() -> u64 {
    800
}

/// Retry behavior of the HTTP client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_retry_after")]
    pub default_retry_after_secs: u64,

    /// Unset means 429 responses are waited out indefinitely
    #[serde(default)]
    pub max_rate_limit_waits: Option<u32>,

    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            default_retry_after_secs: default_retry_after(),
            max_rate_limit_waits: None,
            request_timeout_secs: default_timeout(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            default_retry_after: Duration::from_secs(self.default_retry_after_secs),
            max_rate_limit_waits: self.max_rate_limit_waits,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_retry_after() -> u64 {
    30
}

fn default_timeout() -> u64 {
    30
}

/// Search term groups, crossed into queries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermsConfig {
    #[serde(default)]
    pub groups: Vec<TermGroup>,
}

impl TermsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.groups.is_empty() {
            return Err(ConfigError::Invalid(
                "terms.groups must contain at least one group".into(),
            ));
        }
        for (i, group) in self.groups.iter().enumerate() {
            let label = if group.name.is_empty() {
                format!("#{}", i + 1)
            } else {
                group.name.clone()
            };
            if group.is_empty() {
                return Err(ConfigError::Invalid(format!("term group {} is empty", label)));
            }
            for term in &group.terms {
                if term.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "term group {} contains an empty term",
                        label
                    )));
                }
                if term.contains('"') {
                    return Err(ConfigError::Invalid(format!(
                        "term {:?} in group {} contains a double quote",
                        term, label
                    )));
                }
            }
        }
        Ok(())
    }
}

/// How term groups become queries for one source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionMode {
    /// One query per combination: `"a" AND "c"`, `"a" AND "d"`, ...
    CrossProduct,
    /// A single query: `("a" OR "b") AND ("c" OR "d")`
    Combined,
}

/// Per-publisher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,

    /// Falls back to the source's environment variable when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Defaults to the source's preferred mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expansion: Option<ExpansionMode>,

    /// Earliest publication year/date to request, where the API supports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,

    /// Override of the search endpoint (proxies, test servers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_url: Option<String>,

    /// Override of the lookup endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_url: Option<String>,
}

impl SourceConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            api_key: None,
            expansion: None,
            date_from: None,
            search_url: None,
            lookup_url: None,
        }
    }

    /// Configured expansion, else the mode the source's API handles best
    pub fn expansion_mode(&self) -> ExpansionMode {
        self.expansion.unwrap_or_else(|| default_expansion(&self.id))
    }

    /// Environment variables consulted for this source's key, in order
    pub fn api_key_env_vars(&self) -> &'static [&'static str] {
        match self.id.as_str() {
            "sciencedirect" => &["ELSEVIER_API_KEY", "API_KEY_SCIENCEDIRECT"],
            "springer" => &["SPRINGER_API_KEY"],
            _ => &[],
        }
    }

    /// Configured key, else the first non-empty environment variable
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.trim().to_string());
        }
        self.api_key_env_vars()
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| ConfigError::MissingApiKey {
                source_id: self.id.clone(),
                env: self.api_key_env_vars().join(" or "),
            })
    }
}

/// Springer accepts long boolean expressions, ScienceDirect caps the number
/// of operators per query
pub fn default_expansion(source_id: &str) -> ExpansionMode {
    match source_id {
        "springer" => ExpansionMode::Combined,
        _ => ExpansionMode::CrossProduct,
    }
}

/// Per-key lookup after the search phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Source used for lookups; defaults to the first configured source
    /// that supports DOI lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Filter applied by the `normalize` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Content types accepted verbatim
    #[serde(default = "default_content_types")]
    pub content_types: Vec<String>,

    /// Accept any content type ending in `ConferencePaper`
    #[serde(default = "default_true")]
    pub include_conference_papers: bool,

    /// Accept records whose genre starts with "review"
    #[serde(default = "default_true")]
    pub include_reviews: bool,

    #[serde(default = "default_language")]
    pub language: Option<String>,

    #[serde(default = "default_from_year")]
    pub from_year: Option<i32>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            content_types: default_content_types(),
            include_conference_papers: true,
            include_reviews: true,
            language: default_language(),
            from_year: default_from_year(),
        }
    }
}

fn default_content_types() -> Vec<String> {
    vec!["Article".to_string()]
}

fn default_language() -> Option<String> {
    Some("en".to_string())
}

fn default_from_year() -> Option<i32> {
    Some(2016)
}

/// Artifact file names inside the output directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_results_file")]
    pub results_file: String,

    #[serde(default = "default_enriched_file")]
    pub enriched_file: String,

    #[serde(default = "default_audit_file")]
    pub audit_file: String,

    #[serde(default = "default_summary_file")]
    pub summary_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_file: default_results_file(),
            enriched_file: default_enriched_file(),
            audit_file: default_audit_file(),
            summary_file: default_summary_file(),
        }
    }
}

fn default_results_file() -> String {
    "combined_results.json".to_string()
}

fn default_enriched_file() -> String {
    "merged_with_metadata.json".to_string()
}

fn default_audit_file() -> String {
    "doi_metadata_log.txt".to_string()
}

fn default_summary_file() -> String {
    "harvest_summary.json".to_string()
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration errors; all of them abort a run before any request is made
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown source '{0}' (known: {known})", known = KNOWN_SOURCES.join(", "))]
    UnknownSource(String),

    #[error("No API key for source '{source_id}': set it in the config file or via {env}")]
    MissingApiKey { source_id: String, env: String },
}
