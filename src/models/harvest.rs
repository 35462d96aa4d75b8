//! Outcome types produced by a harvest run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{NaturalKey, Query, Record};

/// Why a paginated fetch of one query stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// Every reported result was paged through
    Completed,
    /// The probe reported zero results
    Empty,
    /// The per-query safety cap was reached before the reported total
    Capped,
    /// A page fetch failed; records gathered before it are kept
    Partial,
    /// The probe request failed; the query was abandoned
    ProbeFailed,
}

impl TerminalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalReason::Completed => "completed",
            TerminalReason::Empty => "empty",
            TerminalReason::Capped => "capped",
            TerminalReason::Partial => "partial",
            TerminalReason::ProbeFailed => "probe_failed",
        }
    }
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-query accounting kept by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryReport {
    pub source: String,
    pub query: Query,
    pub reported_total: Option<u64>,
    pub pages_fetched: usize,
    pub records_fetched: usize,
    /// Records that were not already in the result set
    pub new_records: usize,
    pub terminal_reason: TerminalReason,
}

/// Result of a single per-key enrichment lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrichmentOutcome {
    Success,
    NoMetadata,
    Failed,
}

impl EnrichmentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentOutcome::Success => "SUCCESS",
            EnrichmentOutcome::NoMetadata => "NO_METADATA",
            EnrichmentOutcome::Failed => "FAILED",
        }
    }
}

impl fmt::Display for EnrichmentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An original record paired with at most one enrichment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    pub natural_key: NaturalKey,
    pub original: Record,
    pub enrichment: Option<Record>,
}

/// One line of the enrichment audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub key: NaturalKey,
    pub outcome: EnrichmentOutcome,
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.outcome)
    }
}

/// Ordered per-key enrichment outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: NaturalKey, outcome: EnrichmentOutcome) {
        self.entries.push(AuditEntry { key, outcome });
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, outcome: EnrichmentOutcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }

    pub fn counts(&self) -> EnrichmentCounts {
        EnrichmentCounts {
            success: self.count(EnrichmentOutcome::Success),
            no_metadata: self.count(EnrichmentOutcome::NoMetadata),
            failed: self.count(EnrichmentOutcome::Failed),
        }
    }

    /// Line-oriented rendering, one `<key>: <OUTCOME>` line per key
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}\n", e))
            .collect()
    }
}

/// Tally of enrichment outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentCounts {
    pub success: usize,
    pub no_metadata: usize,
    pub failed: usize,
}

/// Machine-readable account of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub queries: Vec<QueryReport>,
    pub terminal_reasons: BTreeMap<TerminalReason, usize>,
    pub unique_records: usize,
    pub unkeyed_records: usize,
    pub duplicates_dropped: usize,
    pub enrichment: Option<EnrichmentCounts>,
    /// Record counts per `contentType`
    pub content_types: Vec<(String, usize)>,
    /// Record counts per `language`
    pub languages: Vec<(String, usize)>,
    /// Record counts per `publicationType`
    pub publication_types: Vec<(String, usize)>,
}

impl HarvestSummary {
    pub fn tally(queries: &[QueryReport]) -> BTreeMap<TerminalReason, usize> {
        let mut tally = BTreeMap::new();
        for report in queries {
            *tally.entry(report.terminal_reason).or_insert(0) += 1;
        }
        tally
    }
}
