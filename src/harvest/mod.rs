//! The harvesting engine.
//!
//! [`QueryExpander`] turns term groups into queries, [`Paginator`] drives each
//! query across pages, a [`DedupAccumulator`](crate::utils::DedupAccumulator)
//! keeps the first record per DOI, and [`EnrichmentMerger`] attaches one
//! metadata lookup per unique key. [`HarvestOrchestrator`] owns the state of
//! one run and sequences the steps; [`OutputWriter`] persists the results.
//!
//! Everything runs on one logical thread of control. Delays between calls
//! are the only throttling mechanism.

mod enrichment;
mod expander;
mod orchestrator;
mod output;
mod paginator;

pub use enrichment::{EnrichmentMerger, EnrichmentRun};
pub use expander::QueryExpander;
pub use orchestrator::{HarvestOrchestrator, HarvestOutcome};
pub use output::{read_records, OutputWriter};
pub use paginator::{PaginationSettings, Paginator, QueryFetch};

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::sources::SourceError;

/// Errors that abort a run
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot read {}: {message}", path.display())]
    Input { path: PathBuf, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client setup failed: {0}")]
    Client(#[from] SourceError),

    #[error("No configured source supports DOI lookup")]
    NoLookupSource,
}
