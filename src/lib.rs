//! # Research Harvester
//!
//! Harvests bibliographic metadata from scholarly-publisher APIs, keyed and
//! deduplicated by DOI, with per-DOI metadata enrichment.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Records, natural keys, queries and run reports
//! - [`sources`]: Publisher adapters behind the [`Source`] trait
//! - [`harvest`]: Query expansion, pagination, enrichment and the run orchestrator
//! - [`normalize`]: Filtering and CSV export of a finished result set
//! - [`utils`]: HTTP transport, rate-limited client and deduplication
//! - [`config`]: Configuration management

pub mod config;
pub mod harvest;
pub mod models;
pub mod normalize;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use harvest::{HarvestError, HarvestOrchestrator};
pub use models::{NaturalKey, Query, Record};
pub use sources::{Source, SourceRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
