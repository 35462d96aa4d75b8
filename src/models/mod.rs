//! Core data models for harvested records and run outcomes.

mod harvest;
mod query;
mod record;

pub use harvest::{
    AuditEntry, AuditLog, EnrichedRecord, EnrichmentCounts, EnrichmentOutcome, HarvestSummary,
    QueryReport, TerminalReason,
};
pub use query::{Query, TermGroup};
pub use record::{NaturalKey, Record};
