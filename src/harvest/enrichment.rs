//! Per-key enrichment of harvested records.

use std::collections::HashSet;
use std::time::Duration;

use crate::models::{AuditLog, EnrichedRecord, EnrichmentOutcome, NaturalKey, Record};
use crate::sources::{Source, SourceError};
use crate::utils::RateLimitedClient;

/// Enriched records plus the per-key outcome log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentRun {
    /// One entry per unique key, in key order
    pub records: Vec<EnrichedRecord>,
    pub audit: AuditLog,
}

/// Looks up each unique natural key once and pairs the first returned entry
/// with the original record
#[derive(Debug)]
pub struct EnrichmentMerger<'a> {
    client: &'a RateLimitedClient,
    source: &'a dyn Source,
    lookup_delay: Duration,
}

impl<'a> EnrichmentMerger<'a> {
    pub fn new(client: &'a RateLimitedClient, source: &'a dyn Source, lookup_delay: Duration) -> Self {
        Self {
            client,
            source,
            lookup_delay,
        }
    }

    /// Enrich every keyed record in `originals`.
    ///
    /// Keys are collapsed first, so a key shared by several records costs
    /// one lookup and pairs with the first record carrying it. Records
    /// without a key are not part of the output.
    pub async fn enrich(&self, originals: &[Record], key_field: &str) -> EnrichmentRun {
        let mut seen = HashSet::new();
        let mut pending: Vec<(NaturalKey, &Record)> = Vec::new();
        for record in originals {
            if let Some(key) = record.natural_key(key_field) {
                if seen.insert(key.clone()) {
                    pending.push((key, record));
                }
            }
        }

        let mut run = EnrichmentRun::default();
        let total = pending.len();
        for (i, (key, original)) in pending.into_iter().enumerate() {
            tracing::info!("[{}/{}] Looking up {}", i + 1, total, key);

            let (outcome, enrichment) = match self.lookup(&key).await {
                Ok(Some(entry)) => (EnrichmentOutcome::Success, Some(entry)),
                Ok(None) => (EnrichmentOutcome::NoMetadata, None),
                Err(e) => {
                    tracing::warn!("Lookup failed for {}: {}", key, e);
                    (EnrichmentOutcome::Failed, None)
                }
            };
            tracing::info!(target: "audit", key = %key, outcome = %outcome, "enrichment");

            run.audit.record(key.clone(), outcome);
            run.records.push(EnrichedRecord {
                natural_key: key,
                original: original.clone(),
                enrichment,
            });

            self.client.pause(self.lookup_delay).await;
        }

        let counts = run.audit.counts();
        tracing::info!(
            "Enrichment finished: {} success, {} without metadata, {} failed",
            counts.success,
            counts.no_metadata,
            counts.failed
        );
        run
    }

    /// First entry the source returns for `key`, if any
    async fn lookup(&self, key: &NaturalKey) -> Result<Option<Record>, SourceError> {
        let request = self.source.lookup_request(key)?;
        let body = self.client.send(&request).await?;
        let mut entries = self.source.parse_lookup(&body)?;
        if entries.len() > 1 {
            tracing::debug!("{} entries for {}, keeping the first", entries.len(), key);
        }
        Ok((!entries.is_empty()).then(|| entries.swap_remove(0)))
    }
}
