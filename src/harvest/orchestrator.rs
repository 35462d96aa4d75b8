//! Sequencing of a whole harvest run.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

use super::{
    read_records, EnrichmentMerger, EnrichmentRun, HarvestError, OutputWriter, PaginationSettings,
    Paginator, QueryExpander,
};
use crate::config::{default_expansion, Config, ConfigError, SourceConfig};
use crate::models::{HarvestSummary, Query, QueryReport, Record, TerminalReason};
use crate::normalize::breakdown;
use crate::sources::{Source, SourceRegistry};
use crate::utils::{DedupAccumulator, HttpClient, RateLimitedClient, ReqwestTransport, TokioSleeper};

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct HarvestOutcome {
    /// The deduplicated result set in first-seen order
    pub records: Vec<Record>,
    pub enrichment: Option<EnrichmentRun>,
    pub summary: HarvestSummary,
}

/// Owns all mutable state of one harvest run
///
/// The accumulator, the empty-query streak and the per-query reports live
/// here rather than in globals, so separate runs never share state.
#[derive(Debug)]
pub struct HarvestOrchestrator {
    config: Config,
    registry: SourceRegistry,
    client: RateLimitedClient,
    accumulator: DedupAccumulator,
    empty_streak: u32,
    reports: Vec<QueryReport>,
}

impl HarvestOrchestrator {
    /// Validate the settings every mode shares and assemble a run from its
    /// parts; [`run`](Self::run) and [`run_enrichment`](Self::run_enrichment)
    /// check their own requirements before doing any work
    pub fn new(
        config: Config,
        registry: SourceRegistry,
        client: RateLimitedClient,
    ) -> Result<Self, HarvestError> {
        config.validate()?;

        Ok(Self {
            accumulator: DedupAccumulator::new(config.harvest.key_field.clone()),
            config,
            registry,
            client,
            empty_streak: 0,
            reports: Vec::new(),
        })
    }

    /// Production wiring: configured sources over reqwest with real delays
    pub fn from_config(config: Config) -> Result<Self, HarvestError> {
        let registry = SourceRegistry::from_config(&config)?;
        let http = HttpClient::new(config.retry.request_timeout())?;
        let client = RateLimitedClient::new(
            Arc::new(ReqwestTransport::new(http)),
            Arc::new(TokioSleeper),
            config.retry.policy(),
        );
        Self::new(config, registry, client)
    }

    pub fn writer(&self) -> OutputWriter {
        OutputWriter::new(&self.config.harvest.output_dir, self.config.output.clone())
    }

    pub fn reports(&self) -> &[QueryReport] {
        &self.reports
    }

    pub fn empty_streak(&self) -> u32 {
        self.empty_streak
    }

    /// Search, optionally enrich, and write every artifact.
    ///
    /// The output directory is checked before the first request so an
    /// unwritable destination aborts the run without partial output.
    pub async fn run(mut self) -> Result<HarvestOutcome, HarvestError> {
        self.config.validate_harvest()?;
        if self.registry.searchable().next().is_none() {
            return Err(ConfigError::Invalid("no searchable source is configured".into()).into());
        }

        let started_at = Utc::now();
        let writer = self.writer();
        writer.prepare()?;

        self.harvest().await;
        writer.write_results(self.accumulator.all())?;

        let enrichment = if self.config.enrichment.enabled {
            self.enrich_accumulated(&writer).await?
        } else {
            tracing::info!("Enrichment disabled");
            None
        };

        self.finish(started_at, &writer, enrichment)
    }

    /// Enrich a result set written by an earlier run.
    ///
    /// Needs a lookup source but no search terms.
    pub async fn run_enrichment(mut self, input: &Path) -> Result<HarvestOutcome, HarvestError> {
        if self
            .registry
            .lookup_source(self.config.enrichment.source.as_deref())
            .is_none()
        {
            return Err(HarvestError::NoLookupSource);
        }

        let started_at = Utc::now();
        let writer = self.writer();
        writer.prepare()?;

        let records = read_records(input)?;
        tracing::info!("Loaded {} records from {}", records.len(), input.display());
        self.accumulator.extend(records);

        let run = self.enrich_records().await?;
        writer.write_enriched(&run.records)?;
        writer.write_audit(&run.audit)?;
        self.finish(started_at, &writer, Some(run))
    }

    /// Run every query of every searchable source, in order
    pub async fn harvest(&mut self) {
        let expander = QueryExpander::new(self.config.terms.groups.clone());
        let sources: Vec<Arc<dyn Source>> = self.registry.searchable().cloned().collect();

        for source in sources {
            let mode = self
                .config
                .source(source.id())
                .map(SourceConfig::expansion_mode)
                .unwrap_or_else(|| default_expansion(source.id()));
            let queries = expander.expand_with(mode);
            tracing::info!(
                "Searching {} with {} quer{}",
                source.name(),
                queries.len(),
                if queries.len() == 1 { "y" } else { "ies" }
            );

            for (i, query) in queries.iter().enumerate() {
                tracing::info!("[{}/{}] Query: {}", i + 1, queries.len(), query);
                self.run_query(source.as_ref(), query).await;
            }
        }

        tracing::info!(
            "Finished searching. Total unique results: {}",
            self.accumulator.len()
        );
    }

    /// Enrich the accumulated keys with the configured lookup source
    pub async fn enrich_records(&self) -> Result<EnrichmentRun, HarvestError> {
        let source = self
            .registry
            .lookup_source(self.config.enrichment.source.as_deref())
            .ok_or(HarvestError::NoLookupSource)?;
        tracing::info!(
            "Enriching {} unique keys via {}",
            self.accumulator.unique_keys().len(),
            source.name()
        );

        let merger = EnrichmentMerger::new(&self.client, source.as_ref(), self.config.pacing.lookup_delay());
        Ok(merger
            .enrich(self.accumulator.all(), &self.config.harvest.key_field)
            .await)
    }

    async fn run_query(&mut self, source: &dyn Source, query: &Query) {
        let settings = PaginationSettings {
            page_size: self.config.harvest.page_size,
            max_results_per_query: self.config.harvest.max_results_per_query,
            page_delay: self.config.pacing.page_delay(),
        };
        let fetch = Paginator::new(&self.client, source, settings)
            .fetch_all(query)
            .await;

        let records_fetched = fetch.records.len();
        let new_records = self.accumulator.extend(fetch.records);
        if records_fetched > 0 {
            tracing::info!(
                "{} records, {} new, {} unique so far",
                records_fetched,
                new_records,
                self.accumulator.len()
            );
        }

        self.reports.push(QueryReport {
            source: source.id().to_string(),
            query: query.clone(),
            reported_total: fetch.reported_total,
            pages_fetched: fetch.pages_fetched,
            records_fetched,
            new_records,
            terminal_reason: fetch.terminal_reason,
        });

        self.pace_after(fetch.terminal_reason).await;
    }

    /// Pause before the next query; empty queries back off in proportion to
    /// how many came in a row
    async fn pace_after(&mut self, reason: TerminalReason) {
        let delay = self.config.pacing.query_delay();
        match reason {
            TerminalReason::Empty => {
                self.empty_streak += 1;
                let wait = delay * self.empty_streak;
                tracing::info!(
                    "No results. Empty streak: {}. Waiting {:.2}s...",
                    self.empty_streak,
                    wait.as_secs_f64()
                );
                self.client.pause(wait).await;
            }
            TerminalReason::ProbeFailed => {
                tracing::warn!("API error during probe, skipping query");
                self.client.pause(delay).await;
            }
            TerminalReason::Completed | TerminalReason::Capped | TerminalReason::Partial => {
                self.empty_streak = 0;
                self.client.pause(delay).await;
            }
        }
    }

    async fn enrich_accumulated(
        &self,
        writer: &OutputWriter,
    ) -> Result<Option<EnrichmentRun>, HarvestError> {
        match self.enrich_records().await {
            Ok(run) => {
                writer.write_enriched(&run.records)?;
                writer.write_audit(&run.audit)?;
                Ok(Some(run))
            }
            Err(HarvestError::NoLookupSource) => {
                tracing::warn!("No configured source supports DOI lookup, skipping enrichment");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn finish(
        self,
        started_at: DateTime<Utc>,
        writer: &OutputWriter,
        enrichment: Option<EnrichmentRun>,
    ) -> Result<HarvestOutcome, HarvestError> {
        let records = self.accumulator.all();
        let summary = HarvestSummary {
            started_at,
            finished_at: Utc::now(),
            terminal_reasons: HarvestSummary::tally(&self.reports),
            queries: self.reports,
            unique_records: self.accumulator.len(),
            unkeyed_records: self.accumulator.unkeyed(),
            duplicates_dropped: self.accumulator.duplicates(),
            enrichment: enrichment.as_ref().map(|run| run.audit.counts()),
            content_types: breakdown(records, "contentType"),
            languages: breakdown(records, "language"),
            publication_types: breakdown(records, "publicationType"),
        };
        writer.write_summary(&summary)?;

        Ok(HarvestOutcome {
            records: self.accumulator.into_records(),
            enrichment,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PacingConfig;
    use crate::models::{EnrichmentOutcome, TermGroup};
    use crate::sources::mock::{RecordingSleeper, ScriptedTransport};
    use crate::sources::MockSource;
    use crate::utils::{ApiRequest, RawResponse, RetryPolicy};
    use http::StatusCode;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::TempDir;

    fn param(request: &ApiRequest, name: &str) -> usize {
        request.query_param(name).unwrap().parse().unwrap()
    }

    /// Serves `items` for every search and one entry per lookup
    fn server(items: Vec<Value>) -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport::routed(move |request| {
            if request.url.ends_with("/lookup") {
                let key = request.query_param("key").unwrap_or_default();
                return Ok(RawResponse::ok(
                    &json!({"entries": [{"abstract": format!("abstract of {}", key)}]}),
                ));
            }
            let offset = param(request, "offset");
            let show = param(request, "show");
            let page: Vec<_> = items.iter().skip(offset).take(show).cloned().collect();
            Ok(RawResponse::ok(&json!({"total": items.len(), "items": page})))
        }))
    }

    fn config(groups: &[&[&str]], output: &TempDir) -> Config {
        let mut config = Config::default();
        config.terms.groups = groups
            .iter()
            .map(|terms| TermGroup::new("", terms.iter().copied()))
            .collect();
        config.pacing = PacingConfig::none();
        config.harvest.output_dir = output.path().join("results");
        config
    }

    fn orchestrator(
        config: Config,
        transport: Arc<ScriptedTransport>,
        sleeper: Arc<RecordingSleeper>,
    ) -> HarvestOrchestrator {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(MockSource::new("http://mock.test").unwrap()));
        let client = RateLimitedClient::new(
            transport,
            sleeper,
            RetryPolicy::default().base_delay(Duration::ZERO),
        );
        HarvestOrchestrator::new(config, registry, client).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_single_query() {
        let output = TempDir::new().unwrap();
        let transport = server(vec![
            json!({"doi": "10.1/a", "title": "first", "publicationType": "Journal"}),
            json!({"doi": "10.1/b", "title": "second", "publicationType": "Book"}),
            json!({"doi": "10.1/a", "title": "duplicate", "publicationType": "Book"}),
        ]);
        let config = config(&[&["x"], &["y"]], &output);
        let orchestrator = orchestrator(config, transport.clone(), Arc::new(RecordingSleeper::new()));

        let outcome = orchestrator.run().await.unwrap();

        let searches: Vec<_> = transport
            .requests()
            .into_iter()
            .filter(|r| r.url.ends_with("/search"))
            .collect();
        assert_eq!(searches.len(), 2);
        assert_eq!(searches[0].query_param("q"), Some("\"x\" AND \"y\""));
        assert_eq!(searches[0].query_param("show"), Some("1"));
        assert_eq!(searches[1].query_param("show"), Some("25"));

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].title().as_deref(), Some("first"));
        assert_eq!(outcome.summary.duplicates_dropped, 1);
        assert_eq!(outcome.summary.queries.len(), 1);
        assert_eq!(outcome.summary.queries[0].terminal_reason, TerminalReason::Completed);
        assert_eq!(
            outcome.summary.publication_types,
            vec![("Book".to_string(), 1), ("Journal".to_string(), 1)]
        );

        let run = outcome.enrichment.unwrap();
        assert_eq!(run.audit.count(EnrichmentOutcome::Success), 2);

        let dir = output.path().join("results");
        let combined = read_records(&dir.join("combined_results.json")).unwrap();
        assert_eq!(combined.len(), 2);
        assert_eq!(
            std::fs::read_to_string(dir.join("doi_metadata_log.txt")).unwrap(),
            "10.1/a: SUCCESS\n10.1/b: SUCCESS\n"
        );
        let merged: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("merged_with_metadata.json")).unwrap())
                .unwrap();
        assert_eq!(merged[0]["enrichment"]["abstract"], "abstract of 10.1/a");
        assert!(dir.join("harvest_summary.json").is_file());
    }

    #[tokio::test]
    async fn test_empty_streak_widens_and_resets() {
        let output = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::routed(|request| {
            let items = if request.query_param("q") == Some("\"hit\" AND \"y\"") {
                vec![json!({"doi": "10.1/hit"})]
            } else {
                Vec::new()
            };
            Ok(RawResponse::ok(&json!({"total": items.len(), "items": items})))
        }));
        let sleeper = Arc::new(RecordingSleeper::new());
        let mut config = config(&[&["a", "b", "hit", "c"], &["y"]], &output);
        config.pacing.query_delay_ms = 100;
        let mut orchestrator = orchestrator(config, transport, sleeper.clone());

        orchestrator.harvest().await;

        assert_eq!(
            sleeper.waits(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(100),
                Duration::from_millis(100),
            ]
        );
        assert_eq!(orchestrator.empty_streak(), 1);
        let reasons: Vec<_> = orchestrator.reports().iter().map(|r| r.terminal_reason).collect();
        assert_eq!(
            reasons,
            vec![
                TerminalReason::Empty,
                TerminalReason::Empty,
                TerminalReason::Completed,
                TerminalReason::Empty
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_probe_does_not_abort_siblings() {
        let output = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::routed(|request| {
            if request.query_param("q") == Some("\"broken\" AND \"y\"") {
                return Ok(RawResponse::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable"));
            }
            Ok(RawResponse::ok(&json!({"total": 1, "items": [{"doi": "10.1/ok"}]})))
        }));
        let mut config = config(&[&["broken", "fine"], &["y"]], &output);
        config.enrichment.enabled = false;
        let orchestrator = orchestrator(config, transport, Arc::new(RecordingSleeper::new()));

        let outcome = orchestrator.run().await.unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert!(outcome.enrichment.is_none());
        assert_eq!(
            outcome.summary.terminal_reasons.get(&TerminalReason::ProbeFailed),
            Some(&1)
        );
        assert!(!output.path().join("results").join("doi_metadata_log.txt").exists());
    }

    #[tokio::test]
    async fn test_unwritable_output_aborts_before_requests() {
        let output = TempDir::new().unwrap();
        let transport = server(vec![json!({"doi": "10.1/a"})]);
        let mut config = config(&[&["x"]], &output);
        let blocker = output.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();
        config.harvest.output_dir = blocker;
        let orchestrator = orchestrator(config, transport.clone(), Arc::new(RecordingSleeper::new()));

        assert!(matches!(orchestrator.run().await, Err(HarvestError::Output { .. })));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_enrichment_from_file() {
        let output = TempDir::new().unwrap();
        let input = output.path().join("input.json");
        std::fs::write(
            &input,
            r#"[{"doi": "10.1/a"}, {"doi": "10.1/A"}, {"title": "unkeyed"}]"#,
        )
        .unwrap();
        let transport = server(Vec::new());
        let config = config(&[&["x"]], &output);
        let orchestrator = orchestrator(config, transport.clone(), Arc::new(RecordingSleeper::new()));

        let outcome = orchestrator.run_enrichment(&input).await.unwrap();

        assert_eq!(transport.request_count(), 1);
        let run = outcome.enrichment.unwrap();
        assert_eq!(run.records.len(), 1);
        assert_eq!(run.audit.render(), "10.1/a: SUCCESS\n");
    }

    #[tokio::test]
    async fn test_first_source_wins_across_sources() {
        let output = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::routed(|request| {
            let items = if request.url.starts_with("http://first.test") {
                vec![json!({"doi": "10.1/Shared", "title": "from first", "publisher": "First"})]
            } else {
                vec![
                    json!({"doi": "https://doi.org/10.1/shared", "title": "from second"}),
                    json!({"doi": "10.1/only-second", "title": "second only"}),
                ]
            };
            Ok(RawResponse::ok(&json!({"total": items.len(), "items": items})))
        }));
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(MockSource::new("http://first.test").unwrap().with_id("first")));
        registry.register(Arc::new(MockSource::new("http://second.test").unwrap().with_id("second")));
        let client = RateLimitedClient::new(
            transport,
            Arc::new(RecordingSleeper::new()),
            RetryPolicy::default().base_delay(Duration::ZERO),
        );
        let mut config = config(&[&["x"]], &output);
        config.enrichment.enabled = false;

        let outcome = HarvestOrchestrator::new(config, registry, client)
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 2);
        let shared = &outcome.records[0];
        assert_eq!(shared.str_field("doi").as_deref(), Some("10.1/Shared"));
        assert_eq!(shared.title().as_deref(), Some("from first"));
        assert_eq!(shared.str_field("publisher").as_deref(), Some("First"));
        assert_eq!(outcome.records[1].title().as_deref(), Some("second only"));
        assert_eq!(outcome.summary.duplicates_dropped, 1);

        let per_source: Vec<_> = outcome
            .summary
            .queries
            .iter()
            .map(|r| (r.source.as_str(), r.records_fetched, r.new_records))
            .collect();
        assert_eq!(per_source, vec![("first", 1, 1), ("second", 2, 1)]);
    }

    #[tokio::test]
    async fn test_harvest_without_terms_is_rejected_before_requests() {
        let output = TempDir::new().unwrap();
        let transport = server(vec![json!({"doi": "10.1/a"})]);
        let config = config(&[], &output);
        let orchestrator = orchestrator(config, transport.clone(), Arc::new(RecordingSleeper::new()));

        assert!(matches!(orchestrator.run().await, Err(HarvestError::Config(_))));
        assert_eq!(transport.request_count(), 0);
        assert!(!output.path().join("results").exists());
    }

    #[tokio::test]
    async fn test_enrichment_needs_no_terms() {
        let output = TempDir::new().unwrap();
        let input = output.path().join("input.json");
        std::fs::write(&input, r#"[{"doi": "10.1/a"}]"#).unwrap();
        let transport = server(Vec::new());
        let config = config(&[], &output);
        let orchestrator = orchestrator(config, transport.clone(), Arc::new(RecordingSleeper::new()));

        let outcome = orchestrator.run_enrichment(&input).await.unwrap();

        assert_eq!(transport.request_count(), 1);
        assert_eq!(outcome.enrichment.unwrap().audit.render(), "10.1/a: SUCCESS\n");
    }

    #[tokio::test]
    async fn test_enrichment_without_lookup_source_fails_early() {
        let output = TempDir::new().unwrap();
        let input = output.path().join("input.json");
        std::fs::write(&input, r#"[{"doi": "10.1/a"}]"#).unwrap();
        let client = RateLimitedClient::new(
            server(Vec::new()),
            Arc::new(RecordingSleeper::new()),
            RetryPolicy::default(),
        );
        let mut config = config(&[], &output);
        config.enrichment.source = Some("springer".to_string());
        let orchestrator = HarvestOrchestrator::new(config, SourceRegistry::new(), client).unwrap();

        assert!(matches!(
            orchestrator.run_enrichment(&input).await,
            Err(HarvestError::NoLookupSource)
        ));
        assert!(!output.path().join("results").exists());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let output = TempDir::new().unwrap();
        let mut config = config(&[&["x"]], &output);
        config.harvest.page_size = 0;
        let client = RateLimitedClient::new(
            server(Vec::new()),
            Arc::new(RecordingSleeper::new()),
            RetryPolicy::default(),
        );
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(MockSource::new("http://mock.test").unwrap()));

        assert!(matches!(
            HarvestOrchestrator::new(config, registry, client),
            Err(HarvestError::Config(_))
        ));
    }
}
