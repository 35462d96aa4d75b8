//! Registry for the configured publisher sources.

use std::sync::Arc;

use super::{ScienceDirectSource, Source, SourceError, SpringerSource};
use crate::config::{Config, ConfigError, SourceConfig};

bitflags::bitflags! {
    /// Capabilities that a source can support
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SourceCapabilities: u32 {
        const SEARCH = 1 << 0;
        const DOI_LOOKUP = 1 << 1;
    }
}

/// Ordered collection of sources for one run
///
/// Order is significant: sources are harvested in registration order, so an
/// earlier source wins when two of them return the same natural key.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn Source>>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every source listed in the configuration, in order
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for source in &config.sources {
            registry.register(build_source(source)?);
        }

        if config.enrichment.enabled {
            if let Some(id) = &config.enrichment.source {
                let source = registry.get(id).ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "enrichment source '{}' is not listed under [[sources]]",
                        id
                    ))
                })?;
                if !source.supports_doi_lookup() {
                    return Err(ConfigError::Invalid(format!(
                        "enrichment source '{}' does not support DOI lookup",
                        id
                    )));
                }
            }
        }

        Ok(registry)
    }

    /// Register a new source; a source with the same id is replaced in place
    pub fn register(&mut self, source: Arc<dyn Source>) {
        match self.sources.iter().position(|s| s.id() == source.id()) {
            Some(i) => self.sources[i] = source,
            None => self.sources.push(source),
        }
    }

    /// Get a source by ID
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.sources.iter().find(|s| s.id() == id)
    }

    /// Get sources that support a specific capability
    pub fn with_capability(
        &self,
        capability: SourceCapabilities,
    ) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources
            .iter()
            .filter(move |s| s.capabilities().contains(capability))
    }

    /// Get sources that support search
    pub fn searchable(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.with_capability(SourceCapabilities::SEARCH)
    }

    /// Source used for enrichment: the named one, else the first that can
    /// look up a single DOI
    pub fn lookup_source(&self, preferred: Option<&str>) -> Option<&Arc<dyn Source>> {
        match preferred {
            Some(id) => self.get(id).filter(|s| s.supports_doi_lookup()),
            None => self
                .with_capability(SourceCapabilities::DOI_LOOKUP)
                .next(),
        }
    }

}

fn build_source(config: &SourceConfig) -> Result<Arc<dyn Source>, ConfigError> {
    let invalid = |e: SourceError| ConfigError::Invalid(format!("source '{}': {}", config.id, e));

    match config.id.as_str() {
        "sciencedirect" => {
            let mut source = ScienceDirectSource::new(config.resolve_api_key()?);
            if config.search_url.is_some() || config.lookup_url.is_some() {
                source = source
                    .with_endpoints(config.search_url.as_deref(), config.lookup_url.as_deref())
                    .map_err(invalid)?;
            }
            Ok(Arc::new(source))
        }
        "springer" => {
            let mut source = SpringerSource::new(config.resolve_api_key()?)
                .with_endpoints(config.search_url.as_deref(), config.lookup_url.as_deref())
                .map_err(invalid)?;
            if let Some(date) = &config.date_from {
                source = source.with_date_from(date.clone());
            }
            Ok(Arc::new(source))
        }
        other => Err(ConfigError::UnknownSource(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NaturalKey, Query};
    use crate::sources::MockSource;

    fn keyed(id: &str) -> SourceConfig {
        let mut source = SourceConfig::new(id);
        source.api_key = Some(format!("{}-key", id));
        source
    }

    #[test]
    fn test_registry_keeps_config_order() {
        let mut config = Config::starter();
        config.sources = vec![keyed("springer"), keyed("sciencedirect")];

        let registry = SourceRegistry::from_config(&config).unwrap();
        let ids: Vec<_> = registry.searchable().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["springer", "sciencedirect"]);
        assert!(registry.get("arxiv").is_none());
    }

    #[test]
    fn test_springer_lookup_url_is_honoured() {
        let mut config = Config::starter();
        let mut source = keyed("springer");
        source.search_url = Some("http://search.test/meta/v2/json".to_string());
        source.lookup_url = Some("http://lookup.test/meta/v2/json".to_string());
        config.sources = vec![source];

        let registry = SourceRegistry::from_config(&config).unwrap();
        let springer = registry.get("springer").unwrap();
        let key = NaturalKey::new("10.1007/a").unwrap();
        assert_eq!(
            springer.lookup_request(&key).unwrap().url,
            "http://lookup.test/meta/v2/json"
        );
        assert_eq!(
            springer.search_request(&Query::conjunction(&["x"]), 0, 1).url,
            "http://search.test/meta/v2/json"
        );
    }

    #[test]
    fn test_lookup_source_defaults_to_first_capable() {
        let mut config = Config::starter();
        config.sources = vec![keyed("springer"), keyed("sciencedirect")];
        let registry = SourceRegistry::from_config(&config).unwrap();

        assert_eq!(registry.lookup_source(None).unwrap().id(), "springer");
        assert_eq!(
            registry.lookup_source(Some("sciencedirect")).unwrap().id(),
            "sciencedirect"
        );
        assert!(registry.lookup_source(Some("missing")).is_none());
    }

    #[test]
    fn test_unlisted_enrichment_source_is_rejected() {
        let mut config = Config::starter();
        config.sources = vec![keyed("springer")];
        config.enrichment.source = Some("sciencedirect".to_string());

        assert!(matches!(
            SourceRegistry::from_config(&config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let mut config = Config::starter();
        let mut source = keyed("sciencedirect");
        source.search_url = Some("not a url".to_string());
        config.sources = vec![source];

        assert!(SourceRegistry::from_config(&config).is_err());
    }

    #[test]
    fn test_register_replaces_same_id() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(MockSource::new("http://a.test").unwrap()));
        registry.register(Arc::new(MockSource::new("http://b.test").unwrap()));

        assert_eq!(registry.searchable().count(), 1);
        let lookup = registry.lookup_source(None).unwrap();
        let key = NaturalKey::new("10.1/a").unwrap();
        assert!(lookup.lookup_request(&key).unwrap().url.starts_with("http://b.test"));
    }
}
