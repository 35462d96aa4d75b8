//! Configuration file support for research-harvester.
//!
//! This module provides TOML configuration file loading with support
//! for environment variable overrides.
//!
//! # Configuration File Format
//!
//! ```toml
//! [harvest]
//! page_size = 25
//! max_results_per_query = 500
//! output_dir = "results"
//!
//! [pacing]
//! page_delay_ms = 700
//! query_delay_ms = 700
//! lookup_delay_ms = 800
//!
//! [[terms.groups]]
//! name = "topic"
//! terms = ["responsible AI", "ethical AI"]
//!
//! [[terms.groups]]
//! name = "domain"
//! terms = ["manufacturing"]
//!
//! [[sources]]
//! id = "sciencedirect"
//!
//! [[sources]]
//! id = "springer"
//! date_from = "2016"
//! ```
//!
//! Any value can be overridden from the environment, e.g.
//! `RESEARCH_HARVESTER_HARVEST__PAGE_SIZE=50`.

use std::path::{Path, PathBuf};

use super::{Config, ConfigError};

/// File name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "research-harvester.toml";

const ENV_PREFIX: &str = "RESEARCH_HARVESTER";

/// Load configuration from a file, overlaid with environment variables
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// First existing configuration file among the default locations
pub fn find_config_file() -> Option<PathBuf> {
    default_locations().into_iter().find(|p| p.is_file())
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join("research-harvester").join("config.toml"));
    }
    locations
}

/// Save configuration to a TOML file, creating parent directories
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
