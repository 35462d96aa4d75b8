use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use research_harvester::config::{
    find_config_file, load_config, save_config, Config, LogFormat, CONFIG_FILE_NAME,
};
use research_harvester::harvest::{read_records, HarvestOrchestrator, HarvestOutcome};
use research_harvester::normalize::{normalize, write_csv, RecordFilter};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Research Harvester - Collect and deduplicate publication metadata from publisher APIs
#[derive(Parser, Debug)]
#[command(name = "research-harvester")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "hongkongkiwi")]
#[command(about = "Harvest, deduplicate and enrich publication metadata from publisher APIs", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search every configured source, deduplicate and enrich (default)
    Harvest {
        /// Directory for result files
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Skip the per-DOI metadata lookup
        #[arg(long)]
        no_enrich: bool,

        /// Safety cap on results fetched per query
        #[arg(long)]
        max_results_per_query: Option<usize>,
    },

    /// Look up metadata for every DOI in a previously harvested result file
    Enrich {
        /// Result file written by `harvest`
        #[arg(long, short)]
        input: PathBuf,

        /// Directory for result files
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Filter a result file and export it as CSV
    Normalize {
        /// JSON array of records
        #[arg(long, short)]
        input: PathBuf,

        /// CSV file to write
        #[arg(long, short)]
        output: PathBuf,

        /// Keep only records in this language (empty string disables the check)
        #[arg(long)]
        language: Option<String>,

        /// Keep only records published in or after this year
        #[arg(long)]
        from_year: Option<i32>,
    },

    /// Write a starter configuration file
    Init {
        /// Where to write the file
        #[arg(long, default_value = CONFIG_FILE_NAME)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

const NO_CONFIG: &str =
    "No configuration found; run `research-harvester init` or pass --config <file>";

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    let command = cli.command.take().unwrap_or(Commands::Harvest {
        output_dir: None,
        no_enrich: false,
        max_results_per_query: None,
    });

    match command {
        Commands::Harvest {
            output_dir,
            no_enrich,
            max_results_per_query,
        } => {
            let mut config = required_config(cli.config.as_deref())?;
            init_tracing(&cli, Some(&config));
            if let Some(dir) = output_dir {
                config.harvest.output_dir = dir;
            }
            if no_enrich {
                config.enrichment.enabled = false;
            }
            if let Some(cap) = max_results_per_query {
                config.harvest.max_results_per_query = cap;
            }

            let outcome = HarvestOrchestrator::from_config(config)
                .context("Invalid configuration")?
                .run()
                .await?;
            print_outcome(&outcome, cli.quiet);
        }

        Commands::Enrich { input, output_dir } => {
            let mut config = required_config(cli.config.as_deref())?;
            init_tracing(&cli, Some(&config));
            if let Some(dir) = output_dir {
                config.harvest.output_dir = dir;
            }
            config.enrichment.enabled = true;

            let outcome = HarvestOrchestrator::from_config(config)
                .context("Invalid configuration")?
                .run_enrichment(&input)
                .await?;
            print_outcome(&outcome, cli.quiet);
        }

        Commands::Normalize {
            input,
            output,
            language,
            from_year,
        } => {
            // Filter settings are optional here; only an explicit --config must load
            let (config, load_error) = match resolve_config(cli.config.as_deref()) {
                Ok(config) => (config, None),
                Err(e) if cli.config.is_none() => (None, Some(e)),
                Err(e) => return Err(e),
            };
            init_tracing(&cli, config.as_ref());
            if let Some(e) = load_error {
                tracing::warn!("Ignoring unreadable configuration, using default filters: {:#}", e);
            }

            let settings = config.map(|c| c.normalize).unwrap_or_default();
            let mut filter = RecordFilter::new(&settings);
            if language.is_some() {
                filter = filter.language(language);
            }
            if from_year.is_some() {
                filter = filter.from_year(from_year);
            }

            let records = read_records(&input)?;
            let report = normalize(&records, &filter);
            write_csv(&output, &report.rows)?;

            if !cli.quiet {
                println!("Content types before filtering:");
                for (content_type, count) in &report.types_before {
                    println!(
                        "  {}: {} records ({:.1}%)",
                        content_type,
                        count,
                        percent(*count, report.input_records)
                    );
                }
                println!(
                    "Filtered from {} to {} records ({} removed)",
                    report.input_records,
                    report.rows.len(),
                    report.removed()
                );
                println!("Results saved to {}", output.display());
            }
        }

        Commands::Init { path, force } => {
            init_tracing(&cli, None);
            write_starter(&path, force)?;
            println!("Wrote starter configuration to {}", path.display());
            println!("Set ELSEVIER_API_KEY (and SPRINGER_API_KEY if you enable Springer) before harvesting.");
        }
    }

    Ok(())
}

/// Explicit `--config`, else the first file found in the default locations
fn resolve_config(explicit: Option<&Path>) -> Result<Option<Config>> {
    if let Some(path) = explicit {
        let config = load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?;
        return Ok(Some(config));
    }
    match find_config_file() {
        Some(path) => {
            let config = load_config(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            Ok(Some(config))
        }
        None => Ok(None),
    }
}

fn required_config(explicit: Option<&Path>) -> Result<Config> {
    resolve_config(explicit)?.context(NO_CONFIG)
}

/// Write the starter file without reading whatever is already there
fn write_starter(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    save_config(&Config::starter(), path)
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn init_tracing(cli: &Cli, config: Option<&Config>) {
    let configured = config
        .map(|c| c.logging.level.as_str())
        .unwrap_or("info");
    let log_level = match cli.verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    };
    let level = if cli.quiet { "error" } else { log_level };

    let filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| {
        format!("research_harvester={level},audit={level}")
    }));

    let json = config.is_some_and(|c| c.logging.format == LogFormat::Json);

    tracing_subscriber::registry()
        .with(filter)
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_target(false)))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .init();
}

fn print_outcome(outcome: &HarvestOutcome, quiet: bool) {
    if quiet {
        return;
    }
    let summary = &outcome.summary;
    println!();
    println!("Finished. Total unique results: {}", summary.unique_records);
    println!(
        "  queries: {}, duplicates dropped: {}, records without DOI: {}",
        summary.queries.len(),
        summary.duplicates_dropped,
        summary.unkeyed_records
    );
    for (reason, count) in &summary.terminal_reasons {
        println!("  {}: {}", reason, count);
    }
    if !summary.publication_types.is_empty() {
        println!("Publication types:");
        for (publication_type, count) in &summary.publication_types {
            println!(
                "  {}: {} ({:.1}%)",
                publication_type,
                count,
                percent(*count, summary.unique_records)
            );
        }
    }
    if let Some(counts) = &summary.enrichment {
        println!(
            "Enrichment: {} success, {} without metadata, {} failed",
            counts.success, counts.no_metadata, counts.failed
        );
    }
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}
