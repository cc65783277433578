use anyhow::{anyhow, Context, Result};
use catalog_core::facets::parse_filters;
use catalog_core::{EngineConfig, SearchEngine, SearchOptions, Stage};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "catalog-cli")]
#[command(about = "Search a product catalogue from the command line", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Source {
    /// Dataset path (.json, .jsonl or a directory of them)
    #[arg(long, env = "CATALOG_DATASET")]
    input: PathBuf,
    /// Optional engine configuration (JSON)
    #[arg(long, env = "CATALOG_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ranked keyword search
    Search {
        #[command(flatten)]
        source: Source,
        query: String,
        /// Run a single stage (e.g. retrieval, ranking, or a legacy name like "power")
        #[arg(long)]
        stage: Option<Stage>,
        #[arg(long, default_value_t = false)]
        diversify: bool,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Boolean search with AND, OR, NOT and parentheses
    Boolean {
        #[command(flatten)]
        source: Source,
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Facet counts, or a faceted search when a query is given
    Facets {
        #[command(flatten)]
        source: Source,
        query: Option<String>,
        /// Filter as facet=value, repeatable (e.g. --filter brand=Sony)
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
    /// "Did you mean" candidates from the index vocabulary
    Fuzzy {
        #[command(flatten)]
        source: Source,
        term: String,
        #[arg(long, default_value_t = 5)]
        max: usize,
    },
    /// Index statistics, cache state and search performance
    Stats {
        #[command(flatten)]
        source: Source,
        /// Queries to run first so the performance report has data
        #[arg(long = "query", short = 'q')]
        queries: Vec<String>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Search { source, query, stage, diversify, limit } => {
            let engine = open(&source)?;
            let mut results = engine.search_with_options(&query, SearchOptions { stage, diversify })?;
            results.truncate(limit);
            print_json(&results)
        }
        Commands::Boolean { source, query, limit } => {
            let engine = open(&source)?;
            let mut results = engine.search_boolean(&query)?;
            results.truncate(limit);
            print_json(&results)
        }
        Commands::Facets { source, query, filters } => {
            let engine = open(&source)?;
            match query {
                Some(q) => {
                    let filters = parse_filters(split_filters(&filters)?)?;
                    print_json(&engine.search_with_facets(&q, &filters, None)?)
                }
                None => print_json(engine.get_facets()),
            }
        }
        Commands::Fuzzy { source, term, max } => {
            let engine = open(&source)?;
            print_json(&engine.suggest_terms(&term, max))
        }
        Commands::Stats { source, queries } => {
            let engine = open(&source)?;
            for query in &queries {
                engine.search(query, None)?;
            }
            print_json(&serde_json::json!({
                "documents": engine.store().len(),
                "index": engine.index_statistics(),
                "caches": engine.cache_stats(),
                "performance": engine.performance_report(),
            }))
        }
    }
}

fn open(source: &Source) -> Result<SearchEngine> {
    let config = match &source.config {
        Some(path) => EngineConfig::from_json_file(path).with_context(|| format!("reading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let engine = SearchEngine::load(&source.input, config)
        .with_context(|| format!("loading dataset {}", source.input.display()))?;
    tracing::info!(num_docs = engine.store().len(), "dataset loaded");
    Ok(engine)
}

/// Groups `facet=value` pairs by facet name, keeping value order.
fn split_filters(raw: &[String]) -> Result<BTreeMap<String, Vec<String>>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in raw {
        let (name, value) = item.split_once('=').ok_or_else(|| anyhow!("filter must be facet=value: {item}"))?;
        grouped.entry(name.trim().to_string()).or_default().push(value.trim().to_string());
    }
    Ok(grouped)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
