//! TechScout: organization technology intelligence.
//! Entry point for the `techscout` binary.

mod config;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use techscout_common::{classify_text, Entity};
use techscout_ingestion::{InMemoryStore, Orchestrator, ScoutRepository};

/// Gather patents, papers and people for an organization and profile its technology focus.
#[derive(Parser)]
#[command(name = "techscout", version, long_about = None)]
struct Cli {
    /// Path to a config file.
    #[arg(long, global = true, env = config::CONFIG_ENV)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full acquisition pipeline for one organization.
    Analyze {
        /// Organization name used as the search query.
        name: String,

        /// Organization website.
        #[arg(short, long)]
        website: Option<String>,

        /// Results requested from each source.
        #[arg(long)]
        max_results: Option<usize>,
    },
    /// Print the technology domains detected in a piece of text.
    Classify {
        text: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs on stderr, results on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("techscout=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load()?,
    };

    match cli.command {
        Command::Analyze { name, website, max_results } => {
            let mut pipeline = config.pipeline_config();
            if let Some(n) = max_results {
                pipeline.max_results = n;
            }
            info!(entity = %name, max_results = pipeline.max_results, "Analyzing");

            let store = Arc::new(InMemoryStore::new());
            let entity_id = store.add_entity(Entity::new(&name, website.as_deref()));
            let orchestrator = Orchestrator::new(ScoutRepository::new(store.clone()), pipeline);

            let outcome = orchestrator.run(entity_id).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);

            if let Some(entity) = store.entity(entity_id) {
                info!(
                    status = entity.status.as_str(),
                    patents = entity.patent_count,
                    papers = entity.paper_count,
                    personnel = entity.personnel_count,
                    "Entity updated"
                );
            }
            if !outcome.is_completed() {
                std::process::exit(1);
            }
        }
        Command::Classify { text } => {
            let domains: Vec<String> = classify_text(&text)
                .iter()
                .map(|t| format!("{t} ({})", t.category()))
                .collect();
            println!("{}", serde_json::to_string_pretty(&domains)?);
        }
    }

    Ok(())
}
