//! Binary entry point for topicgraph.
//!
//! Provides the CLI for running clustering passes and inspecting the
//! resulting topic graph.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr/print_stdout in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use topicgraph::cli::{HistoryCommand, RunCommand, StatusCommand};
use topicgraph::llm::{LlmHttpConfig, LlmProvider, OllamaClient};
use topicgraph::TopicgraphConfig;
use tracing_subscriber::EnvFilter;

/// Topicgraph - density-based topic clustering with evolution tracking.
#[derive(Parser)]
#[command(name = "topicgraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "TOPICGRAPH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Execute one clustering run for a partition.
    Run {
        /// Partition to cluster.
        #[arg(short, long, default_value = "default")]
        partition: String,

        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,

        /// Skip the text-generation provider and use fallback labels only.
        #[arg(long)]
        no_llm: bool,
    },

    /// Show store statistics and active clusters.
    Status {
        /// Partition to inspect.
        #[arg(short, long, default_value = "default")]
        partition: String,
    },

    /// List recent runs for a partition.
    History {
        /// Partition to inspect.
        #[arg(short, long, default_value = "default")]
        partition: String,

        /// Maximum runs to list.
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the text-generation provider named in the configuration.
fn build_provider(config: &TopicgraphConfig) -> Option<Arc<dyn LlmProvider>> {
    let provider = config.llm.provider.as_deref()?;
    match provider {
        "ollama" => {
            let mut client =
                OllamaClient::new().with_http_config(LlmHttpConfig::from_labeling(&config.labeling));
            if let Some(base_url) = &config.llm.base_url {
                client = client.with_endpoint(base_url.clone());
            }
            if let Some(model) = &config.llm.model {
                client = client.with_model(model.clone());
            }
            Some(Arc::new(client))
        },
        other => {
            tracing::warn!(provider = other, "unknown text-generation provider, labels will use the fallback");
            None
        },
    }
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.config.as_deref().map_or_else(
        TopicgraphConfig::load_default,
        |path| match TopicgraphConfig::load_from_file(path) {
            Ok(config) => config.with_env_overrides(),
            Err(e) => {
                eprintln!("failed to load config: {e}");
                std::process::exit(2);
            },
        },
    );

    let result = match cli.command {
        Commands::Run {
            partition,
            json,
            no_llm,
        } => {
            let provider = if no_llm { None } else { build_provider(&config) };
            RunCommand::new(partition, json).execute(&config, provider)
        },
        Commands::Status { partition } => StatusCommand::new(partition).execute(&config),
        Commands::History { partition, limit } => {
            HistoryCommand::new(partition, limit).execute(&config)
        },
    };

    match result {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        },
    }
}
