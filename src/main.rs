//! # QA Harness CLI (`qa`)
//!
//! ## Usage
//!
//! ```bash
//! qa --config ./config/qa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `qa serve` | Start the HTTP API |
//! | `qa ingest --session <id> <files..>` | Ingest files into a session |
//! | `qa test-cases --session <id> "<query>"` | Generate test cases |
//! | `qa script --session <id> '<test-case-json>'` | Generate a Selenium script |
//! | `qa teardown --session <id>` | Drop a session's collection and assets |
//!
//! Results are printed as pretty JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use qa_harness::config::{load_config, Config};
use qa_harness::ingest::SourceFile;
use qa_harness::service::QaService;
use qa_harness::{logging, server};

/// QA Harness: session-scoped RAG for test-case and Selenium script generation.
#[derive(Parser)]
#[command(name = "qa", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults are used if it does not exist.
    #[arg(long, global = true, default_value = "./config/qa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve,

    /// Ingest files into a session.
    Ingest {
        #[arg(long)]
        session: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Generate test cases from a session's documents.
    TestCases {
        #[arg(long)]
        session: String,
        query: String,
    },

    /// Generate a Selenium script for one test case (JSON object).
    Script {
        #[arg(long)]
        session: String,
        test_case: String,
    },

    /// Drop a session's vectors and delete its assets.
    Teardown {
        #[arg(long)]
        session: String,
    },
}

fn read_config(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = read_config(&cli.config)?;
    logging::init(&config.logging);

    if !cli.config.exists() {
        tracing::warn!(path = %cli.config.display(), "config file not found, using defaults");
    }

    match cli.command {
        Commands::Serve => server::run_server(&config).await?,
        Commands::Ingest { session, files } => {
            let service = QaService::from_config(&config).await?;
            let mut sources = Vec::with_capacity(files.len());
            for path in &files {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                sources.push(SourceFile::new(filename, bytes));
            }
            print_json(&service.ingest_batch(sources, &session).await?)?;
        }
        Commands::TestCases { session, query } => {
            let service = QaService::from_config(&config).await?;
            print_json(&service.generate_test_cases(&query, &session).await?)?;
        }
        Commands::Script { session, test_case } => {
            let test_case: serde_json::Value =
                serde_json::from_str(&test_case).context("test case must be a JSON object")?;
            let service = QaService::from_config(&config).await?;
            print_json(&service.generate_script(&test_case, &session).await?)?;
        }
        Commands::Teardown { session } => {
            let service = QaService::from_config(&config).await?;
            let outcome = service.teardown(&session).await?;
            print_json(&serde_json::json!({
                "status": "success",
                "message": format!("Session {} cleaned up", session),
                "collection_existed": outcome.collection_existed,
                "assets_existed": outcome.assets_existed,
            }))?;
        }
    }

    Ok(())
}
