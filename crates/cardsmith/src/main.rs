//! cardsmith - turn PDF and DOCX documents into study flashcards
//!
//! Main entry point for the cardsmith CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{extract, start};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// cardsmith - turn PDF and DOCX documents into study flashcards
#[derive(Parser)]
#[command(name = "cardsmith")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Start(start::StartArgs),

    /// Generate flashcards from a local file
    Extract(extract::ExtractArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

const CRATES: [&str; 8] = [
    "cardsmith",
    "cardsmith_config",
    "cardsmith_domain",
    "cardsmith_extract",
    "cardsmith_llm",
    "cardsmith_server",
    "cardsmith_session",
    "tower_http",
];

/// Build an `EnvFilter` directive setting every cardsmith crate to `level`.
fn crate_filter(level: &str, fallback: &str) -> String {
    let mut directives: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
    directives.push(fallback.to_string());
    directives.join(",")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file. RUST_LOG wins on the console.
    let console_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            crate_filter("debug", "info")
        } else {
            crate_filter("info", "warn")
        }
    });

    let log_dir = cardsmith_config::user_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "cardsmith.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(console_filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(crate_filter(
                    "trace", "info",
                ))),
        )
        .init();

    let ctx = commands::Context {
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Start(args) => start::run(args, &ctx).await,
        Commands::Extract(args) => extract::run(args, &ctx).await,
    }
}
