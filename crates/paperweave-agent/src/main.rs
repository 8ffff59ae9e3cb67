//! PaperWeave: research-paper knowledge graph maintenance.
//! Entry point for the `paperweave` binary.

mod commands;
mod config;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "paperweave", version, about = "Keep the paper graph in sync with arXiv and OpenAlex")]
struct Cli {
    /// Config file (defaults to $PAPERWEAVE_CONFIG, then ./paperweave.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one incremental sync now.
    Sync {
        /// Upper bound of the harvest window (RFC 3339).
        #[arg(long)]
        until: Option<DateTime<Utc>>,
    },
    /// Run the daily sync scheduler until Ctrl-C.
    Daemon,
    /// Match the works snapshot against stored papers.
    Match {
        /// Process every file with per-file checkpoints instead of a sample.
        #[arg(long)]
        full: bool,
    },
    /// Build CITES edges between matched papers.
    Cite {
        /// Ignore the stored cursor.
        #[arg(long)]
        from_start: bool,
    },
    /// Summarise the works snapshot on disk.
    Analyze,
    /// Check storage and the OAI-PMH endpoint.
    Ping,
    /// Print the resolved checkpoint for a namespace.
    Checkpoint {
        #[arg(long)]
        namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("paperweave=debug,info")),
        )
        .init();

    let cli = Cli::parse();
    info!("📄 PaperWeave {}", env!("CARGO_PKG_VERSION"));

    let config = config::Config::load(cli.config.as_deref())?;
    let app = commands::App::connect(config).await?;

    match cli.command {
        Command::Sync { until } => app.sync(until).await,
        Command::Daemon => app.daemon().await,
        Command::Match { full } => app.bulk_match(full).await,
        Command::Cite { from_start } => app.cite(from_start).await,
        Command::Analyze => app.analyze().await,
        Command::Ping => app.ping().await,
        Command::Checkpoint { namespace } => app.checkpoint(namespace).await,
    }
}
