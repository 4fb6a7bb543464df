//! 🚀 mrq: the front door, the ticket booth, the usher with the flashlight.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Thin CLI wrapper: set up logging, parse args, load config, then let the
//! library do the heavy lifting. Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// 🔧 The ol' reliable. Used when `--config` is absent and the file happens to exist.
const DEFAULT_CONFIG_FILE: &str = "mrq.toml";

#[derive(Parser)]
#[command(name = "mrq")]
#[command(about = "Load a movie catalogue into a search index, then ask it something")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file path (default: ./mrq.toml if present, otherwise MRQ_* env vars only)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Recreate the index and load every movie from the dataset
    Index,
    /// Run the phrase-prefix smoke query and print each matching document
    Search {
        /// Phrase to search for (default: [query] phrase from the config)
        phrase: Option<String>,
    },
}

/// 🔒 Pick the config file. An explicit path must exist; the default one may not.
fn resolve_config_file(explicit: Option<PathBuf>) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) => {
            let exists = path.try_exists().with_context(|| {
                format!("💀 Couldn't check whether '{}' exists", path.display())
            })?;
            anyhow::ensure!(
                exists,
                "💀 Configuration file '{}' doesn't exist. If it's a relative path, check your cwd, \
                 or use an absolute path to be absolutely certain.",
                path.display()
            );
            Ok(Some(path))
        }
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            Ok(default.is_file().then_some(default))
        }
    }
}

/// 🛑 Ctrl-C flips the token; the pipeline notices before its next batch.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl-C received, finishing the batch in flight and stopping");
            trigger.cancel();
        }
    });
    cancel
}

/// 🧅 Peel the error chain, one layer at a time, and hint at the usual culprit.
fn report_error(err: &anyhow::Error) {
    error!("💀 error: {}", err);
    let mut the_vibes_are_giving_connection_issues = false;
    for cause in err.chain().skip(1) {
        error!("⚠️  cause: {}", cause);
        let cause_str = cause.to_string();
        if cause_str.contains("error sending request")
            || cause_str.contains("onnection refused")
            || cause_str.contains("tcp connect error")
            || cause_str.contains("dns error")
        {
            the_vibes_are_giving_connection_issues = true;
        }
    }
    if the_vibes_are_giving_connection_issues {
        error!(
            "🔧 hint: looks like the store isn't reachable. Check that Elasticsearch is running \
             and that [store.Elasticsearch] url points at it. With Docker, `docker ps` is a good start."
        );
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let config_file = resolve_config_file(cli.config)?;
    let app_config = mrq::app_config::load_config(config_file.as_deref())
        .context("💀 Couldn't load the configuration. Check the TOML file and the MRQ_* env vars.")?;

    match cli.command {
        Command::Index => {
            let report = mrq::run_ingest(app_config, cancel_on_ctrl_c()).await?;
            println!("{}", report.render_table());
            println!("{}", report.summary_line());
            Ok(report.succeeded())
        }
        Command::Search { phrase } => {
            let sources = mrq::run_search(app_config, phrase).await?;
            if sources.is_empty() {
                println!("🤷 No matches.");
            }
            for source in sources {
                println!("{}", serde_json::to_string_pretty(&source)?);
            }
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() {
    // 📡 RUST_LOG wins; otherwise info, because a silent loader is a scary loader
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            report_error(&err);
            std::process::exit(1);
        }
    }
}
