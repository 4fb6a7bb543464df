//! 🎬 mrq (Marquee). A movie catalogue goes in one end, a searchable index comes out the other.
//!
//! ```text
//!   movie.csv ──▶ dataset ──▶ records ──▶ pipeline (planner + payload) ──▶ backends ──▶ stats
//!                                                                            │
//!                                                          query ◀───────────┘
//! ```
//!
//! Two entry points for the CLI: [`run_ingest`] does a full reload, [`run_search`]
//! asks the smoke query. Everything else is public so tests and benches can poke at it.

pub mod app_config;
pub mod backends;
pub mod common;
pub mod dataset;
pub mod payload;
pub mod pipeline;
pub mod planner;
pub(crate) mod progress;
pub mod query;
pub mod records;
pub mod stats;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::app_config::AppConfig;
use crate::backends::StoreBackend;
use crate::pipeline::IngestPipeline;
use crate::records::ParserOptions;
use crate::stats::RunReport;

/// 🚀 Full reload: read the CSV, parse every row, recreate the index, push every batch.
///
/// The CSV and all its records are fully loaded before the store is touched, so a
/// broken dataset never costs you your existing index.
pub async fn run_ingest(config: AppConfig, cancel: CancellationToken) -> Result<RunReport> {
    let rows = dataset::read_rows(&config.dataset.path)?;
    let movies = records::parse_rows(&rows, &ParserOptions::from(&config.dataset))
        .context("💀 The dataset did not parse. The index was left untouched.")?;
    drop(rows);

    let mut store = StoreBackend::from_config(&config.store)?;
    match &config.store {
        backends::StoreConfig::Elasticsearch(es) => info!("📡 Store: Elasticsearch at {}", es.url),
        backends::StoreConfig::InMemory(_) => info!("📡 Store: in-memory (nothing survives the process)"),
    }
    IngestPipeline::new(config.ingest, cancel)
        .with_progress(true)
        .run(&mut store, &movies)
        .await
}

/// 🔍 The smoke query against the configured index. `phrase` overrides `[query] phrase`.
pub async fn run_search(config: AppConfig, phrase: Option<String>) -> Result<Vec<Value>> {
    let mut store = StoreBackend::from_config(&config.store)?;
    query::run_smoke_query(
        &mut store,
        &config.ingest.index,
        &config.query,
        phrase.as_deref(),
    )
    .await
}
