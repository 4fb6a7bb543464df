//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where forty-five thousand movies needed a home..."
//! 🎬 "One loop dared to batch them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 🚚 The ingestion pipeline, the part of this crate with an actual job.
//!
//! ```text
//!   Vec<Movie> ──▶ BulkPayload.append ──▶ boundary? ──▶ store.bulk ──▶ BatchTally ──▶ RunStats
//!                      ▲                                                      │
//!                      └──────────────────── payload.clear() ◀────────────────┘
//! ```
//!
//! 🧠 Knowledge graph:
//! - Strictly sequential: batch N+1 is encoded only after batch N is reconciled.
//! - Full reload: the index is deleted (if present) and created before any document moves.
//!   Either step failing ends the run before a single bulk request.
//! - Transport failure = fatal (after retries). Store fault = counted, logged, keep going.
//! - Retry is off by default (`max_retries = 0`). Turning it on retries transport errors and
//!   429/5xx faults with exponential back-off. Batches are keyed by `_id`, so a retry that
//!   re-sends documents the store already took just overwrites them.
//! - Cancellation is checked before every submission and interrupts back-off sleeps.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backends::{BulkOutcome, DocumentStore, IndexDeletion};
use crate::common::Movie;
use crate::payload::BulkPayload;
pub use crate::payload::EncodePolicy;
use crate::planner::{BatchBoundary, BatchPlan};
use crate::progress::BatchProgress;
use crate::stats::{BatchTally, RunReport, RunStats};

/// 🎯 How store faults are charged to documents.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ErrorAttribution {
    /// A rejected request charges every document in it. A 2xx charges nobody.
    #[default]
    Batch,
    /// Like `Batch`, plus 2xx responses with `"errors": true` charge exactly the
    /// items that carry an `error` entry.
    Item,
}

/// 🚚 The loading dock rules.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    /// 📡 Destination index. Deleted and recreated on every full reload.
    pub index: String,
    /// 📦 Documents per bulk request.
    pub batch_size: usize,
    pub encode_policy: EncodePolicy,
    pub error_attribution: ErrorAttribution,
    /// 🔄 Extra attempts per batch after the first. 0 = no retry at all.
    pub max_retries: u32,
    /// ⏱️ First back-off; doubles on every further attempt.
    pub retry_backoff_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            index: "movies".to_string(),
            batch_size: 255,
            encode_policy: EncodePolicy::Abort,
            error_attribution: ErrorAttribution::Batch,
            max_retries: 0,
            retry_backoff_ms: 500,
        }
    }
}

/// ⏱️ `base * 2^(attempt - 1)`, capped so the shift can't overflow.
pub fn backoff_duration(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

/// 🚚 One full reload: recreate the index, stream every movie through the batches, report.
#[derive(Debug)]
pub struct IngestPipeline {
    config: IngestConfig,
    cancel: CancellationToken,
    show_progress: bool,
}

impl IngestPipeline {
    pub fn new(config: IngestConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            show_progress: false,
        }
    }

    /// 📊 Draw a terminal progress bar while running.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// 🗑️🏗️ Delete-if-present, then create. Both failures are fatal.
    pub async fn recreate_index<S: DocumentStore>(&self, store: &mut S) -> Result<()> {
        let index = &self.config.index;
        match store
            .delete_index(index)
            .await
            .with_context(|| format!("💀 Cannot delete index '{index}'. Refusing to load into an index we couldn't clear."))?
        {
            IndexDeletion::Deleted => info!("🗑️ Deleted existing index '{}'", index),
            IndexDeletion::NotFound => info!("🗑️ Index '{}' did not exist yet", index),
        }
        store
            .create_index(index)
            .await
            .with_context(|| format!("💀 Cannot create index '{index}'. No index, no movies."))?;
        info!("🏗️ Created index '{}'", index);
        Ok(())
    }

    /// 🚀 Run the whole thing. Returns a report even when batches failed; returns `Err`
    /// only for fatal conditions (index lifecycle, transport, encode under `abort`).
    pub async fn run<S: DocumentStore>(&self, store: &mut S, movies: &[Movie]) -> Result<RunReport> {
        self.recreate_index(store).await?;

        let plan = BatchPlan::new(movies.len(), self.config.batch_size)?;
        info!(
            "🚚 Indexing {} movies into '{}' in {} batches of up to {}",
            plan.total(),
            self.config.index,
            plan.total_batches(),
            plan.batch_size()
        );

        let progress = if self.show_progress {
            BatchProgress::new(plan.total_batches())
        } else {
            BatchProgress::hidden()
        };
        let mut payload = BulkPayload::new();
        let mut stats = RunStats::start();
        let mut cancelled = false;

        for (index, movie) in movies.iter().enumerate() {
            let appended = payload
                .append(movie, self.config.encode_policy)
                .with_context(|| format!("💀 Cannot encode movie {}, aborting the run", movie.id))?;
            if !appended {
                warn!("🧯 Movie {} could not be encoded and was skipped", movie.id);
                stats.add_errors(1);
            }

            let Some(boundary) = plan.boundary(index) else {
                continue;
            };
            if self.cancel.is_cancelled() {
                warn!(
                    "🛑 Cancelled before batch [{}/{}]; {} batches were already submitted",
                    boundary.ordinal,
                    boundary.total_batches,
                    boundary.ordinal - 1
                );
                cancelled = true;
                break;
            }
            if payload.is_empty() {
                debug!("📭 Batch {} has nothing left to send", boundary.ordinal);
                continue;
            }

            progress.mark(&boundary, payload.items());
            let tally = self.submit(store, &payload, &boundary).await?;
            stats.absorb(tally);
            payload.clear();
        }

        progress.finish();
        let report = stats.finish(cancelled);
        if report.succeeded() {
            info!("{}", report.summary_line());
        } else {
            warn!("{}", report.summary_line());
        }
        Ok(report)
    }

    /// 📡 Send one batch, with optional retries, and turn the answer into a tally.
    async fn submit<S: DocumentStore>(
        &self,
        store: &mut S,
        payload: &BulkPayload,
        boundary: &BatchBoundary,
    ) -> Result<BatchTally> {
        let attempted = payload.items() as u64;
        let failed_batch = BatchTally {
            indexed: 0,
            errors: attempted,
        };
        let mut attempt = 0u32;

        loop {
            let retries_left = attempt < self.config.max_retries && !self.cancel.is_cancelled();
            match store.bulk(&self.config.index, payload.as_bytes()).await {
                Ok(BulkOutcome {
                    fault: None,
                    failed_items,
                }) => return Ok(self.tally_accepted(attempted, failed_items, boundary)),
                Ok(BulkOutcome {
                    fault: Some(fault), ..
                }) => {
                    if !(retries_left && fault.is_retryable()) {
                        warn!("💀 Batch {} error: {}", boundary.ordinal, fault);
                        return Ok(failed_batch);
                    }
                    warn!(
                        "🔄 Batch {} error: {} (attempt {}/{}, retrying)",
                        boundary.ordinal,
                        fault,
                        attempt + 1,
                        self.config.max_retries + 1
                    );
                }
                Err(err) => {
                    if !retries_left {
                        return Err(err).with_context(|| {
                            format!(
                                "💀 Failure indexing batch [{}/{}]",
                                boundary.ordinal, boundary.total_batches
                            )
                        });
                    }
                    warn!(
                        "🔄 Batch {} transport failure: {:#} (attempt {}/{}, retrying)",
                        boundary.ordinal,
                        err,
                        attempt + 1,
                        self.config.max_retries + 1
                    );
                }
            }

            attempt += 1;
            let delay = backoff_duration(self.config.retry_backoff_ms, attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => {
                    warn!(
                        "🛑 Cancelled while waiting to retry batch {}; its {} documents count as errors",
                        boundary.ordinal, attempted
                    );
                    return Ok(failed_batch);
                }
            }
        }
    }

    fn tally_accepted(
        &self,
        attempted: u64,
        failed_items: usize,
        boundary: &BatchBoundary,
    ) -> BatchTally {
        let failed_items = (failed_items as u64).min(attempted);
        match self.config.error_attribution {
            ErrorAttribution::Item if failed_items > 0 => {
                warn!(
                    "🩹 Batch {}: {} of {} documents were rejected individually",
                    boundary.ordinal, failed_items, attempted
                );
                BatchTally {
                    indexed: attempted - failed_items,
                    errors: failed_items,
                }
            }
            _ => {
                if failed_items > 0 {
                    debug!(
                        "🩹 Batch {}: response lists {} item errors; batch attribution counts the request as accepted",
                        boundary.ordinal, failed_items
                    );
                }
                BatchTally {
                    indexed: attempted,
                    errors: 0,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryStore;
    use crate::common::Genre;

    fn movies(count: usize) -> Vec<Movie> {
        (0..count)
            .map(|id| Movie {
                id: id as u64,
                original_title: format!("Movie #{id}"),
                genres: vec![Genre {
                    id: 18,
                    name: "Drama".to_string(),
                }],
            })
            .collect()
    }

    fn pipeline(config: IngestConfig) -> IngestPipeline {
        IngestPipeline::new(config, CancellationToken::new())
    }

    #[tokio::test]
    async fn the_one_where_256_movies_take_two_trips() -> Result<()> {
        let mut the_store = InMemoryStore::new();
        let the_report = pipeline(IngestConfig::default())
            .run(&mut the_store, &movies(256))
            .await?;

        assert_eq!(the_store.bulk_calls(), &[255, 1]);
        assert_eq!(the_store.documents("movies").map(|d| d.len()), Some(256));
        assert_eq!(the_report.indexed, 256);
        assert_eq!(the_report.errors, 0);
        assert_eq!(the_report.batches_submitted, 2);
        assert!(the_report.succeeded());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_old_index_is_wiped_first() -> Result<()> {
        let mut the_store = InMemoryStore::new();
        the_store.insert("movies", "stale", serde_json::json!({"OriginalTitle": "Old Yeller"}));

        pipeline(IngestConfig::default())
            .run(&mut the_store, &movies(3))
            .await?;

        let the_docs = the_store.documents("movies").expect("index exists");
        assert_eq!(the_docs.len(), 3);
        assert!(!the_docs.contains_key("stale"), "full reload, not upsert-into-old");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_one_bad_batch_does_not_stop_the_show() -> Result<()> {
        let mut the_store = InMemoryStore::new().fail_bulk_call(2);
        let the_config = IngestConfig {
            batch_size: 10,
            ..IngestConfig::default()
        };

        let the_report = pipeline(the_config).run(&mut the_store, &movies(35)).await?;

        assert_eq!(the_store.bulk_calls(), &[10, 10, 10, 5], "batches after the fault still run");
        assert_eq!(the_report.errors, 10);
        assert_eq!(the_report.indexed, 25);
        assert!(!the_report.succeeded());
        assert_eq!(the_store.documents("movies").map(|d| d.len()), Some(25));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_network_dies_and_so_does_the_run() {
        let mut the_store = InMemoryStore::new().drop_bulk_call(1);
        let the_error = pipeline(IngestConfig::default())
            .run(&mut the_store, &movies(5))
            .await
            .expect_err("transport failure is fatal without retries");
        assert!(the_error.to_string().contains("[1/1]"), "{the_error:#}");
    }

    #[tokio::test]
    async fn the_one_where_retry_saves_the_day() -> Result<()> {
        let mut the_store = InMemoryStore::new().drop_bulk_call(1).fail_bulk_call(2);
        let the_config = IngestConfig {
            max_retries: 2,
            retry_backoff_ms: 1,
            ..IngestConfig::default()
        };

        let the_report = pipeline(the_config).run(&mut the_store, &movies(5)).await?;

        assert_eq!(the_store.bulk_calls(), &[0, 5, 5], "dropped, 500, then accepted");
        assert_eq!(the_report.indexed, 5);
        assert_eq!(the_report.errors, 0);
        assert!(the_report.succeeded());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_item_attribution_is_precise() -> Result<()> {
        let the_config = IngestConfig {
            error_attribution: ErrorAttribution::Item,
            ..IngestConfig::default()
        };
        let mut the_store = InMemoryStore::new().fail_item(1, 0).fail_item(1, 3);

        let the_report = pipeline(the_config).run(&mut the_store, &movies(4)).await?;
        assert_eq!(the_report.indexed, 2);
        assert_eq!(the_report.errors, 2);

        // 🧪 same store behavior, default batch attribution: the 2xx counts as a success
        let mut the_coarse_store = InMemoryStore::new().fail_item(1, 0);
        let the_coarse_report = pipeline(IngestConfig::default())
            .run(&mut the_coarse_store, &movies(4))
            .await?;
        assert_eq!(the_coarse_report.errors, 0);
        assert_eq!(the_coarse_report.indexed, 4);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_cancel_means_no_more_batches() -> Result<()> {
        let the_cancel = CancellationToken::new();
        the_cancel.cancel();
        let mut the_store = InMemoryStore::new();

        let the_report = IngestPipeline::new(IngestConfig::default(), the_cancel)
            .run(&mut the_store, &movies(300))
            .await?;

        assert!(the_store.bulk_calls().is_empty());
        assert!(the_report.cancelled);
        assert!(!the_report.succeeded());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_empty_dataset_still_gets_a_fresh_index() -> Result<()> {
        let mut the_store = InMemoryStore::new();
        let the_report = pipeline(IngestConfig::default())
            .run(&mut the_store, &[])
            .await?;

        assert!(the_store.has_index("movies"));
        assert!(the_store.bulk_calls().is_empty());
        assert!(the_report.succeeded());
        assert_eq!(the_report.docs_per_sec, 0);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_broken_index_stops_everything() {
        let mut the_undeletable = InMemoryStore::new().fail_delete();
        let the_error = pipeline(IngestConfig::default())
            .run(&mut the_undeletable, &movies(3))
            .await
            .expect_err("a failed delete ends the run");
        assert!(format!("{the_error:#}").contains("403"), "{the_error:#}");
        assert!(the_undeletable.bulk_calls().is_empty(), "no documents after a failed delete");

        let mut the_uncreatable = InMemoryStore::new().fail_create();
        let the_error = pipeline(IngestConfig::default())
            .run(&mut the_uncreatable, &movies(3))
            .await
            .expect_err("a failed create ends the run");
        assert!(format!("{the_error:#}").contains("Cannot create index"), "{the_error:#}");
        assert!(the_uncreatable.bulk_calls().is_empty(), "no documents after a failed create");
        assert!(!the_uncreatable.has_index("movies"));
    }

    #[tokio::test]
    async fn the_one_where_a_zero_batch_size_is_caught_before_sending() {
        let mut the_store = InMemoryStore::new();
        let the_config = IngestConfig {
            batch_size: 0,
            ..IngestConfig::default()
        };
        assert!(pipeline(the_config).run(&mut the_store, &movies(1)).await.is_err());
        assert!(the_store.bulk_calls().is_empty());
    }

    #[test]
    fn the_one_where_backoff_doubles() {
        assert_eq!(backoff_duration(500, 1), Duration::from_millis(500));
        assert_eq!(backoff_duration(500, 2), Duration::from_millis(1000));
        assert_eq!(backoff_duration(500, 3), Duration::from_millis(2000));
        assert_eq!(backoff_duration(500, 0), Duration::from_millis(500));
    }
}
