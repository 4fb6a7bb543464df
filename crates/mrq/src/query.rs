//! 🔍 query.rs: one question, asked after the movies land: "does anything start with `inters`?"
//!
//! A phrase-prefix match on a single field, returning the `_source` of each hit.
//! Nothing is parsed into `Movie`, because the point is to see what the store
//! actually holds. 🦆

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::backends::DocumentStore;

/// 🔍 The smoke query knobs.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct QueryConfig {
    pub field: String,
    pub phrase: String,
    pub size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            field: "OriginalTitle".to_string(),
            phrase: "inters".to_string(),
            size: 2,
        }
    }
}

/// 🧱 `match_phrase_prefix` on `field`, at most `size` hits, with an exact total.
pub fn phrase_prefix_query(field: &str, phrase: &str, size: usize) -> Value {
    json!({
        "query": {
            "match_phrase_prefix": {
                field: { "query": phrase }
            }
        },
        "size": size,
        "track_total_hits": true,
    })
}

/// 🚀 Ask the store, hand back the `_source` documents in hit order.
///
/// `phrase` overrides the configured one (the CLI passes its positional arg here).
pub async fn run_smoke_query<S: DocumentStore>(
    store: &mut S,
    index: &str,
    config: &QueryConfig,
    phrase: Option<&str>,
) -> Result<Vec<Value>> {
    let phrase = phrase.unwrap_or(&config.phrase);
    let query = phrase_prefix_query(&config.field, phrase, config.size);
    let response = store
        .search(index, &query)
        .await
        .with_context(|| format!("💀 Smoke query for '{phrase}' on '{index}' failed"))?;

    let hits = response
        .get("hits")
        .and_then(|hits| hits.get("hits"))
        .and_then(Value::as_array)
        .context("💀 Search response has no hits.hits array. Is that really a search endpoint?")?;
    let total = response
        .pointer("/hits/total/value")
        .and_then(Value::as_u64)
        .unwrap_or(hits.len() as u64);

    info!(
        "🔍 '{}' on {} matched {} documents, showing {}",
        phrase,
        config.field,
        total,
        hits.len()
    );
    Ok(hits
        .iter()
        .filter_map(|hit| hit.get("_source").cloned())
        .collect())
}
