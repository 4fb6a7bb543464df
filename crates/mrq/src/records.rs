//! 🎞️ Records: turning CSV rows into `Movie`s.
//!
//! 🎬 COLD OPEN. INT. DATA JANITOR'S OFFICE, 2:12 AM.
//!
//! The genre column looks like JSON. It smells like JSON. It is wearing a JSON
//! costume. Then you notice the single quotes. `[{'id': 18, 'name': 'Drama'}]`.
//! Somebody exported a Python `repr()` and called it a day.
//!
//! The fix is as crude as it is effective: swap every `'` for `"` and try again.
//! Titles like "Schindler's List" live in a different column, so they are safe.
//! Genre names with apostrophes are not, and that's what [`GenresPolicy`] is for.
//!
//! 🧠 Knowledge graph:
//! - Input: rows from `dataset::read_rows` (row 0 = header, skipped here)
//! - Output: `Vec<Movie>` in row order, `id = row_index - 1`
//! - A short row is fatal. A bad genre cell is a policy decision. 🦆

use std::time::Instant;

use anyhow::{Context, Result, bail};
use csv::StringRecord;
use serde::Deserialize;
use tracing::{debug, info};

use crate::common::{Genre, Movie};
use crate::dataset::DatasetConfig;

/// 🩹 What happens when a genre cell can't be decoded.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenresPolicy {
    /// The movie keeps going with an empty genre list.
    #[default]
    Degrade,
    /// The whole run stops, row number in hand.
    Abort,
}

/// 🔧 Column layout + decode policy, borrowed from [`DatasetConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ParserOptions {
    pub title_column: usize,
    pub genres_column: usize,
    pub genres_policy: GenresPolicy,
}

impl ParserOptions {
    fn min_fields(&self) -> usize {
        self.title_column.max(self.genres_column) + 1
    }
}

impl From<&DatasetConfig> for ParserOptions {
    fn from(config: &DatasetConfig) -> Self {
        Self {
            title_column: config.title_column,
            genres_column: config.genres_column,
            genres_policy: config.genres_policy,
        }
    }
}

impl Default for ParserOptions {
    fn default() -> Self {
        (&DatasetConfig::default()).into()
    }
}

/// 🎞️ Parse every data row into a [`Movie`], skipping the header.
///
/// 💀 Errors when a row has fewer fields than the configured columns need, or when a
/// genre cell fails to decode under [`GenresPolicy::Abort`].
pub fn parse_rows(rows: &[StringRecord], options: &ParserOptions) -> Result<Vec<Movie>> {
    let started = Instant::now();
    let mut movies = Vec::with_capacity(rows.len().saturating_sub(1));

    for (row_index, row) in rows.iter().enumerate().skip(1) {
        if row.len() < options.min_fields() {
            bail!(
                "💀 Row {} has {} fields, but we need at least {} (title at {}, genres at {}). \
                 A row this short means the dataset is corrupt, and we don't index corrupt datasets.",
                row_index,
                row.len(),
                options.min_fields(),
                options.title_column,
                options.genres_column
            );
        }

        let raw_genres = &row[options.genres_column];
        let genres = match decode_genres(raw_genres) {
            Ok(genres) => genres,
            Err(err) => match options.genres_policy {
                GenresPolicy::Degrade => {
                    debug!(
                        "🩹 Row {}: genre cell {:?} isn't JSON even after the quote swap ({}). Empty genres it is.",
                        row_index, raw_genres, err
                    );
                    Vec::new()
                }
                GenresPolicy::Abort => {
                    return Err(err).context(format!(
                        "💀 Row {} has a genre cell we could not decode and the policy says abort: {:?}",
                        row_index, raw_genres
                    ));
                }
            },
        };

        movies.push(Movie {
            id: (row_index - 1) as u64,
            original_title: row[options.title_column].to_string(),
            genres,
        });
    }

    info!(
        "🎞️ Parsed {} movies in {:?}",
        movies.len(),
        started.elapsed()
    );
    Ok(movies)
}

/// 🔄 `[{'id': 1, 'name': 'Action'}]` → `[Genre { id: 1, name: "Action" }]`.
///
/// A blank cell is an empty list, not an error.
pub fn decode_genres(raw: &str) -> Result<Vec<Genre>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let normalized = raw.replace('\'', "\"");
    serde_json::from_str(&normalized).context("genre list is not a JSON array of {id, name}")
}
