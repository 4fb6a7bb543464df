//! 📂 Dataset: the CSV file, read whole, no questions asked.
//!
//! 🎬 *[a 30MB CSV file sits on disk. it has a header row. it has opinions about quoting.]*
//!
//! This is the thin end of the pipeline: open the file, let the `csv` crate deal with
//! quoting and embedded newlines, hand back every row (header included) as a
//! `StringRecord`. Deciding what the columns *mean* is the record parser's job.
//!
//! ⚠️ Rows are allowed to have different lengths here (`flexible`). A short row is
//! not our problem yet; the parser turns it into a loud, fatal, row-numbered error. 🦆

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use serde::Deserialize;
use tracing::info;

use crate::records::GenresPolicy;

/// 📂 Where the dataset lives and which columns matter.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatasetConfig {
    /// 📄 Path to the delimited file. The first row is a header.
    pub path: PathBuf,
    /// 🎬 Zero-based column holding the title.
    pub title_column: usize,
    /// 🏷️ Zero-based column holding the single-quoted genre list.
    pub genres_column: usize,
    /// 🩹 What to do when a genre cell refuses to be JSON.
    pub genres_policy: GenresPolicy,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("movie.csv"),
            title_column: 8,
            genres_column: 3,
            genres_policy: GenresPolicy::Degrade,
        }
    }
}

/// 📖 Read every row of the file, header included, in file order.
///
/// 💀 Fails if the file can't be opened or a row isn't valid CSV (bad quoting,
/// invalid UTF-8). Both mean the dataset is broken, and broken datasets don't get
/// partially indexed.
pub fn read_rows(path: &Path) -> Result<Vec<StringRecord>> {
    let started = Instant::now();
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| {
            format!(
                "💀 The dataset at '{}' would not open. It might not exist, it might be \
                 guarded by permissions, it might be a directory pretending to be a file.",
                path.display()
            )
        })?;

    let mut rows = Vec::new();
    for (row_index, record) in reader.records().enumerate() {
        let record = record.with_context(|| {
            format!(
                "💀 Row {} of '{}' is not valid CSV. The quotes don't close, or the bytes \
                 aren't UTF-8. Either way the dataset needs a look before we index it.",
                row_index,
                path.display()
            )
        })?;
        rows.push(record);
    }

    info!(
        "📂 Read {} rows (header included) from '{}' in {:?}",
        rows.len(),
        path.display(),
        started.elapsed()
    );
    Ok(rows)
}
