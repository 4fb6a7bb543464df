//! 📡 Bulk Payload: formatting movies for the bulk API's peculiar tastes 🚀
//!
//! 🎬 COLD OPEN. INT. ELASTICSEARCH CLUSTER, BULK ENDPOINT. HIGH NOON.
//!
//! Rule 1: Two lines per document. Action metadata, then document source. Always.
//! Rule 2: Newline-delimited. Not comma-separated. Not XML. NEWLINES.
//! Rule 3: The trailing newline on the whole body matters. It MATTERS.
//!
//! ```text
//! {"index":{"_id":"5"}}
//! {"ID":5,"OriginalTitle":"X","Genres":[]}
//! ```
//!
//! 🧠 Knowledge graph:
//! - One [`BulkPayload`] lives for the whole run. It's filled, shipped, cleared, refilled.
//! - `clear()` keeps the allocation, so batch N+1 reuses batch N's capacity.
//! - The `index` action + `_id` means re-sending a movie overwrites it. Upserts, not dupes. 🦆

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;

use crate::common::Movie;

/// 🧯 What happens when a movie refuses to become JSON.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncodePolicy {
    /// The run stops. A movie that can't serialize means something is deeply off.
    #[default]
    Abort,
    /// The movie is left out of the batch and counted as an error.
    /// Today's `Movie` always serializes; this guards fields added later that might not.
    Skip,
}

/// 📦 The reusable NDJSON buffer for one bulk request at a time.
#[derive(Debug, Default)]
pub struct BulkPayload {
    buf: Vec<u8>,
    items: usize,
}

impl BulkPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
            items: 0,
        }
    }

    /// 🔄 Append one movie as an action line + source line.
    ///
    /// Returns `Ok(true)` when the movie made it into the buffer, `Ok(false)` when
    /// [`EncodePolicy::Skip`] left it out. The buffer is untouched on failure.
    pub fn append(&mut self, movie: &Movie, policy: EncodePolicy) -> Result<bool> {
        let body = match encode_body(movie) {
            Ok(body) => body,
            Err(err) => match policy {
                EncodePolicy::Abort => return Err(err),
                EncodePolicy::Skip => return Ok(false),
            },
        };
        let header = action_line(movie.id)?;

        // 📏 one reservation per document, sized for both lines and their newlines
        self.buf.reserve(header.len() + body.len() + 2);
        self.buf.extend_from_slice(&header);
        self.buf.push(b'\n');
        self.buf.extend_from_slice(&body);
        self.buf.push(b'\n');
        self.items += 1;
        Ok(true)
    }

    /// 🗑️ Empty the buffer for the next batch. Capacity stays.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.items = 0;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    /// Documents currently in the buffer.
    pub fn items(&self) -> usize {
        self.items
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }
}

/// `{"index":{"_id":"<id>"}}`. The id travels as a string, the way `_id` always does.
fn action_line(id: u64) -> Result<Vec<u8>> {
    serde_json::to_vec(&json!({ "index": { "_id": id.to_string() } })).context(
        "💀 Failed to serialize bulk action metadata. \
         The JSON that describes JSON has failed to become JSON.",
    )
}

fn encode_body(movie: &Movie) -> Result<Vec<u8>> {
    serde_json::to_vec(movie).with_context(|| {
        format!(
            "💀 Movie {} ('{}') could not be encoded as JSON.",
            movie.id, movie.original_title
        )
    })
}
