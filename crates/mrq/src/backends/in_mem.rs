//! # Previously, on Marquee...
//!
//! 🎬 The cluster was down. The demo was in ten minutes. Someone had to pretend
//! to be Elasticsearch. That someone was a `HashMap`.
//!
//! `InMemoryStore` speaks just enough of the document-store contract to make the
//! pipeline honest in tests and dry runs: it recreates indices, parses real NDJSON
//! bulk bodies, keys documents by `_id` (so re-sending overwrites), and answers
//! `match_phrase_prefix` queries. It can also be told to fail on purpose,
//! because testing the sad path is the whole point of having a fake.
//!
//! ⚠️ This is NOT for production. If you're deploying this to prod, please also
//! deploy a therapist. 🦆

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{BulkOutcome, DocumentStore, IndexDeletion, StoreFault};

/// 📦 Nothing to configure. The TOML section just has to exist: `[store.InMemory]`.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct InMemoryConfig {}

/// 🧠 A pretend cluster that never forgets (until it's dropped).
#[derive(Debug, Default)]
pub struct InMemoryStore {
    indices: HashMap<String, BTreeMap<String, Value>>,
    /// Documents per bulk call, in call order. Rejected calls are recorded too.
    bulk_calls: Vec<usize>,
    /// 1-based bulk call numbers that answer with a 500.
    faulty_calls: HashSet<usize>,
    /// 1-based bulk call numbers that fail like a dropped connection.
    unreachable_calls: HashSet<usize>,
    /// Items (0-based, within the call) to mark with a per-item error.
    item_errors: HashMap<usize, HashSet<usize>>,
    delete_fails: bool,
    create_fails: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 💀 Make bulk call number `call` (1-based) come back with a 500.
    pub fn fail_bulk_call(mut self, call: usize) -> Self {
        self.faulty_calls.insert(call);
        self
    }

    /// 📴 Make bulk call number `call` (1-based) fail before any answer arrives.
    pub fn drop_bulk_call(mut self, call: usize) -> Self {
        self.unreachable_calls.insert(call);
        self
    }

    /// 🩹 Make item `item` (0-based) of bulk call `call` (1-based) fail on its own.
    pub fn fail_item(mut self, call: usize, item: usize) -> Self {
        self.item_errors.entry(call).or_default().insert(item);
        self
    }

    /// 🔒 Make every `delete_index` answer with a 403.
    pub fn fail_delete(mut self) -> Self {
        self.delete_fails = true;
        self
    }

    /// 💥 Make every `create_index` answer with a 400.
    pub fn fail_create(mut self) -> Self {
        self.create_fails = true;
        self
    }

    /// Document count per bulk call, in order.
    pub fn bulk_calls(&self) -> &[usize] {
        &self.bulk_calls
    }

    pub fn documents(&self, index: &str) -> Option<&BTreeMap<String, Value>> {
        self.indices.get(index)
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.indices.contains_key(index)
    }

    /// Seed an index directly, skipping the bulk path.
    pub fn insert(&mut self, index: &str, id: &str, document: Value) {
        self.indices
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), document);
    }
}

/// 🔪 Split an NDJSON bulk body into (`_id`, source) pairs.
fn parse_bulk_body(body: &[u8]) -> std::result::Result<Vec<(String, Value)>, String> {
    let text = std::str::from_utf8(body).map_err(|e| format!("body is not UTF-8: {e}"))?;
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let mut pairs = Vec::new();
    while let Some(action_line) = lines.next() {
        let action: Value =
            serde_json::from_str(action_line).map_err(|e| format!("bad action line: {e}"))?;
        let id = action
            .get("index")
            .and_then(|meta| meta.get("_id"))
            .and_then(Value::as_str)
            .ok_or_else(|| format!("action line has no index._id: {action_line}"))?
            .to_string();
        let source_line = lines
            .next()
            .ok_or_else(|| format!("action for _id {id} has no source line"))?;
        let source: Value =
            serde_json::from_str(source_line).map_err(|e| format!("bad source line: {e}"))?;
        pairs.push((id, source));
    }
    Ok(pairs)
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// 🔍 Every query word matches in sequence, the last one only as a prefix.
fn phrase_prefix_matches(field: &str, phrase: &str) -> bool {
    let wanted = tokens(phrase);
    let Some((last, leading)) = wanted.split_last() else {
        return false;
    };
    let have = tokens(field);
    if have.len() < wanted.len() {
        return false;
    }
    (0..=have.len() - wanted.len()).any(|start| {
        leading
            .iter()
            .enumerate()
            .all(|(offset, word)| have[start + offset] == *word)
            && have[start + leading.len()].starts_with(last.as_str())
    })
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn delete_index(&mut self, index: &str) -> Result<IndexDeletion> {
        if self.delete_fails {
            bail!("💀 Cannot delete index '{}': [403] security_exception", index);
        }
        Ok(match self.indices.remove(index) {
            Some(_) => IndexDeletion::Deleted,
            None => IndexDeletion::NotFound,
        })
    }

    async fn create_index(&mut self, index: &str) -> Result<()> {
        if self.create_fails {
            bail!("💀 Cannot create index '{}': [400] illegal_argument_exception", index);
        }
        if self.indices.contains_key(index) {
            bail!(
                "💀 Cannot create index '{}': [400] resource_already_exists_exception",
                index
            );
        }
        self.indices.insert(index.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn bulk(&mut self, index: &str, body: &[u8]) -> Result<BulkOutcome> {
        let call = self.bulk_calls.len() + 1;
        if self.unreachable_calls.contains(&call) {
            self.bulk_calls.push(0);
            bail!("💀 bulk call {call} to the in-memory store was dropped on purpose");
        }

        let pairs = match parse_bulk_body(body) {
            Ok(pairs) => pairs,
            Err(reason) => {
                self.bulk_calls.push(0);
                return Ok(BulkOutcome::rejected(StoreFault {
                    status: 400,
                    kind: "illegal_argument_exception".to_string(),
                    reason,
                }));
            }
        };
        self.bulk_calls.push(pairs.len());

        if self.faulty_calls.contains(&call) {
            return Ok(BulkOutcome::rejected(StoreFault {
                status: 500,
                kind: "internal_server_error".to_string(),
                reason: format!("bulk call {call} failed on purpose"),
            }));
        }

        let doomed = self.item_errors.get(&call).cloned().unwrap_or_default();
        let documents = self.indices.entry(index.to_string()).or_default();
        let mut failed_items = 0;
        for (item, (id, source)) in pairs.into_iter().enumerate() {
            if doomed.contains(&item) {
                failed_items += 1;
                continue;
            }
            documents.insert(id, source);
        }
        Ok(BulkOutcome {
            fault: None,
            failed_items,
        })
    }

    async fn search(&mut self, index: &str, query: &Value) -> Result<Value> {
        let Some(documents) = self.indices.get(index) else {
            bail!("💀 Search against '{}' failed: [404] index_not_found_exception", index);
        };
        let Some(clause) = query
            .get("query")
            .and_then(|q| q.get("match_phrase_prefix"))
            .and_then(Value::as_object)
        else {
            bail!("💀 The in-memory store only understands match_phrase_prefix queries");
        };
        let Some((field, wanted)) = clause.iter().next() else {
            bail!("💀 match_phrase_prefix needs a field");
        };
        let phrase = wanted
            .as_str()
            .or_else(|| wanted.get("query").and_then(Value::as_str))
            .unwrap_or_default();
        let size = query.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;

        let matching: Vec<(&String, &Value)> = documents
            .iter()
            .filter(|(_, doc)| {
                doc.get(field)
                    .and_then(Value::as_str)
                    .is_some_and(|text| phrase_prefix_matches(text, phrase))
            })
            .collect();

        let hits: Vec<Value> = matching
            .iter()
            .take(size)
            .map(|(id, doc)| json!({ "_index": index, "_id": id, "_source": doc }))
            .collect();

        Ok(json!({
            "hits": {
                "total": { "value": matching.len(), "relation": "eq" },
                "hits": hits,
            }
        }))
    }
}
