//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 The pipeline pours NDJSON in one end, a document store swallows it at the other.
//! This module is the casting agency for that store. Need a real Elasticsearch
//! cluster behind TLS? We've got a backend for that. Need a pretend cluster that
//! lives in a `HashMap` for tests and dry runs? Also got one.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls (`ElasticsearchStore`, `InMemoryStore`) → `StoreBackend` enum
//! - Transport failure = `Err`. The store answering with an error status = `Ok(BulkOutcome)`
//!   carrying a [`StoreFault`]. Two different axes, two different reactions upstream.
//! - Every response body is read and dropped inside the backend call. Nothing that
//!   holds a socket escapes this module.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

pub mod elasticsearch;
pub mod in_mem;

pub use elasticsearch::{ElasticsearchConfig, ElasticsearchStore};
pub use in_mem::{InMemoryConfig, InMemoryStore};

// ===== Outcomes =====

/// 💀 The store got our request and said "no" with a status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFault {
    pub status: u16,
    /// `error.type` from the response body, or `"unknown"`.
    pub kind: String,
    /// `error.reason` from the response body, or the raw body when it wasn't JSON.
    pub reason: String,
}

impl StoreFault {
    /// 429 and 5xx are worth another try. Everything else is our fault, not the cluster's.
    pub fn is_retryable(&self) -> bool {
        self.status == 429 || self.status >= 500
    }

    /// Pull `error.type` / `error.reason` out of an error body, whatever shape it came in.
    pub fn from_body(status: u16, body: &[u8]) -> Self {
        let parsed: Option<Value> = serde_json::from_slice(body).ok();
        let error = parsed.as_ref().and_then(|v| v.get("error"));
        let kind = error
            .and_then(|e| e.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let reason = match error {
            Some(Value::String(reason)) => reason.clone(),
            Some(e) => e
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| e.to_string()),
            None => String::from_utf8_lossy(body).into_owned(),
        };
        Self {
            status,
            kind,
            reason,
        }
    }
}

impl std::fmt::Display for StoreFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.status, self.kind, self.reason)
    }
}

/// 📬 What came back from one bulk request, already read, parsed, and released.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkOutcome {
    /// Set when the whole request was rejected (HTTP error status).
    pub fault: Option<StoreFault>,
    /// Number of per-item entries carrying an `error` object. Only meaningful on 2xx.
    pub failed_items: usize,
}

impl BulkOutcome {
    pub fn accepted() -> Self {
        Self::default()
    }

    pub fn rejected(fault: StoreFault) -> Self {
        Self {
            fault: Some(fault),
            failed_items: 0,
        }
    }

    /// 🔍 Count `items[*].<action>.error` entries in a 2xx bulk response body.
    pub fn from_success_body(body: &[u8]) -> Self {
        let parsed: Option<Value> = serde_json::from_slice(body).ok();
        let has_errors = parsed
            .as_ref()
            .and_then(|v| v.get("errors"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !has_errors {
            return Self::accepted();
        }
        let failed_items = parsed
            .as_ref()
            .and_then(|v| v.get("items"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .filter(|item| item.values().any(|action| action.get("error").is_some()))
                    .count()
            })
            .unwrap_or(0);
        Self {
            fault: None,
            failed_items,
        }
    }
}

/// 🪦 Result of the delete half of a full reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexDeletion {
    Deleted,
    NotFound,
}

// ===== Store Trait and Backend Enum =====

/// 🗄️ A document store that can recreate an index, take bulk requests, and answer searches.
///
/// # Contract
/// - `delete_index` treats "not there" as success ([`IndexDeletion::NotFound`]).
/// - `create_index` fails on any error status.
/// - `bulk` returns `Err` only when the request never got an answer. An error status is
///   an `Ok(BulkOutcome)` with a fault, so the caller can count it and keep going.
/// - `search` returns the raw response JSON.
#[async_trait]
pub trait DocumentStore: std::fmt::Debug + Send {
    async fn delete_index(&mut self, index: &str) -> Result<IndexDeletion>;
    async fn create_index(&mut self, index: &str) -> Result<()>;
    async fn bulk(&mut self, index: &str, body: &[u8]) -> Result<BulkOutcome>;
    async fn search(&mut self, index: &str, query: &Value) -> Result<Value>;
}

/// 📡 Which store to talk to. Keyed by variant name in TOML: `[store.Elasticsearch]`.
#[derive(Debug, Deserialize, Clone)]
pub enum StoreConfig {
    Elasticsearch(ElasticsearchConfig),
    InMemory(InMemoryConfig),
}

/// 🎭 The many faces of a store, dispatched without a vtable.
#[derive(Debug)]
pub enum StoreBackend {
    Elasticsearch(ElasticsearchStore),
    InMemory(InMemoryStore),
}

impl StoreBackend {
    /// 🚀 Build the backend named by the config.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Ok(match config {
            StoreConfig::Elasticsearch(es) => {
                StoreBackend::Elasticsearch(ElasticsearchStore::new(es.clone())?)
            }
            StoreConfig::InMemory(_) => StoreBackend::InMemory(InMemoryStore::new()),
        })
    }
}

#[async_trait]
impl DocumentStore for StoreBackend {
    async fn delete_index(&mut self, index: &str) -> Result<IndexDeletion> {
        match self {
            StoreBackend::Elasticsearch(store) => store.delete_index(index).await,
            StoreBackend::InMemory(store) => store.delete_index(index).await,
        }
    }

    async fn create_index(&mut self, index: &str) -> Result<()> {
        match self {
            StoreBackend::Elasticsearch(store) => store.create_index(index).await,
            StoreBackend::InMemory(store) => store.create_index(index).await,
        }
    }

    async fn bulk(&mut self, index: &str, body: &[u8]) -> Result<BulkOutcome> {
        match self {
            StoreBackend::Elasticsearch(store) => store.bulk(index, body).await,
            StoreBackend::InMemory(store) => store.bulk(index, body).await,
        }
    }

    async fn search(&mut self, index: &str, query: &Value) -> Result<Value> {
        match self {
            StoreBackend::Elasticsearch(store) => store.search(index, query).await,
            StoreBackend::InMemory(store) => store.search(index, query).await,
        }
    }
}
