//! # 📡 THE ELASTICSEARCH BACKEND
//!
//! 🎬 COLD OPEN. INT. SERVER ROOM, 3:47 AM.
//!
//! The cluster listens on 9200 behind a self-signed certificate that someone
//! generated during a docker compose up eighteen months ago. The CA file is called
//! `http_ca.crt`. Nobody remembers where it came from. Everybody copies it around.
//!
//! 🚀 This module sends movies into the elastic void. It recreates the index,
//! POSTs NDJSON to `/_bulk`, and asks one small question via `/_search`.
//!
//! 🧠 Knowledge graph:
//! - Auth: API key beats basic auth. This is not a democracy.
//! - TLS: an optional PEM file becomes an extra trusted root.
//! - Bulk: `Content-Type: application/x-ndjson`, optionally gzip-compressed.
//! - Every `reqwest::Response` is consumed (`bytes()`) before the method returns.
//!   The connection goes back to the pool before the next batch is even encoded.
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use flate2::{Compression, write::GzEncoder};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use super::{BulkOutcome, DocumentStore, IndexDeletion, StoreFault};

/// 📡 Everything needed to reach the cluster.
#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchConfig {
    /// 📡 Scheme + host + port. `https://localhost:9200`, all of it.
    pub url: String,
    /// 🔒 Username for basic auth.
    #[serde(default)]
    pub username: Option<String>,
    /// 🔒 Password. Put it in `MRQ_STORE__ELASTICSEARCH__PASSWORD`, not in the TOML. Please.
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key, the velvet rope variant of authentication.
    #[serde(default)]
    pub api_key: Option<String>,
    /// 🔐 PEM-encoded CA certificate to trust, e.g. the `http_ca.crt` from the ES container.
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,
    /// 🫁 gzip the bulk body. Worth it over slow links, pointless on localhost.
    #[serde(default)]
    pub compress_requests: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

// 🔧 10 seconds to shake hands. If ES can't manage that, it's not having a good day.
fn default_connect_timeout_secs() -> u64 {
    10
}

// 🔧 30 seconds for a response. Bulk requests can be meaty and we're not monsters.
fn default_request_timeout_secs() -> u64 {
    30
}

/// 📡 The HTTP side of the store. Holds a pooled client and the config. That's it.
#[derive(Debug)]
pub struct ElasticsearchStore {
    client: reqwest::Client,
    config: ElasticsearchConfig,
}

impl ElasticsearchStore {
    /// 🚀 Build the HTTP client, trusting the configured CA if there is one.
    ///
    /// No network traffic happens here. The first request is the index delete,
    /// which doubles as the "are you even there?" check.
    pub fn new(config: ElasticsearchConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs));

        if let Some(ref ca_path) = config.ca_cert_path {
            let pem = std::fs::read(ca_path).with_context(|| {
                format!(
                    "💀 Couldn't read the CA certificate at '{}'. The TLS handshake will not go well without it.",
                    ca_path.display()
                )
            })?;
            let certificate = reqwest::Certificate::from_pem(&pem).with_context(|| {
                format!(
                    "💀 '{}' exists but isn't a PEM certificate we can trust.",
                    ca_path.display()
                )
            })?;
            builder = builder.add_root_certificate(certificate);
        }

        let client = builder
            .build()
            .context("💀 The HTTP client refused to be born. The TLS stack wept. Probably a cursed certificate or system OpenSSL.")?;

        Ok(Self { client, config })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    /// 🔒 Same auth dance for every request: api_key beats basic auth in this club.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(ref username) = self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    /// 📦 Send, then read the whole body so the response is gone before we return.
    async fn exchange(&self, request: reqwest::RequestBuilder, what: &str) -> Result<(u16, Vec<u8>)> {
        let response = self.authorize(request).send().await.with_context(|| {
            format!(
                "💀 The {what} request never got an answer from Elasticsearch at '{}'. \
                 Check connectivity, check timeouts, check that the cluster is actually up.",
                self.config.url
            )
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().await.with_context(|| {
            format!("💀 Elasticsearch started answering the {what} request, then the body fell off the wire.")
        })?;
        Ok((status, body.to_vec()))
    }

    fn bulk_body(&self, body: &[u8]) -> Result<Vec<u8>> {
        if !self.config.compress_requests {
            return Ok(body.to_vec());
        }
        let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 4), Compression::default());
        encoder
            .write_all(body)
            .context("💀 gzip choked on the bulk body")?;
        encoder.finish().context("💀 gzip couldn't finish the bulk body")
    }
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn delete_index(&mut self, index: &str) -> Result<IndexDeletion> {
        let request = self.client.delete(self.url_for(index));
        let (status, body) = self.exchange(request, "delete-index").await?;
        match status {
            200..=299 => {
                debug!("🗑️ Index '{}' deleted. Clean slate.", index);
                Ok(IndexDeletion::Deleted)
            }
            404 => {
                debug!("🗑️ Index '{}' wasn't there to delete. Fine by us.", index);
                Ok(IndexDeletion::NotFound)
            }
            _ => bail!(
                "💀 Cannot delete index '{}': {}",
                index,
                StoreFault::from_body(status, &body)
            ),
        }
    }

    async fn create_index(&mut self, index: &str) -> Result<()> {
        let request = self.client.put(self.url_for(index));
        let (status, body) = self.exchange(request, "create-index").await?;
        if !(200..300).contains(&status) {
            bail!(
                "💀 Cannot create index '{}': {}",
                index,
                StoreFault::from_body(status, &body)
            );
        }
        debug!("🏗️ Index '{}' created. The welcome mat is out.", index);
        Ok(())
    }

    async fn bulk(&mut self, index: &str, body: &[u8]) -> Result<BulkOutcome> {
        trace!("📡 Sending {} bytes to '{}/_bulk'", body.len(), index);
        let mut request = self
            .client
            .post(self.url_for(&format!("{index}/_bulk")))
            // ⚠️ application/x-ndjson, not application/json. ES will sulk otherwise.
            .header("Content-Type", "application/x-ndjson");
        if self.config.compress_requests {
            request = request.header("Content-Encoding", "gzip");
        }
        let request = request.body(self.bulk_body(body)?);

        let (status, response_body) = self.exchange(request, "bulk").await?;
        if (200..300).contains(&status) {
            Ok(BulkOutcome::from_success_body(&response_body))
        } else {
            Ok(BulkOutcome::rejected(StoreFault::from_body(
                status,
                &response_body,
            )))
        }
    }

    async fn search(&mut self, index: &str, query: &Value) -> Result<Value> {
        let request = self
            .client
            .post(self.url_for(&format!("{index}/_search")))
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(query).context("💀 The search query refused to become JSON")?);
        let (status, body) = self.exchange(request, "search").await?;
        if !(200..300).contains(&status) {
            bail!(
                "💀 Search against '{}' failed: {}",
                index,
                StoreFault::from_body(status, &body)
            );
        }
        serde_json::from_slice(&body).context("💀 Elasticsearch answered the search with something that isn't JSON")
    }
}
