//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! 🧠 Knowledge graph: each section's struct lives next to the code it configures
//! (`DatasetConfig` in `dataset`, `IngestConfig` in `pipeline`, `StoreConfig` in
//! `backends`, `QueryConfig` in `query`). This file only glues them together.

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::backends::StoreConfig;
use crate::dataset::DatasetConfig;
use crate::pipeline::IngestConfig;
use crate::query::QueryConfig;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📂 Where the movies live before they become documents.
    #[serde(default)]
    pub dataset: DatasetConfig,
    /// 🚚 Batch size, policies, retry knobs. The loading dock rules.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// 📡 Where the documents go. No default, because guessing a cluster URL is rude.
    pub store: StoreConfig,
    /// 🔍 The one and only smoke query.
    #[serde(default)]
    pub query: QueryConfig,
}

/// 🚀 Load the config from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (`MRQ_*`, nested keys split on `__`) with an
/// optional TOML file. TOML wins on conflicts.
///
/// - `None` → env vars only. No file. No assumptions.
/// - `Some(path)` → env vars + TOML file, merged.
///
/// So `MRQ_STORE__ELASTICSEARCH__PASSWORD=hunter2` fills
/// `store.Elasticsearch.password`, and the password never has to touch the TOML file.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("MRQ_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (MRQ_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (MRQ_*). \
                 No file was provided, this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::StoreConfig;
    use crate::pipeline::{EncodePolicy, ErrorAttribution};
    use crate::records::GenresPolicy;
    use std::io::Write;

    fn write_test_config(contents: &str) -> tempfile::NamedTempFile {
        let mut the_file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("💀 Failed to create a temp config. The filesystem said 'new phone who dis'.");
        the_file
            .write_all(contents.as_bytes())
            .expect("💀 Failed to write the temp config. The disk is having a moment.");
        the_file
    }

    #[test]
    fn the_one_where_every_section_shows_up_to_the_party() {
        let the_file = write_test_config(
            r#"
            [dataset]
            path = "data/movies_metadata.csv"
            title_column = 8
            genres_column = 3
            genres_policy = "abort"

            [ingest]
            index = "films"
            batch_size = 100
            encode_policy = "skip"
            error_attribution = "item"
            max_retries = 3
            retry_backoff_ms = 10

            [store.Elasticsearch]
            url = "https://localhost:9200"
            username = "elastic"
            password = "changeme"
            ca_cert_path = "http_ca.crt"
            compress_requests = true

            [query]
            field = "OriginalTitle"
            phrase = "star"
            size = 5
            "#,
        );

        let app_config = load_config(Some(the_file.path()))
            .expect("💀 A fully specified config should parse. Serde had one job.");

        assert_eq!(app_config.dataset.path.to_string_lossy(), "data/movies_metadata.csv");
        assert_eq!(app_config.dataset.genres_policy, GenresPolicy::Abort);
        assert_eq!(app_config.ingest.index, "films");
        assert_eq!(app_config.ingest.batch_size, 100);
        assert_eq!(app_config.ingest.encode_policy, EncodePolicy::Skip);
        assert_eq!(app_config.ingest.error_attribution, ErrorAttribution::Item);
        assert_eq!(app_config.ingest.max_retries, 3);
        assert_eq!(app_config.query.phrase, "star");
        assert_eq!(app_config.query.size, 5);
        match app_config.store {
            StoreConfig::Elasticsearch(es) => {
                assert_eq!(es.url, "https://localhost:9200");
                assert_eq!(es.username.as_deref(), Some("elastic"));
                assert!(es.compress_requests);
                assert_eq!(es.connect_timeout_secs, 10);
            }
            honestly_who_knows => panic!(
                "💀 Expected an Elasticsearch store, serde took us to {:?}. Plot twist energy.",
                honestly_who_knows
            ),
        }
    }

    #[test]
    fn the_one_where_defaults_match_the_original_movie_night() {
        let the_file = write_test_config(
            r#"
            [store.InMemory]
            "#,
        );

        let app_config: AppConfig = Figment::new()
            .merge(Toml::file(the_file.path()))
            .extract()
            .expect("💀 Defaults should fill every gap. Serde left us on read otherwise.");

        assert_eq!(app_config.dataset.path.to_string_lossy(), "movie.csv");
        assert_eq!(app_config.dataset.title_column, 8);
        assert_eq!(app_config.dataset.genres_column, 3);
        assert_eq!(app_config.dataset.genres_policy, GenresPolicy::Degrade);
        assert_eq!(app_config.ingest.index, "movies");
        assert_eq!(app_config.ingest.batch_size, 255);
        assert_eq!(app_config.ingest.encode_policy, EncodePolicy::Abort);
        assert_eq!(app_config.ingest.error_attribution, ErrorAttribution::Batch);
        assert_eq!(app_config.ingest.max_retries, 0);
        assert_eq!(app_config.query.field, "OriginalTitle");
        assert_eq!(app_config.query.phrase, "inters");
        assert_eq!(app_config.query.size, 2);
        assert!(matches!(app_config.store, StoreConfig::InMemory(_)));
    }

    #[test]
    fn the_one_where_a_missing_store_is_not_silently_invented() {
        let the_file = write_test_config(
            r#"
            [ingest]
            batch_size = 10
            "#,
        );

        let the_outcome: Result<AppConfig, _> =
            Figment::new().merge(Toml::file(the_file.path())).extract();
        assert!(the_outcome.is_err(), "no store section means no run");
    }
}
