//! Shipper configuration.
//!
//! Parsed from `logship.toml`. Every key carries a built-in default, so a
//! missing file yields a fully usable local-development config. A file
//! that exists but cannot be read or parsed is a hard startup error.
//! Keys outside the recognized set are ignored.

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Queue backend host.
    #[serde(default = "default_queue_hostname")]
    pub queue_hostname: String,

    /// Queue backend port.
    #[serde(default = "default_queue_port")]
    pub queue_port: u16,

    /// Queue backend logical database index.
    #[serde(default = "default_queue_db")]
    pub queue_db: i64,

    /// Queue names to watch. Order is priority: when several queues have
    /// pending items, the first listed wins.
    #[serde(default = "default_queue_namespaces")]
    pub queue_namespaces: Vec<String>,

    /// Search backend host.
    #[serde(default = "default_search_hostname")]
    pub search_hostname: String,

    /// Search backend port.
    #[serde(default = "default_search_port")]
    pub search_port: u16,

    /// Prefix for the daily index name (`<prefix>-YYYY.MM.DD`).
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,

    /// Document-category label attached to every indexed event.
    #[serde(default = "default_document_category")]
    pub document_category: String,

    /// Queue receiving payloads whose index write could not be completed.
    #[serde(default = "default_dead_letter_queue")]
    pub dead_letter_queue: String,
}

fn default_queue_hostname() -> String {
    "127.0.0.1".into()
}

fn default_queue_port() -> u16 {
    6379
}

fn default_queue_db() -> i64 {
    1
}

fn default_queue_namespaces() -> Vec<String> {
    vec!["logs".into()]
}

fn default_search_hostname() -> String {
    "127.0.0.1".into()
}

fn default_search_port() -> u16 {
    9200
}

fn default_index_prefix() -> String {
    "logstash".into()
}

fn default_document_category() -> String {
    "logevent".into()
}

fn default_dead_letter_queue() -> String {
    "logs:deadletter".into()
}

impl Default for Config {
    fn default() -> Self {
        // An empty document deserializes to all defaults.
        toml::from_str("").expect("empty config must deserialize")
    }
}

impl Config {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load config from a file path.
    ///
    /// A missing file falls back to the built-in defaults; any other read
    /// failure, and any parse failure, is fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(
                    path = %path.as_ref().display(),
                    "config file not found, using built-in defaults"
                );
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Base URL of the search backend.
    pub fn search_base_url(&self) -> String {
        format!("http://{}:{}", self.search_hostname, self.search_port)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  queue:   {}:{} db={} namespaces={:?}",
            self.queue_hostname,
            self.queue_port,
            self.queue_db,
            self.queue_namespaces
        );
        tracing::info!("  search:  {}", self.search_base_url());
        tracing::info!(
            "  index:   prefix={} category={}",
            self.index_prefix,
            self.document_category
        );
        tracing::info!("  dead letter: {}", self.dead_letter_queue);
    }
}

// ── Tests ───────────────────────────────────────────────────────────
