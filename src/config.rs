use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Collection;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    /// Matched against the file name only; discovery is not recursive.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Parse worker count. 0 means one per available CPU.
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            include_globs: default_include_globs(),
            workers: 0,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("./protocols")
}
fn default_include_globs() -> Vec<String> {
    vec!["*.xml".to_string()]
}
fn default_batch_size() -> usize {
    1000
}
fn default_timeout_secs() -> u64 {
    3600
}

impl IngestConfig {
    /// Resolve `workers = 0` to the host's available parallelism.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Table names backing each logical collection.
#[derive(Debug, Deserialize, Clone)]
pub struct CollectionsConfig {
    #[serde(default = "default_speeches")]
    pub speeches: String,
    #[serde(default = "default_agenda_items")]
    pub agenda_items: String,
    #[serde(default = "default_comments")]
    pub comments: String,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            speeches: default_speeches(),
            agenda_items: default_agenda_items(),
            comments: default_comments(),
        }
    }
}

fn default_speeches() -> String {
    "speeches".to_string()
}
fn default_agenda_items() -> String {
    "agenda".to_string()
}
fn default_comments() -> String {
    "comments".to_string()
}

impl CollectionsConfig {
    pub fn name(&self, collection: Collection) -> &str {
        match collection {
            Collection::Speeches => &self.speeches,
            Collection::AgendaItems => &self.agenda_items,
            Collection::Comments => &self.comments,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Config {
    /// Defaults for commands that work without a config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/plenary.sqlite"),
                max_connections: default_max_connections(),
            },
            ingest: IngestConfig::default(),
            collections: CollectionsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.batch_size == 0 {
            anyhow::bail!("ingest.batch_size must be > 0");
        }
        if self.ingest.timeout_secs == 0 {
            anyhow::bail!("ingest.timeout_secs must be > 0");
        }
        if self.ingest.include_globs.is_empty() {
            anyhow::bail!("ingest.include_globs must not be empty");
        }
        if self.db.max_connections == 0 {
            anyhow::bail!("db.max_connections must be > 0");
        }

        let mut seen = Vec::new();
        for collection in Collection::ALL {
            let name = self.collections.name(collection);
            if !is_sql_identifier(name) {
                anyhow::bail!(
                    "Invalid table name for {}: '{}'. Use letters, digits and underscores.",
                    collection.label(),
                    name
                );
            }
            if seen.contains(&name) {
                anyhow::bail!("Collection table '{}' is configured more than once", name);
            }
            seen.push(name);
        }

        Ok(())
    }
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
