//! Configuration loading and representation.

use core::fmt;
use core::str::FromStr;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

use crate::pipeline::PipelineConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("flush interval must be greater than zero")]
    InvalidFlushInterval,

    #[error("channel capacity must be at least 1")]
    InvalidChannelCapacity,

    #[error("data directory must be set")]
    MissingDataDir,

    #[error("publish table {0:?} must be written as `schema.table`")]
    InvalidPublishTable(String),

    #[error("invalid subscribe table regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown source flavor {0:?} (expected `mysql` or `mariadb`)")]
    UnknownFlavor(String),
}

/// Replication protocol dialect of the source.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Flavor {
    #[default]
    Mysql,
    Mariadb,
}

impl Flavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flavor::Mysql => "mysql",
            Flavor::Mariadb => "mariadb",
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flavor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Flavor::Mysql),
            "mariadb" => Ok(Flavor::Mariadb),
            _ => Err(ConfigError::UnknownFlavor(s.to_string())),
        }
    }
}

/// Connection parameters handed to the source reader.
#[derive(Clone)]
pub struct SourceConfig {
    pub addr: String,
    pub user: String,
    pub password: String,
    pub charset: String,
    /// Replica identity presented to the source; must differ from real replicas.
    pub server_id: u32,
    pub flavor: Flavor,
    pub skip_no_pk_table: bool,
    /// Only tables whose `schema.table` matches one of these are subscribed.
    pub subscribe_table_regex: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:3306".to_string(),
            user: "root".to_string(),
            password: String::new(),
            charset: "utf8mb4".to_string(),
            server_id: 1001,
            flavor: Flavor::Mysql,
            skip_no_pk_table: false,
            subscribe_table_regex: Vec::new(),
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("addr", &self.addr)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("charset", &self.charset)
            .field("server_id", &self.server_id)
            .field("flavor", &self.flavor)
            .field("skip_no_pk_table", &self.skip_no_pk_table)
            .field("subscribe_table_regex", &self.subscribe_table_regex)
            .finish()
    }
}

impl SourceConfig {
    /// Compile the subscribe allow-list.
    pub fn subscribe_regexes(&self) -> Result<Vec<Regex>, ConfigError> {
        self.subscribe_table_regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect()
    }
}

/// Everything one sync pipeline needs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Human-readable name used in logs and diagnostics.
    pub label: String,
    pub source: SourceConfig,
    /// Directory holding the checkpoint file.
    pub data_dir: PathBuf,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub channel_capacity: usize,
    /// `schema.table` names to publish; empty publishes every table.
    pub publish_tables: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        Self {
            label: "binsync".to_string(),
            source: SourceConfig::default(),
            data_dir: PathBuf::from("./var"),
            batch_size: pipeline.batch_size,
            flush_interval: pipeline.flush_interval,
            channel_capacity: pipeline.channel_capacity,
            publish_tables: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_publish_tables(mut self, tables: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.publish_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::InvalidFlushInterval);
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity);
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingDataDir);
        }
        if let Some(bad) = self
            .publish_tables
            .iter()
            .find(|t| !matches!(t.split_once('.'), Some((s, n)) if !s.is_empty() && !n.is_empty()))
        {
            return Err(ConfigError::InvalidPublishTable(bad.clone()));
        }
        self.source.subscribe_regexes()?;
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_batch_size(self.batch_size)
            .with_flush_interval(self.flush_interval)
            .with_channel_capacity(self.channel_capacity)
    }
}
