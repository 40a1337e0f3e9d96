//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use binsync_infra::{Flavor, SourceConfig, SyncConfig};
use binsync_observability::LogFormat;
use clap::Parser;

/// Forward row changes from a replication log to a sink, with checkpoints.
#[derive(Parser)]
#[clap(name = "binsync", version)]
pub struct Config {
    /// Name of this pipeline in logs and diagnostics.
    #[clap(long = "label", env = "BINSYNC_LABEL", default_value = "binsync", action)]
    pub label: String,

    /// Source server address.
    #[clap(long = "addr", env = "BINSYNC_ADDR", default_value = "127.0.0.1:3306", action)]
    pub addr: String,

    #[clap(long = "user", env = "BINSYNC_USER", default_value = "root", action)]
    pub user: String,

    #[clap(
        long = "password",
        env = "BINSYNC_PASSWORD",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true,
        action
    )]
    pub password: String,

    #[clap(long = "charset", env = "BINSYNC_CHARSET", default_value = "utf8mb4", action)]
    pub charset: String,

    /// Replica id presented to the source; must not clash with real replicas.
    #[clap(long = "server-id", env = "BINSYNC_SERVER_ID", default_value = "1001", action)]
    pub server_id: u32,

    /// `mysql` or `mariadb`.
    #[clap(long = "flavor", env = "BINSYNC_FLAVOR", default_value = "mysql", action)]
    pub flavor: Flavor,

    /// Skip tables without a primary key.
    #[clap(long = "skip-no-pk-table", env = "BINSYNC_SKIP_NO_PK_TABLE", action)]
    pub skip_no_pk_table: bool,

    /// Comma-separated regexes over `schema.table`; only matching tables are read.
    #[clap(
        long = "subscribe-table-regex",
        env = "BINSYNC_SUBSCRIBE_TABLE_REGEX",
        value_delimiter = ',',
        action
    )]
    pub subscribe_table_regex: Vec<String>,

    /// Directory holding the checkpoint file.
    #[clap(long = "data-dir", env = "BINSYNC_DATA_DIR", default_value = "./var", action)]
    pub data_dir: PathBuf,

    /// Flush once this many items are pending.
    #[clap(long = "batch-size", env = "BINSYNC_BATCH_SIZE", default_value = "128", action)]
    pub batch_size: usize,

    /// Flush whatever is pending at least this often.
    #[clap(
        long = "flush-interval",
        env = "BINSYNC_FLUSH_INTERVAL",
        default_value = "200ms",
        value_parser = humantime::parse_duration,
        action
    )]
    pub flush_interval: Duration,

    /// Messages buffered between the reader and the pipeline.
    #[clap(
        long = "channel-capacity",
        env = "BINSYNC_CHANNEL_CAPACITY",
        default_value = "4096",
        action
    )]
    pub channel_capacity: usize,

    /// Comma-separated `schema.table` names to publish; empty publishes all.
    #[clap(
        long = "publish-tables",
        env = "BINSYNC_PUBLISH_TABLES",
        value_delimiter = ',',
        action
    )]
    pub publish_tables: Vec<String>,

    /// Serve `/stat` diagnostics on this address.
    #[clap(long = "stat-addr", env = "BINSYNC_STAT_ADDR", action)]
    pub stat_addr: Option<SocketAddr>,

    /// Recorded change log (JSON lines) to replay; stdin when absent or `-`.
    #[clap(long = "input", env = "BINSYNC_INPUT", action)]
    pub input: Option<PathBuf>,

    /// `json` or `pretty`.
    #[clap(long = "log-format", env = "BINSYNC_LOG_FORMAT", default_value = "json", action)]
    pub log_format: LogFormat,
}

impl Config {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            label: self.label.clone(),
            source: SourceConfig {
                addr: self.addr.clone(),
                user: self.user.clone(),
                password: self.password.clone(),
                charset: self.charset.clone(),
                server_id: self.server_id,
                flavor: self.flavor,
                skip_no_pk_table: self.skip_no_pk_table,
                subscribe_table_regex: self.subscribe_table_regex.clone(),
            },
            data_dir: self.data_dir.clone(),
            batch_size: self.batch_size,
            flush_interval: self.flush_interval,
            channel_capacity: self.channel_capacity,
            publish_tables: self.publish_tables.clone(),
        }
    }
}
