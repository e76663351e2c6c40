//! Configuration for a replikv node
//!
//! Values are resolved, lowest priority first, from built-in defaults, an
//! optional TOML file and `REPLIKV_*` environment variables. The binary
//! applies CLI flags on top.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "replikv.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "REPLIKV";

/// Role this node plays, fixed for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Master,
    SyncReplica,
    AsyncReplica,
}

impl NodeRole {
    pub fn is_master(&self) -> bool {
        matches!(self, NodeRole::Master)
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::SyncReplica => write!(f, "sync_replica"),
            NodeRole::AsyncReplica => write!(f, "async_replica"),
        }
    }
}

impl std::str::FromStr for NodeRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "master" => Ok(NodeRole::Master),
            "sync_replica" => Ok(NodeRole::SyncReplica),
            "async_replica" => Ok(NodeRole::AsyncReplica),
            other => Err(Error::InvalidConfig(format!("unknown node role: {}", other))),
        }
    }
}

/// Storage engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Memtable + WAL + segment files
    Lsm,
    /// Plain in-memory map with no log to ship
    Memory,
}

impl StorageKind {
    /// Does this engine keep a write-ahead log that can be shipped to replicas?
    pub fn has_log(&self) -> bool {
        matches!(self, StorageKind::Lsm)
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageKind::Lsm => write!(f, "lsm"),
            StorageKind::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StorageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "lsm" => Ok(StorageKind::Lsm),
            "memory" => Ok(StorageKind::Memory),
            other => Err(Error::InvalidConfig(format!(
                "unknown storage kind: {}",
                other
            ))),
        }
    }
}

/// WAL sync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalSyncPolicy {
    /// fsync after every write (safest, slowest)
    Always,
    /// Flush the buffer after every write, leave fsync to the OS
    Interval,
    /// Never sync explicitly (fastest, least safe)
    Never,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bind address for the HTTP RPC surface
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    #[serde(default = "default_role")]
    pub role: NodeRole,

    #[serde(default = "default_storage")]
    pub storage: StorageKind,

    /// Shared secret for subscribe and replicated writes
    #[serde(default = "default_credential")]
    pub credential: String,

    /// Directory for segment files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory for the WAL; `data_dir` when unset
    #[serde(default)]
    pub wal_dir: Option<PathBuf>,

    #[serde(default = "default_wal_name")]
    pub wal_name: String,

    #[serde(default = "default_wal_sync")]
    pub wal_sync: WalSyncPolicy,

    /// Memtable size that triggers a flush to a new segment
    #[serde(default = "default_max_memtable_entries")]
    pub max_memtable_entries: usize,

    /// Cron expression or `@every <duration>`
    #[serde(default = "default_compaction_schedule")]
    pub compaction_schedule: String,

    #[serde(default = "default_async_sync_schedule")]
    pub async_sync_schedule: String,

    /// Deadline for a single replication push
    #[serde(default = "default_push_timeout_ms")]
    pub push_timeout_ms: u64,

    /// Extra attempts after a failed push
    #[serde(default = "default_push_retries")]
    pub push_retries: u32,

    /// First retry delay, doubled on every attempt
    #[serde(default = "default_push_backoff_ms")]
    pub push_backoff_ms: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_http_addr() -> String {
    "127.0.0.1:7001".to_string()
}
fn default_role() -> NodeRole {
    NodeRole::Master
}
fn default_storage() -> StorageKind {
    StorageKind::Lsm
}
fn default_credential() -> String {
    "1234".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("db")
}
fn default_wal_name() -> String {
    "wal".to_string()
}
fn default_wal_sync() -> WalSyncPolicy {
    WalSyncPolicy::Always
}
fn default_max_memtable_entries() -> usize {
    5
}
fn default_compaction_schedule() -> String {
    "0 */1 * * *".to_string()
}
fn default_async_sync_schedule() -> String {
    "* * * * *".to_string()
}
fn default_push_timeout_ms() -> u64 {
    5_000
}
fn default_push_retries() -> u32 {
    2
}
fn default_push_backoff_ms() -> u64 {
    100
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            role: default_role(),
            storage: default_storage(),
            credential: default_credential(),
            data_dir: default_data_dir(),
            wal_dir: None,
            wal_name: default_wal_name(),
            wal_sync: default_wal_sync(),
            max_memtable_entries: default_max_memtable_entries(),
            compaction_schedule: default_compaction_schedule(),
            async_sync_schedule: default_async_sync_schedule(),
            push_timeout_ms: default_push_timeout_ms(),
            push_retries: default_push_retries(),
            push_backoff_ms: default_push_backoff_ms(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from the given TOML file (if it exists) and `REPLIKV_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let settings = config::Config::builder()
            .add_source(config::File::from(file).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later at bind or flush time.
    pub fn validate(&self) -> Result<()> {
        self.http_socket_addr()?;
        if self.max_memtable_entries == 0 {
            return Err(Error::InvalidConfig(
                "max_memtable_entries must be at least 1".into(),
            ));
        }
        if self.wal_name.trim().is_empty() {
            return Err(Error::InvalidConfig("wal_name must not be empty".into()));
        }
        Ok(())
    }

    pub fn http_socket_addr(&self) -> Result<SocketAddr> {
        self.http_addr.parse().map_err(|e| {
            Error::InvalidConfig(format!("invalid http_addr {}: {}", self.http_addr, e))
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.wal_dir
            .as_deref()
            .unwrap_or(&self.data_dir)
            .join(format!("{}.log", self.wal_name))
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    pub fn push_backoff(&self) -> Duration {
        Duration::from_millis(self.push_backoff_ms)
    }
}
