//! Common utilities and types shared across replikv

pub mod config;
pub mod error;
pub mod logging;
pub mod tracing_middleware;
pub mod utils;

pub use config::{Config, NodeRole, StorageKind, WalSyncPolicy};
pub use error::{Code, Error, Result};
pub use utils::{crc32, encode_key, parse_duration};
