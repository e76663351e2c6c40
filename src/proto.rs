//! Wire messages for the replikv RPC surface (JSON over HTTP)

use crate::common::Code;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Route paths, shared by the server router and the client
pub mod routes {
    pub const KV: &str = "/v1/kv/:key";
    pub const SUBSCRIBE: &str = "/v1/replication/subscribe";
    pub const APPLY: &str = "/v1/replication/apply";
    pub const HEALTH: &str = "/health";

    pub fn kv(key: &str) -> String {
        format!("/v1/kv/{}", crate::common::encode_key(key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRequest {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Address the master should push to (`host:port` or a full URL)
    pub address: String,
    #[serde(default)]
    pub asynchronous: bool,
    pub credential: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyBatchRequest {
    pub entries: BTreeMap<String, String>,
    pub credential: String,
}

/// Empty success body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: Code,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub role: String,
    pub storage: String,
    pub replicas: usize,
    pub version: String,
}
