//! Client Query Protocol
//!
//! Routes are scoped by the name of the member that receives the request.

use serde::{Deserialize, Serialize};

use crate::ring::types::PeerRef;

// --- API Endpoints ---

pub const KV_PREFIX: &str = "/kv";
pub const ENDPOINT_PUT: &str = "/put";
/// Takes the key as the `key` query parameter.
pub const ENDPOINT_GET: &str = "/get";
pub const ENDPOINT_DELETE: &str = "/delete";
pub const ENDPOINT_VALUES: &str = "/values";
pub const ENDPOINT_REFRESH: &str = "/refresh";
pub const ENDPOINT_MEMBERS: &str = "/members";
pub const ENDPOINT_LEAVE: &str = "/leave";
pub const ENDPOINT_PROBE: &str = "/probe";

pub fn member_path(name: &str, endpoint: &str) -> String {
    format!("{}/{}{}", KV_PREFIX, name, endpoint)
}

// --- Data Transfer Objects ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutRequest {
    pub key: String,
    pub value: String,
}

/// Query string of a get. Keys are arbitrary strings, including empty ones
/// and ones starting with '/'.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyQuery {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResponse {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuesResponse {
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembersResponse {
    pub members: Vec<PeerRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub hops: usize,
}
