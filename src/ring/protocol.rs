//! Member RPC Protocol
//!
//! Endpoints and Data Transfer Objects used between ring members.
//!
//! Every route is scoped by the name the target member is registered under, so
//! one server can host several members. Paths are built with [`member_path`].

use serde::{Deserialize, Serialize};

use super::types::{LinkSide, PeerRef};
use crate::identity::space::Identifier;

// --- API Endpoints ---

/// Prefix shared by all member-to-member routes.
pub const RING_PREFIX: &str = "/ring";
/// Snapshot of a member's links and routing epoch.
pub const ENDPOINT_VIEW: &str = "/view";
/// Compare-and-set of a member's successor.
pub const ENDPOINT_SUCCESSOR: &str = "/successor";
/// Compare-and-set of a member's predecessor.
pub const ENDPOINT_PREDECESSOR: &str = "/predecessor";
/// One routing step of an owner lookup.
pub const ENDPOINT_LOOKUP: &str = "/lookup";
/// Installation of a freshly computed finger table.
pub const ENDPOINT_FINGERS: &str = "/fingers";
/// Ring-wide routing table rebuild.
pub const ENDPOINT_REFRESH: &str = "/refresh";
/// Extraction of the entries a new predecessor takes over.
pub const ENDPOINT_HANDOVER: &str = "/handover";
/// Bulk merge of handed-over entries.
pub const ENDPOINT_ABSORB: &str = "/absorb";
/// Compare-and-delete of entries deleted during a leave.
pub const ENDPOINT_RETRACT: &str = "/retract";
/// Owner-checked shard read (no routing).
pub const ENDPOINT_FETCH: &str = "/fetch";
/// Owner-checked shard write (no routing).
pub const ENDPOINT_STORE: &str = "/store";
/// Owner-checked shard delete (no routing).
pub const ENDPOINT_REMOVE: &str = "/remove";
/// All values held by the member's shard.
pub const ENDPOINT_VALUES: &str = "/values";
/// Diagnostic probe forwarded around the ring.
pub const ENDPOINT_PROBE: &str = "/probe";
/// Ring enumeration started at the member.
pub const ENDPOINT_MEMBERS: &str = "/members";

pub fn member_path(name: &str, endpoint: &str) -> String {
    format!("{}/{}{}", RING_PREFIX, name, endpoint)
}

// --- Data Transfer Objects ---

/// Replace `side` with `new` only if it still points at `expected`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceLinkRequest {
    pub side: LinkSide,
    pub expected: Identifier,
    pub new: PeerRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupRequest {
    pub key: Identifier,
    /// Routing steps taken so far.
    pub hops: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupResponse {
    pub owner: PeerRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingersRequest {
    pub members: Vec<PeerRef>,
    pub epoch: u64,
}

/// Entries in `(from, to]` move to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoverRequest {
    pub from: Identifier,
    pub to: Identifier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardEntry {
    pub key: Identifier,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntriesPayload {
    pub entries: Vec<ShardEntry>,
}

impl EntriesPayload {
    pub fn from_pairs(pairs: Vec<(Identifier, String)>) -> Self {
        Self {
            entries: pairs
                .into_iter()
                .map(|(key, value)| ShardEntry { key, value })
                .collect(),
        }
    }

    pub fn into_pairs(self) -> Vec<(Identifier, String)> {
        self.entries.into_iter().map(|e| (e.key, e.value)).collect()
    }
}

/// How a receiver merges handed-over entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Incoming values win.
    Overwrite,
    /// Values already present win.
    KeepExisting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbsorbRequest {
    pub mode: MergeMode,
    pub entries: Vec<ShardEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRequest {
    pub key: Identifier,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub key: Identifier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuesResponse {
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub origin: Identifier,
    pub hops: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub hops: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembersResponse {
    pub members: Vec<PeerRef>,
}
