use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

use crate::identity::space::Identifier;

/// Stable reference to a ring member: its name, its ring position and the
/// server that hosts it.
///
/// Ring links are stored as `PeerRef`s and resolved to a callable handle only
/// when a call is made, so members never hold references to each other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PeerRef {
    pub name: String,
    pub id: Identifier,
    pub addr: SocketAddr,
}

impl PeerRef {
    pub fn same_member(&self, other: &PeerRef) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.name, self.id, self.addr)
    }
}

/// A member's successor and predecessor, always read and written together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Links {
    pub predecessor: PeerRef,
    pub successor: PeerRef,
}

impl Links {
    pub fn singleton(me: &PeerRef) -> Self {
        Self {
            predecessor: me.clone(),
            successor: me.clone(),
        }
    }
}

/// Snapshot of one member as seen by a ring walk.
///
/// Both links come from the same read of the member's link lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RingView {
    pub member: PeerRef,
    pub predecessor: PeerRef,
    pub successor: PeerRef,
    /// Epoch of the routing table the member currently routes with.
    pub epoch: u64,
}

impl RingView {
    pub fn is_singleton(&self) -> bool {
        self.successor.same_member(&self.member)
    }
}

/// Which ring link a compare-and-set targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkSide {
    Successor,
    Predecessor,
}

impl fmt::Display for LinkSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Successor => write!(f, "successor"),
            Self::Predecessor => write!(f, "predecessor"),
        }
    }
}
