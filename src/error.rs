//! Error types shared by every ring operation.
//!
//! Each variant carries a stable wire tag ([`ErrorKind`]) so a failure raised on
//! one member can cross the HTTP transport and be rebuilt on the caller's side.

use serde::{Deserialize, Serialize};

use crate::identity::space::Identifier;

pub type Result<T> = std::result::Result<T, RingError>;

/// Errors produced by ring membership, routing and storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    /// A remote member could not be reached or did not answer in time.
    #[error("member {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },

    /// The requested key is not stored anywhere on the ring.
    #[error("key not found: {0}")]
    NotFound(String),

    /// Malformed input from a client or an invalid configuration value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A walk or lookup did not terminate, or a snapshot contradicts the ring.
    #[error("ring inconsistency: {0}")]
    RingInconsistency(String),

    /// No member is registered under the requested name.
    #[error("no member bound under name {0}")]
    NotBound(String),

    /// A compare-and-set on a ring link observed a different member than expected.
    #[error("stale link: expected {expected}, found {actual}")]
    StaleLink {
        expected: Identifier,
        actual: Identifier,
    },

    /// A shard operation reached a member whose range no longer covers the key.
    #[error("{member} does not own key {key}")]
    NotOwner { key: Identifier, member: String },

    /// A remote member answered with something we could not interpret.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Wire tag for [`RingError`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unreachable,
    NotFound,
    InvalidArgument,
    RingInconsistency,
    NotBound,
    StaleLink,
    NotOwner,
    Transport,
}

/// Body of every non-2xx response served by the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
    /// Identifiers involved in a [`RingError::StaleLink`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<(Identifier, Identifier)>,
    /// Key of a [`RingError::NotOwner`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Identifier>,
    /// Peer named in a [`RingError::Unreachable`] or [`RingError::NotOwner`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
}

impl RingError {
    pub fn unreachable(peer: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unreachable {
            peer: peer.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreachable { .. } => ErrorKind::Unreachable,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::RingInconsistency(_) => ErrorKind::RingInconsistency,
            Self::NotBound(_) => ErrorKind::NotBound,
            Self::StaleLink { .. } => ErrorKind::StaleLink,
            Self::NotOwner { .. } => ErrorKind::NotOwner,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Whether the failure means the remote side never handled the call.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }

    pub fn to_response(&self) -> ErrorResponse {
        let mut body = ErrorResponse {
            kind: self.kind(),
            message: self.to_string(),
            link: None,
            key: None,
            peer: None,
        };
        match self {
            Self::StaleLink { expected, actual } => body.link = Some((*expected, *actual)),
            Self::NotOwner { key, member } => {
                body.key = Some(*key);
                body.peer = Some(member.clone());
            }
            Self::Unreachable { peer, reason } => {
                body.peer = Some(peer.clone());
                body.message = reason.clone();
            }
            Self::NotFound(m)
            | Self::InvalidArgument(m)
            | Self::RingInconsistency(m)
            | Self::NotBound(m)
            | Self::Transport(m) => body.message = m.clone(),
        }
        body
    }

    pub fn from_response(resp: ErrorResponse) -> Self {
        match resp.kind {
            ErrorKind::Unreachable => Self::Unreachable {
                peer: resp.peer.unwrap_or_default(),
                reason: resp.message,
            },
            ErrorKind::NotFound => Self::NotFound(resp.message),
            ErrorKind::InvalidArgument => Self::InvalidArgument(resp.message),
            ErrorKind::RingInconsistency => Self::RingInconsistency(resp.message),
            ErrorKind::NotBound => Self::NotBound(resp.message),
            ErrorKind::StaleLink => match resp.link {
                Some((expected, actual)) => Self::StaleLink { expected, actual },
                None => Self::Transport(resp.message),
            },
            ErrorKind::NotOwner => match (resp.key, resp.peer) {
                (Some(key), Some(member)) => Self::NotOwner { key, member },
                _ => Self::Transport(resp.message),
            },
            ErrorKind::Transport => Self::Transport(resp.message),
        }
    }
}
