//! Ring Membership & Routing Module
//!
//! Implements the Chord-style ring that members form and the routing that finds
//! the member owning a key.
//!
//! ## Core Mechanisms
//! - **Links**: Every member knows its successor and predecessor. Links are member
//!   descriptors (`PeerRef`), resolved to a callable handle per call.
//! - **Join / Leave**: Linear walk to the joining member's slot, compare-and-set
//!   splices at the neighbours, then handover of the affected key range.
//! - **Routing**: Ownership check, successor fallback for small rings, and
//!   finger-table jumps once a member has three or more fingers.
//! - **Rebuilds**: Any join or leave triggers a synchronous, ring-wide finger table
//!   rebuild stamped with a new topology epoch.
//!
//! ## Submodules
//! - **`member`**: The `RingMember` state machine.
//! - **`fingers`**: Finger table construction and lookup.
//! - **`peer`**: The `RemoteMember` call interface, in-process handles and the directory.
//! - **`http_peer`**: HTTP implementation of `RemoteMember`.
//! - **`protocol`** / **`handlers`**: Member-to-member wire contract and its server side.

pub mod fingers;
pub mod handlers;
pub mod http_peer;
pub mod member;
pub mod peer;
pub mod protocol;
pub mod types;

#[cfg(test)]
mod tests;
