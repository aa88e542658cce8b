//! Chord Ring Library
//!
//! A ring-based distributed hash table. Members derive identifiers from their
//! names, partition the identifier space among themselves and route key lookups
//! to the member responsible for each key.
//!
//! ## Architecture Modules
//!
//! - **`identity`**: Identifier derivation (SHA-256, truncated to the ring width) and
//!   the wrapping interval test every ownership decision relies on.
//! - **`storage`**: The per-member shard holding the keys a member owns, with the
//!   range extraction and merge helpers used when keys change hands.
//! - **`ring`**: Membership and routing. Join and leave splices, key handover, finger
//!   tables, ring-wide rebuilds and the member-to-member transport.
//! - **`query`**: The key/value surface (`RingQuery`) every member exposes to clients.
//! - **`server`**: The HTTP router that serves all members registered in a process.
//! - **`lifecycle`**: Creating a standalone ring or joining an existing one.
//! - **`config`** / **`error`**: Runtime tunables and the shared error type.

pub mod config;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod query;
pub mod ring;
pub mod server;
pub mod storage;
