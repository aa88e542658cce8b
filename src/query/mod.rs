//! Client Query Module
//!
//! The key/value surface every ring member exposes to clients.
//!
//! A request can reach any member. The member hashes the raw key into the
//! identifier space, routes to the owner with `lookup_owner` and applies the
//! operation to the owner's shard.
//!
//! ## Submodules
//! - **`contract`**: The `RingQuery` trait and its implementation for `RingMember`.
//! - **`protocol`** / **`handlers`**: HTTP routes and DTOs of the client surface.
//! - **`client`**: `QueryClient`, the HTTP implementation of `RingQuery` used by
//!   remote consoles and benchmarks.

pub mod client;
pub mod contract;
pub mod handlers;
pub mod protocol;

#[cfg(test)]
mod tests;
