//! Storage Module
//!
//! Implements the in-memory store that each ring member owns.
//!
//! ## Core Concepts
//! - **Shard**: One member's slice of the key space, keyed by ring identifier.
//! - **Ownership**: A member stores exactly the keys in `(predecessor, self]`; the
//!   ring layer decides which shard a key lands in.
//! - **Handover**: Range extraction and merge helpers used when members join or leave.

pub mod shard;
