//! Identity Space Module
//!
//! Maps arbitrary member names and client keys onto a bounded identifier ring.
//!
//! ## Core Concepts
//! - **Derivation**: A name is hashed (SHA-256) and the low-order bits of the digest
//!   become its identifier. Members and keys share the same space.
//! - **Ring order**: Identifiers are plain integers compared numerically; the ring
//!   wraps at `2^bits`.
//! - **Intervals**: Ownership is expressed as half-open ring intervals `(from, to]`,
//!   where `from == to` stands for the whole ring.

pub mod space;
