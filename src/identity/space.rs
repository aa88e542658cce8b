use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Result, RingError};

/// Position of a member or key on the ring.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(transparent)]
pub struct Identifier(pub u64);

impl Identifier {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Identifier {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// The bounded identifier space shared by every member of one ring.
///
/// A ring sized for `capacity` members keeps `log2(capacity) + 1` bits of the
/// digest, so the space holds `2 * capacity` identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentitySpace {
    capacity: u64,
    bits: u32,
}

impl IdentitySpace {
    pub fn new(capacity: u64) -> Result<Self> {
        if capacity < 2 || !capacity.is_power_of_two() {
            return Err(RingError::InvalidArgument(format!(
                "ring capacity must be a power of two >= 2, got {}",
                capacity
            )));
        }
        let bits = capacity.trailing_zeros() + 1;
        if bits > 63 {
            return Err(RingError::InvalidArgument(format!(
                "ring capacity {} needs {} identifier bits (max 63)",
                capacity, bits
            )));
        }
        Ok(Self { capacity, bits })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Number of distinct identifiers on the ring.
    pub fn modulus(&self) -> u64 {
        1u64 << self.bits
    }

    /// Derives the identifier of `name`.
    ///
    /// The digest is SHA-256 rather than the classic SHA-1. Any cryptographic
    /// digest spreads names evenly; what matters is that every member of a
    /// ring uses the same one, since identifiers are compared across members.
    ///
    /// Distinct names may collide when the space is smaller than the input
    /// domain; callers accept that for keys.
    pub fn derive(&self, name: &str) -> Identifier {
        let digest = Sha256::digest(name.as_bytes());
        let mut low = [0u8; 8];
        low.copy_from_slice(&digest[digest.len() - 8..]);
        let raw = u64::from_be_bytes(low);
        Identifier(raw & (self.modulus() - 1))
    }

    /// Renders `id` as a fixed-width bit-string.
    pub fn to_bit_string(&self, id: Identifier) -> String {
        format!("{:0width$b}", id.0, width = self.bits as usize)
    }
}

/// Ring-wrapping half-open membership test: is `key` in `(from, to]`?
///
/// `from == to` covers the whole ring, which is what a singleton member owns.
pub fn in_interval(key: Identifier, from: Identifier, to: Identifier) -> bool {
    if from < to {
        from < key && key <= to
    } else if from > to {
        key > from || key <= to
    } else {
        true
    }
}
