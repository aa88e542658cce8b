//! Finger table: ring-doubling routing shortcuts.

use crate::error::{Result, RingError};
use crate::identity::space::{Identifier, in_interval};

use super::types::PeerRef;

/// Routing shortcuts built from a sorted membership snapshot.
///
/// Entries keep construction order: the owner first, then the members at
/// offsets 1, 2, 4, 8, ... from the owner's position in the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerTable {
    entries: Vec<PeerRef>,
    epoch: u64,
    ring_size: usize,
}

impl FingerTable {
    /// Table of a member that has not seen any rebuild yet.
    pub fn solo(me: &PeerRef) -> Self {
        Self {
            entries: vec![me.clone()],
            epoch: 0,
            ring_size: 1,
        }
    }

    /// Builds the table for `me` from the full membership sorted by identifier.
    pub fn build(me: &PeerRef, sorted_members: &[PeerRef], epoch: u64) -> Result<Self> {
        let n = sorted_members.len();
        let position = sorted_members
            .iter()
            .position(|m| m.same_member(me))
            .ok_or_else(|| {
                RingError::RingInconsistency(format!(
                    "membership snapshot of {} members does not contain {}",
                    n, me
                ))
            })?;

        let mut entries = vec![me.clone()];
        let mut step = 1;
        while step < n {
            let finger = &sorted_members[(position + step) % n];
            if !entries.iter().any(|e| e.same_member(finger)) {
                entries.push(finger.clone());
            }
            step *= 2;
        }

        Ok(Self {
            entries,
            epoch,
            ring_size: n,
        })
    }

    pub fn entries(&self) -> &[PeerRef] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Ring size of the snapshot this table was built from.
    pub fn ring_size(&self) -> usize {
        self.ring_size
    }

    /// Finger to route through for `key`: the first `f_i` with
    /// `key` in `(f_i, f_{i+1}]`, or the last finger when none matches.
    pub fn preceding(&self, key: Identifier) -> Option<&PeerRef> {
        self.entries
            .windows(2)
            .find(|pair| in_interval(key, pair[0].id, pair[1].id))
            .map(|pair| &pair[0])
            .or_else(|| self.entries.last())
    }
}
