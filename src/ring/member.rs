//! Ring Member
//!
//! One participant of the ring: its identifier, its links to the neighbouring
//! members, its finger table and the shard of keys it owns.
//!
//! ## Locking
//! - `links` holds successor and predecessor together, so every read is a
//!   consistent snapshot and every splice replaces one link atomically.
//! - `fingers` is replaced wholesale by routing rebuilds.
//! - `lifecycle` serializes this member's own join and leave.
//! - Owned reads and writes run under the read side of `links`, so a splice
//!   or the final drain of a leave never interleaves with one.
//!
//! No lock is held while a remote member is being called.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::fingers::FingerTable;
use super::peer::{LocalPeer, PeerConnector, RemoteMember};
use super::protocol::MergeMode;
use super::types::{LinkSide, Links, PeerRef, RingView};
use crate::config::RingConfig;
use crate::error::{Result, RingError};
use crate::identity::space::{Identifier, IdentitySpace, in_interval};
use crate::storage::shard::Shard;

/// Routing hops allowed on top of twice the known ring size.
const HOP_SLACK: usize = 16;

pub struct RingMember {
    me: PeerRef,
    space: IdentitySpace,
    config: RingConfig,
    links: RwLock<Links>,
    fingers: RwLock<FingerTable>,
    shard: Shard,
    lifecycle: Mutex<()>,
    /// Set while a leave hands the shard over; owned writes are refused.
    departing: AtomicBool,
    connector: Arc<PeerConnector>,
    this: Weak<RingMember>,
}

impl RingMember {
    /// Creates a member alone in its own ring and registers it in the
    /// connector's directory.
    pub fn create(name: &str, connector: Arc<PeerConnector>) -> Result<Arc<Self>> {
        if name.is_empty() {
            return Err(RingError::InvalidArgument("member name is empty".into()));
        }
        let config = connector.config().clone();
        let space = IdentitySpace::new(config.capacity)?;
        let me = PeerRef {
            name: name.to_string(),
            id: space.derive(name),
            addr: connector.local_addr(),
        };

        let member = Arc::new_cyclic(|this| Self {
            links: RwLock::new(Links::singleton(&me)),
            fingers: RwLock::new(FingerTable::solo(&me)),
            shard: Shard::new(),
            lifecycle: Mutex::new(()),
            departing: AtomicBool::new(false),
            me,
            space,
            config,
            connector: connector.clone(),
            this: this.clone(),
        });

        connector.directory().register(member.clone())?;
        info!(
            "Created member {} ({})",
            member.me,
            member.space.to_bit_string(member.me.id)
        );
        Ok(member)
    }

    pub fn descriptor(&self) -> &PeerRef {
        &self.me
    }

    pub fn id(&self) -> Identifier {
        self.me.id
    }

    pub fn name(&self) -> &str {
        &self.me.name
    }

    pub fn space(&self) -> &IdentitySpace {
        &self.space
    }

    pub fn shard(&self) -> &Shard {
        &self.shard
    }

    pub async fn links(&self) -> Links {
        self.links.read().await.clone()
    }

    pub async fn fingers(&self) -> FingerTable {
        self.fingers.read().await.clone()
    }

    pub async fn view(&self) -> RingView {
        let links = self.links.read().await.clone();
        let epoch = self.fingers.read().await.epoch();
        RingView {
            member: self.me.clone(),
            predecessor: links.predecessor,
            successor: links.successor,
            epoch,
        }
    }

    /// Whether `key` falls in `(predecessor, self]`.
    pub async fn owns(&self, key: Identifier) -> bool {
        let predecessor = self.links.read().await.predecessor.id;
        in_interval(key, predecessor, self.me.id)
    }

    /// Callable handle for `peer`; calls to this member stay in place.
    pub fn handle(&self, peer: &PeerRef) -> Result<Arc<dyn RemoteMember>> {
        if peer.same_member(&self.me)
            && let Some(me) = self.this.upgrade()
        {
            return Ok(Arc::new(LocalPeer::new(me)));
        }
        self.connector.connect(peer)
    }

    // ============================================================
    // JOIN & LEAVE
    // ============================================================

    /// Joins the ring that `contact` belongs to.
    ///
    /// Walks the ring from `contact` to the pair of members this member falls
    /// between, splices itself in, takes over its key range from the new
    /// successor and rebuilds every routing table.
    pub async fn join(&self, contact: &PeerRef) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        if contact.same_member(&self.me) {
            return Err(RingError::InvalidArgument(format!(
                "{} cannot join through itself",
                self.me
            )));
        }
        if !self.links.read().await.successor.same_member(&self.me) {
            return Err(RingError::InvalidArgument(format!(
                "{} is already part of a ring",
                self.me
            )));
        }

        // Deletes landing here before the handover must win over its entries.
        self.shard.track_deletes().await;
        if let Err(e) = self.splice_and_take_over(contact).await {
            self.shard.stop_tracking().await;
            return Err(e);
        }

        self.refresh_routing().await
    }

    async fn splice_and_take_over(&self, contact: &PeerRef) -> Result<()> {
        let mut attempt = 0;
        let (predecessor, successor) = loop {
            let (predecessor, successor) = self.find_neighbours(contact).await?;
            match self.splice_in(&predecessor, &successor).await {
                Ok(()) => break (predecessor, successor),
                Err(RingError::StaleLink { expected, actual }) => {
                    if attempt >= self.config.splice_retries {
                        return Err(RingError::RingInconsistency(format!(
                            "{} lost {} splice races (last expected {}, found {})",
                            self.me,
                            attempt + 1,
                            expected,
                            actual
                        )));
                    }
                    attempt += 1;
                    warn!(
                        "Join of {} raced with another splice, walking again ({}/{})",
                        self.me, attempt, self.config.splice_retries
                    );
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            "Member {} joined between {} and {}",
            self.me, predecessor, successor
        );

        let handed_over = self
            .handle(&successor)?
            .handover(predecessor.id, self.me.id)
            .await?;
        let received = handed_over.len();

        // A member that joined right behind us owns part of the range now.
        let current_predecessor = self.links.read().await.predecessor.clone();
        let (mine, theirs): (Vec<_>, Vec<_>) = handed_over
            .into_iter()
            .partition(|(k, _)| in_interval(*k, current_predecessor.id, self.me.id));
        if !theirs.is_empty() {
            debug!(
                "Member {} passing {} entries on to {}",
                self.me,
                theirs.len(),
                current_predecessor
            );
            self.handle(&current_predecessor)?
                .absorb(theirs, MergeMode::KeepExisting)
                .await?;
        }

        let added = self.shard.settle_handover(mine).await;
        debug!(
            "Member {} took over {} of {} entries from {}",
            self.me, added, received, successor
        );

        Ok(())
    }

    /// Walks successor links from `contact` until reaching the pair
    /// `(member, successor)` whose interval contains this member's identifier.
    ///
    /// Consecutive views chain `(member, successor]` intervals, so the walk
    /// cannot step over a slot even while other members splice in.
    async fn find_neighbours(&self, contact: &PeerRef) -> Result<(PeerRef, PeerRef)> {
        let mut current = self.handle(contact)?.view().await?;
        let start = current.member.id;

        for _ in 0..self.config.max_walk_hops {
            for taken in [&current.member, &current.successor] {
                if taken.id == self.me.id {
                    return Err(RingError::InvalidArgument(format!(
                        "identifier {} of {} is already held by {}",
                        self.me.id, self.me.name, taken
                    )));
                }
            }
            if in_interval(self.me.id, current.member.id, current.successor.id) {
                return Ok((current.member, current.successor));
            }

            current = self.handle(&current.successor)?.view().await?;
            if current.member.id == start {
                return Err(RingError::RingInconsistency(format!(
                    "walked the whole ring from {} without finding a slot for {}",
                    contact, self.me
                )));
            }
        }

        Err(RingError::RingInconsistency(format!(
            "join walk from {} exceeded {} hops",
            contact, self.config.max_walk_hops
        )))
    }

    async fn splice_in(&self, predecessor: &PeerRef, successor: &PeerRef) -> Result<()> {
        *self.links.write().await = Links {
            predecessor: predecessor.clone(),
            successor: successor.clone(),
        };

        let spliced: Result<()> = async {
            let next = self.handle(successor)?;
            next.replace_link(LinkSide::Predecessor, predecessor.id, self.me.clone())
                .await?;

            let prev = match self.handle(predecessor) {
                Ok(prev) => prev,
                Err(e) => {
                    self.undo_link(&next, LinkSide::Predecessor, self.me.id, predecessor).await;
                    return Err(e);
                }
            };
            if let Err(e) = prev
                .replace_link(LinkSide::Successor, successor.id, self.me.clone())
                .await
            {
                self.undo_link(&next, LinkSide::Predecessor, self.me.id, predecessor).await;
                return Err(e);
            }
            Ok(())
        }
        .await;

        if spliced.is_err() {
            *self.links.write().await = Links::singleton(&self.me);
        }
        spliced
    }

    async fn undo_link(
        &self,
        target: &Arc<dyn RemoteMember>,
        side: LinkSide,
        current: Identifier,
        restore: &PeerRef,
    ) {
        if let Err(e) = target
            .replace_link(side, current, restore.clone())
            .await
        {
            tracing::error!(
                "Could not restore {} of {} to {}: {}",
                side,
                target.peer(),
                restore,
                e
            );
        }
    }

    /// Leaves the ring: hands every entry to the successor, splices the
    /// neighbours together and becomes a singleton ring again.
    ///
    /// Writes keep landing here while the bulk copy is in flight. Then the
    /// member stops accepting writes, sends what changed since the copy and
    /// only afterwards lets its neighbours route around it.
    pub async fn leave(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        let links = self.links.read().await.clone();
        if links.successor.same_member(&self.me) {
            debug!("Member {} is alone, nothing to hand over", self.me);
            return Ok(());
        }

        let next = self.handle(&links.successor)?;
        let prev = self.handle(&links.predecessor)?;

        let copied: HashMap<Identifier, String> = self.shard.entries().await.into_iter().collect();
        let copied_count = copied.len();
        next.absorb(
            copied.iter().map(|(k, v)| (*k, v.clone())).collect(),
            MergeMode::Overwrite,
        )
        .await?;

        // Owner checks hold the links lock, so every write already admitted
        // has landed once this lock is granted.
        let remaining: HashMap<Identifier, String> = {
            let _links = self.links.write().await;
            self.departing.store(true, Ordering::Release);
            self.shard.drain().await.into_iter().collect()
        };

        let handed: Result<()> = async {
            let late: Vec<(Identifier, String)> = remaining
                .iter()
                .filter(|(k, v)| copied.get(*k) != Some(*v))
                .map(|(k, v)| (*k, v.clone()))
                .collect();
            let removed: Vec<(Identifier, String)> = copied
                .iter()
                .filter(|(k, _)| !remaining.contains_key(*k))
                .map(|(k, v)| (*k, v.clone()))
                .collect();
            if !late.is_empty() {
                debug!("Member {} forwarding {} late entries", self.me, late.len());
                next.absorb(late, MergeMode::Overwrite).await?;
            }
            if !removed.is_empty() {
                debug!("Member {} retracting {} deleted entries", self.me, removed.len());
                next.retract(removed).await?;
            }

            next.replace_link(LinkSide::Predecessor, self.me.id, links.predecessor.clone())
                .await?;
            if let Err(e) = prev
                .replace_link(LinkSide::Successor, self.me.id, links.successor.clone())
                .await
            {
                self.undo_link(&next, LinkSide::Predecessor, links.predecessor.id, &self.me)
                    .await;
                return Err(e);
            }
            Ok(())
        }
        .await;

        if let Err(e) = handed {
            self.take_back(&next, &links).await;
            return Err(e);
        }

        {
            let mut current = self.links.write().await;
            *current = Links::singleton(&self.me);
            self.departing.store(false, Ordering::Release);
        }
        {
            let mut fingers = self.fingers.write().await;
            let epoch = fingers.epoch();
            *fingers = FingerTable::build(&self.me, std::slice::from_ref(&self.me), epoch)?;
        }

        info!(
            "Member {} left the ring, {} entries handed to {}",
            self.me, copied_count, links.successor
        );

        next.refresh_routing().await
    }

    /// Reclaims this member's range from the successor after a failed leave.
    async fn take_back(&self, next: &Arc<dyn RemoteMember>, links: &Links) {
        match next.handover(links.predecessor.id, self.me.id).await {
            Ok(entries) => self.shard.put_all(entries).await,
            Err(e) => tracing::error!(
                "Member {} could not take its entries back from {}: {}",
                self.me,
                links.successor,
                e
            ),
        }
        let _links = self.links.write().await;
        self.departing.store(false, Ordering::Release);
    }

    /// Compare-and-set of one link. Succeeds without change when the link
    /// already points at `new`.
    pub async fn replace_link(&self, side: LinkSide, expected: Identifier, new: PeerRef) -> Result<()> {
        let mut links = self.links.write().await;
        let slot = match side {
            LinkSide::Successor => &mut links.successor,
            LinkSide::Predecessor => &mut links.predecessor,
        };

        if slot.same_member(&new) {
            return Ok(());
        }
        if slot.id != expected {
            return Err(RingError::StaleLink {
                expected,
                actual: slot.id,
            });
        }

        debug!("Member {}: {} {} -> {}", self.me, side, slot, new);
        *slot = new;
        Ok(())
    }

    /// Removes and returns the entries a new predecessor takes over.
    pub async fn handover(&self, from: Identifier, to: Identifier) -> Vec<(Identifier, String)> {
        let taken = self.shard.take_range(from, to).await;
        debug!(
            "Member {} handing over {} entries in ({}, {}]",
            self.me,
            taken.len(),
            from,
            to
        );
        taken
    }

    pub async fn absorb(&self, entries: Vec<(Identifier, String)>, mode: MergeMode) {
        match mode {
            MergeMode::Overwrite => self.shard.put_all(entries).await,
            MergeMode::KeepExisting => {
                self.shard.put_missing(entries).await;
            }
        }
    }

    /// Drops entries the successor got from a leave but that were deleted
    /// before the leave finished. Entries overwritten since are kept.
    pub async fn retract(&self, entries: Vec<(Identifier, String)>) -> usize {
        let dropped = self.shard.retract(entries).await;
        debug!("Member {} retracted {} entries", self.me, dropped);
        dropped
    }

    // ============================================================
    // OWNED ENTRIES
    // ============================================================

    /// Reads `key` from the shard, provided this member still owns it.
    pub async fn fetch(&self, key: Identifier) -> Result<Option<String>> {
        let links = self.links.read().await;
        self.check_owner(key, &links)?;
        Ok(self.shard.get(key).await)
    }

    /// Writes `key`, provided this member still owns it. The links stay
    /// locked until the write lands, so a splice cannot move the key away
    /// half way.
    pub async fn store(&self, key: Identifier, value: String) -> Result<()> {
        let links = self.links.read().await;
        self.check_owner(key, &links)?;
        self.shard.put(key, value).await;
        Ok(())
    }

    pub async fn remove(&self, key: Identifier) -> Result<()> {
        let links = self.links.read().await;
        self.check_owner(key, &links)?;
        self.shard.delete(key).await;
        Ok(())
    }

    fn check_owner(&self, key: Identifier, links: &Links) -> Result<()> {
        if !self.departing.load(Ordering::Acquire)
            && in_interval(key, links.predecessor.id, self.me.id)
        {
            Ok(())
        } else {
            Err(RingError::NotOwner {
                key,
                member: self.me.name.clone(),
            })
        }
    }

    // ============================================================
    // ROUTING
    // ============================================================

    /// Finds the member owning `key`, forwarding the question around the ring.
    ///
    /// Small tables fall back to the successor; otherwise the lookup jumps to
    /// the successor of the finger that closest precedes `key`.
    pub async fn lookup_owner(&self, key: Identifier, hops: usize) -> Result<PeerRef> {
        let links = self.links.read().await.clone();
        if in_interval(key, links.predecessor.id, self.me.id) {
            debug!("Lookup {} answered by {} after {} hops", key, self.me, hops);
            return Ok(self.me.clone());
        }

        let fingers = self.fingers.read().await.clone();
        let limit = (fingers.ring_size().max(2) * 2 + HOP_SLACK).min(self.config.max_walk_hops);
        if hops >= limit {
            return Err(RingError::RingInconsistency(format!(
                "lookup of {} still unresolved at {} after {} hops",
                key, self.me, hops
            )));
        }

        let next = if fingers.len() < 3 {
            links.successor.clone()
        } else {
            match fingers.preceding(key) {
                Some(finger) => self.successor_of(finger, &links).await,
                None => links.successor.clone(),
            }
        };

        debug!("Lookup {} at {} forwarded to {}", key, self.me, next);
        self.handle(&next)?.lookup_owner(key, hops + 1).await
    }

    /// Successor of a finger, or our own successor when the finger is stale.
    async fn successor_of(&self, finger: &PeerRef, links: &Links) -> PeerRef {
        if finger.same_member(&self.me) {
            return links.successor.clone();
        }

        let view = match self.handle(finger) {
            Ok(handle) => handle.view().await,
            Err(e) => Err(e),
        };

        match view {
            Ok(view) if view.is_singleton() => {
                warn!(
                    "Finger {} of {} has left the ring, routing via successor",
                    finger, self.me
                );
                links.successor.clone()
            }
            Ok(view) if view.successor.same_member(&self.me) => links.successor.clone(),
            Ok(view) => view.successor,
            Err(e) => {
                warn!(
                    "Finger {} of {} unusable ({}), routing via successor",
                    finger, self.me, e
                );
                links.successor.clone()
            }
        }
    }

    /// Installs the finger table for a membership snapshot.
    ///
    /// Snapshots older than the installed table are ignored.
    pub async fn compute_fingers(&self, sorted_members: &[PeerRef], epoch: u64) -> Result<()> {
        let table = FingerTable::build(&self.me, sorted_members, epoch)?;

        let mut fingers = self.fingers.write().await;
        if epoch < fingers.epoch() {
            debug!(
                "Member {} ignoring fingers of epoch {} (has {})",
                self.me,
                epoch,
                fingers.epoch()
            );
            return Ok(());
        }
        debug!(
            "Member {} installed {} fingers for epoch {}",
            self.me,
            table.len(),
            epoch
        );
        *fingers = table;
        Ok(())
    }

    /// Rebuilds the finger table of every member from one ring snapshot.
    pub async fn refresh_routing(&self) -> Result<()> {
        let views = self.walk_ring().await?;
        let epoch = views.iter().map(|v| v.epoch).max().unwrap_or(0) + 1;
        let members = sorted_members(views);

        for member in &members {
            self.handle(member)?
                .compute_fingers(members.clone(), epoch)
                .await?;
        }

        info!(
            "Routing rebuilt by {}: {} members, epoch {}",
            self.me,
            members.len(),
            epoch
        );
        Ok(())
    }

    // ============================================================
    // RING WALKS
    // ============================================================

    /// Visits every member once, starting and ending at this member.
    async fn walk_ring(&self) -> Result<Vec<RingView>> {
        let first = self.view().await;
        let mut next = first.successor.clone();
        let mut seen: HashSet<Identifier> = HashSet::from([self.me.id]);
        let mut views = vec![first];

        while !next.same_member(&self.me) {
            if views.len() >= self.config.max_walk_hops {
                return Err(RingError::RingInconsistency(format!(
                    "ring walk from {} exceeded {} members",
                    self.me, self.config.max_walk_hops
                )));
            }
            if !seen.insert(next.id) {
                return Err(RingError::RingInconsistency(format!(
                    "ring walk from {} reached {} twice",
                    self.me, next
                )));
            }

            let view = self.handle(&next)?.view().await?;
            next = view.successor.clone();
            views.push(view);
        }

        Ok(views)
    }

    /// Every member of the ring, sorted by identifier.
    pub async fn enumerate_ring(&self) -> Result<Vec<PeerRef>> {
        Ok(sorted_members(self.walk_ring().await?))
    }

    /// Diagnostic walk: forwards around the ring until it returns to `origin`
    /// and reports the number of hops taken.
    pub async fn probe(&self, origin: Identifier, hops: usize) -> Result<usize> {
        if self.me.id == origin && hops > 0 {
            info!("Probe returned to {} after {} hops", self.me, hops);
            return Ok(hops);
        }
        if hops >= self.config.max_walk_hops {
            return Err(RingError::RingInconsistency(format!(
                "probe from {} did not return within {} hops",
                origin, hops
            )));
        }

        let successor = self.links.read().await.successor.clone();
        info!("{}: forwarding probe to {}", self.me.name, successor.name);
        self.handle(&successor)?.probe(origin, hops + 1).await
    }

    /// Starts a probe at this member.
    pub async fn start_probe(&self) -> Result<usize> {
        self.probe(self.me.id, 0).await
    }
}

fn sorted_members(views: Vec<RingView>) -> Vec<PeerRef> {
    let mut members: Vec<PeerRef> = views.into_iter().map(|v| v.member).collect();
    members.sort_by_key(|m| m.id);
    members
}
