//! Callable handles to ring members.
//!
//! Ring links are plain [`PeerRef`]s. Before calling a member, the caller asks the
//! [`PeerConnector`] for a handle: members registered in this process's
//! [`Directory`] are called in place, everything else goes over HTTP.

use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use super::http_peer::HttpPeer;
use super::member::RingMember;
use super::protocol::MergeMode;
use super::types::{LinkSide, PeerRef, RingView};
use crate::config::RingConfig;
use crate::error::{Result, RingError};
use crate::identity::space::Identifier;

/// Operations one ring member can invoke on another.
#[async_trait]
pub trait RemoteMember: Send + Sync {
    /// The member this handle reaches.
    fn peer(&self) -> &PeerRef;

    async fn view(&self) -> Result<RingView>;

    /// Compare-and-set of one ring link.
    async fn replace_link(&self, side: LinkSide, expected: Identifier, new: PeerRef)
    -> Result<()>;

    async fn lookup_owner(&self, key: Identifier, hops: usize) -> Result<PeerRef>;

    async fn compute_fingers(&self, members: Vec<PeerRef>, epoch: u64) -> Result<()>;

    async fn refresh_routing(&self) -> Result<()>;

    /// Removes and returns the entries in `(from, to]`.
    async fn handover(&self, from: Identifier, to: Identifier) -> Result<Vec<(Identifier, String)>>;

    async fn absorb(&self, entries: Vec<(Identifier, String)>, mode: MergeMode) -> Result<()>;

    /// Deletes each entry whose stored value still equals the given one.
    async fn retract(&self, entries: Vec<(Identifier, String)>) -> Result<()>;

    /// Owner-checked shard read; fails with `NotOwner` outside the member's range.
    async fn fetch(&self, key: Identifier) -> Result<Option<String>>;

    async fn store(&self, key: Identifier, value: String) -> Result<()>;

    async fn remove(&self, key: Identifier) -> Result<()>;

    async fn values(&self) -> Result<Vec<String>>;

    async fn probe(&self, origin: Identifier, hops: usize) -> Result<usize>;

    async fn enumerate(&self) -> Result<Vec<PeerRef>>;
}

/// Handle to a member living in this process.
pub struct LocalPeer {
    peer: PeerRef,
    member: Arc<RingMember>,
}

impl LocalPeer {
    pub fn new(member: Arc<RingMember>) -> Self {
        Self {
            peer: member.descriptor().clone(),
            member,
        }
    }
}

#[async_trait]
impl RemoteMember for LocalPeer {
    fn peer(&self) -> &PeerRef {
        &self.peer
    }

    async fn view(&self) -> Result<RingView> {
        Ok(self.member.view().await)
    }

    async fn replace_link(
        &self,
        side: LinkSide,
        expected: Identifier,
        new: PeerRef,
    ) -> Result<()> {
        self.member.replace_link(side, expected, new).await
    }

    async fn lookup_owner(&self, key: Identifier, hops: usize) -> Result<PeerRef> {
        self.member.lookup_owner(key, hops).await
    }

    async fn compute_fingers(&self, members: Vec<PeerRef>, epoch: u64) -> Result<()> {
        self.member.compute_fingers(&members, epoch).await
    }

    async fn refresh_routing(&self) -> Result<()> {
        self.member.refresh_routing().await
    }

    async fn handover(&self, from: Identifier, to: Identifier) -> Result<Vec<(Identifier, String)>> {
        Ok(self.member.handover(from, to).await)
    }

    async fn absorb(&self, entries: Vec<(Identifier, String)>, mode: MergeMode) -> Result<()> {
        self.member.absorb(entries, mode).await;
        Ok(())
    }

    async fn retract(&self, entries: Vec<(Identifier, String)>) -> Result<()> {
        self.member.retract(entries).await;
        Ok(())
    }

    async fn fetch(&self, key: Identifier) -> Result<Option<String>> {
        self.member.fetch(key).await
    }

    async fn store(&self, key: Identifier, value: String) -> Result<()> {
        self.member.store(key, value).await
    }

    async fn remove(&self, key: Identifier) -> Result<()> {
        self.member.remove(key).await
    }

    async fn values(&self) -> Result<Vec<String>> {
        Ok(self.member.shard().all_values().await)
    }

    async fn probe(&self, origin: Identifier, hops: usize) -> Result<usize> {
        self.member.probe(origin, hops).await
    }

    async fn enumerate(&self) -> Result<Vec<PeerRef>> {
        self.member.enumerate_ring().await
    }
}

/// Name -> member registry of one process.
#[derive(Default)]
pub struct Directory {
    members: DashMap<String, Arc<RingMember>>,
}

impl Directory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, member: Arc<RingMember>) -> Result<()> {
        let name = member.descriptor().name.clone();
        match self.members.entry(name) {
            dashmap::mapref::entry::Entry::Occupied(slot) => Err(RingError::InvalidArgument(
                format!("a member is already bound under {}", slot.key()),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                tracing::info!("Registered member {}", member.descriptor());
                slot.insert(member);
                Ok(())
            }
        }
    }

    pub fn deregister(&self, name: &str) -> Option<Arc<RingMember>> {
        let removed = self.members.remove(name).map(|(_, member)| member);
        if removed.is_some() {
            tracing::info!("Deregistered member {}", name);
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<RingMember>> {
        self.members.get(name).map(|entry| entry.value().clone())
    }

    /// Like [`Directory::get`], failing with `NotBound`.
    pub fn lookup(&self, name: &str) -> Result<Arc<RingMember>> {
        self.get(name)
            .ok_or_else(|| RingError::NotBound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Turns member descriptors into callable handles.
pub struct PeerConnector {
    local_addr: SocketAddr,
    directory: Arc<Directory>,
    http_client: reqwest::Client,
    config: RingConfig,
}

impl PeerConnector {
    pub fn new(local_addr: SocketAddr, directory: Arc<Directory>, config: RingConfig) -> Arc<Self> {
        Arc::new(Self {
            local_addr,
            directory,
            http_client: reqwest::Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_default(),
            config,
        })
    }

    /// Address advertised for members hosted here.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    pub fn config(&self) -> &RingConfig {
        &self.config
    }

    pub fn connect(&self, peer: &PeerRef) -> Result<Arc<dyn RemoteMember>> {
        if peer.addr != self.local_addr {
            return Ok(Arc::new(HttpPeer::new(
                peer.clone(),
                self.http_client.clone(),
                &self.config,
            )));
        }

        match self.directory.get(&peer.name) {
            Some(member) if member.descriptor().id == peer.id => Ok(Arc::new(LocalPeer::new(member))),
            Some(member) => Err(RingError::unreachable(
                peer.to_string(),
                format!("name now bound to {}", member.descriptor()),
            )),
            None => Err(RingError::unreachable(peer.to_string(), "not bound")),
        }
    }

    /// Resolves the member registered as `name` on the server at `addr`.
    pub async fn resolve(&self, addr: SocketAddr, name: &str) -> Result<Arc<dyn RemoteMember>> {
        if addr == self.local_addr {
            return Ok(Arc::new(LocalPeer::new(self.directory.lookup(name)?)));
        }

        let view =
            HttpPeer::fetch_view(&self.http_client, addr, name, &self.config).await?;
        Ok(Arc::new(HttpPeer::new(
            view.member,
            self.http_client.clone(),
            &self.config,
        )))
    }

    /// [`PeerConnector::resolve`] for a `(host, port, name)` triple.
    pub async fn resolve_host(&self, host: &str, port: u16, name: &str) -> Result<Arc<dyn RemoteMember>> {
        let addr = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| RingError::unreachable(format!("{}:{}", host, port), e))?
            .next()
            .ok_or_else(|| {
                RingError::unreachable(format!("{}:{}", host, port), "host has no address")
            })?;
        self.resolve(addr, name).await
    }
}
