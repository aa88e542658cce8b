use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, RingError};
use crate::identity::space::Identifier;
use crate::ring::member::RingMember;
use crate::ring::peer::RemoteMember;
use crate::ring::types::PeerRef;

/// Key/value operations any member answers for the whole ring.
#[async_trait]
pub trait RingQuery: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: String) -> Result<()>;

    /// Fails with [`RingError::NotFound`] when no value is stored under `key`.
    async fn get(&self, key: &str) -> Result<String>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Every stored value, member by member in identifier order.
    async fn list_values(&self) -> Result<Vec<String>>;

    async fn force_routing_refresh(&self) -> Result<()>;

    async fn enumerate_members(&self) -> Result<Vec<PeerRef>>;

    /// Takes the receiving member out of its ring.
    async fn leave(&self) -> Result<()>;

    /// Sends a probe around the ring and returns its hop count.
    async fn probe_ring(&self) -> Result<usize>;
}

/// Times a key operation is routed before a join or leave in progress is
/// reported to the caller.
const OWNER_ATTEMPTS: u32 = 10;
const OWNER_BACKOFF: Duration = Duration::from_millis(25);

impl RingMember {
    async fn owner_of(&self, id: Identifier) -> Result<Arc<dyn RemoteMember>> {
        let owner = self.lookup_owner(id, 0).await?;
        tracing::debug!("Key {} owned by {}", id, owner);
        self.handle(&owner)
    }

    /// Runs `op` at the owner of `key`. An owner that has handed the key on
    /// since the lookup answers `NotOwner`, and the key is routed again.
    async fn at_owner<T, F, Fut>(&self, key: &str, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn RemoteMember>, Identifier) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let id = self.space().derive(key);
        let mut attempt = 1;
        loop {
            match op(self.owner_of(id).await?, id).await {
                Err(RingError::NotOwner { member, .. }) if attempt < OWNER_ATTEMPTS => {
                    tracing::debug!(
                        "Key {:?} moved away from {}, routing again ({}/{})",
                        key,
                        member,
                        attempt,
                        OWNER_ATTEMPTS
                    );
                    tokio::time::sleep(OWNER_BACKOFF * attempt).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl RingQuery for RingMember {
    async fn put(&self, key: &str, value: String) -> Result<()> {
        self.at_owner(key, |owner, id| {
            let value = value.clone();
            async move { owner.store(id, value).await }
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<String> {
        self.at_owner(key, |owner, id| async move { owner.fetch(id).await })
            .await?
            .ok_or_else(|| RingError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.at_owner(key, |owner, id| async move { owner.remove(id).await })
            .await
    }

    async fn list_values(&self) -> Result<Vec<String>> {
        let mut values = Vec::new();
        for member in self.enumerate_ring().await? {
            values.extend(self.handle(&member)?.values().await?);
        }
        Ok(values)
    }

    async fn force_routing_refresh(&self) -> Result<()> {
        self.refresh_routing().await
    }

    async fn enumerate_members(&self) -> Result<Vec<PeerRef>> {
        self.enumerate_ring().await
    }

    async fn leave(&self) -> Result<()> {
        RingMember::leave(self).await
    }

    async fn probe_ring(&self) -> Result<usize> {
        self.start_probe().await
    }
}
