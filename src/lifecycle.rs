//! Entry points that bring a member to life: alone in a new ring, or joined to
//! a ring reachable through a named contact.

use std::sync::Arc;

use crate::error::Result;
use crate::ring::member::RingMember;
use crate::ring::peer::PeerConnector;

/// Creates `local_name` as the only member of a new ring.
pub fn create_standalone_ring(
    local_name: &str,
    connector: Arc<PeerConnector>,
) -> Result<Arc<RingMember>> {
    RingMember::create(local_name, connector)
}

/// Creates `local_name` and joins it to the ring of `contact_name`, served at
/// `contact_host:contact_port`.
///
/// On failure the new member is unregistered again, so the name can be reused.
pub async fn join_existing_ring(
    local_name: &str,
    connector: Arc<PeerConnector>,
    contact_name: &str,
    contact_host: &str,
    contact_port: u16,
) -> Result<Arc<RingMember>> {
    let member = RingMember::create(local_name, connector.clone())?;

    let joined: Result<()> = async {
        let contact = connector
            .resolve_host(contact_host, contact_port, contact_name)
            .await?;
        member.join(contact.peer()).await
    }
    .await;

    if let Err(e) = joined {
        tracing::error!(
            "{} could not join via {}@{}:{}: {}",
            local_name,
            contact_name,
            contact_host,
            contact_port,
            e
        );
        connector.directory().deregister(local_name);
        return Err(e);
    }
    Ok(member)
}
