//! Ring Module Tests
//!
//! Validates membership and routing on rings built in-process through a shared
//! directory. No HTTP is involved: every member is reached through a `LocalPeer`.
//!
//! ## Test Scopes
//! - **Topology**: Successor walks, link symmetry and ring enumeration.
//! - **Ownership & Routing**: Unique owners, finger tables, stale fingers and epochs.
//! - **Owned Entries**: Shard calls outside a member's range are refused.
//! - **Lifecycle**: Join and leave keep every stored key, collisions and misuse are rejected.
//! - **Failures**: Members that disappear surface as `Unreachable`.

#[cfg(test)]
mod tests {
    use crate::config::RingConfig;
    use crate::error::RingError;
    use crate::identity::space::{Identifier, in_interval};
    use crate::query::contract::RingQuery;
    use crate::ring::fingers::FingerTable;
    use crate::ring::member::RingMember;
    use crate::ring::peer::{Directory, PeerConnector};
    use crate::ring::protocol::MergeMode;
    use crate::ring::types::{LinkSide, PeerRef};
    use std::collections::HashSet;
    use std::net::SocketAddr;
    use std::sync::Arc;

    const NAMES: [&str; 5] = ["A", "B", "C", "D", "E"];

    fn local_addr() -> SocketAddr {
        "127.0.0.1:7000".parse().unwrap()
    }

    fn connector_with(config: RingConfig) -> Arc<PeerConnector> {
        PeerConnector::new(local_addr(), Directory::new(), config)
    }

    fn connector() -> Arc<PeerConnector> {
        connector_with(RingConfig::default())
    }

    /// Creates `names[0]` and joins every other name through it, one at a time.
    async fn build_ring(connector: &Arc<PeerConnector>, names: &[&str]) -> Vec<Arc<RingMember>> {
        let first = RingMember::create(names[0], connector.clone()).unwrap();
        let mut members = vec![first.clone()];
        for name in &names[1..] {
            let member = RingMember::create(name, connector.clone()).unwrap();
            member.join(first.descriptor()).await.unwrap();
            members.push(member);
        }
        members
    }

    fn peer(name: &str, id: u64) -> PeerRef {
        PeerRef {
            name: name.to_string(),
            id: Identifier(id),
            addr: local_addr(),
        }
    }

    /// The member that owns `key`, found by asking every member.
    async fn owners_of(members: &[Arc<RingMember>], key: Identifier) -> Vec<PeerRef> {
        let mut owners = Vec::new();
        for member in members {
            if member.owns(key).await {
                owners.push(member.descriptor().clone());
            }
        }
        owners
    }

    // ============================================================
    // SINGLETON RING
    // ============================================================

    #[tokio::test]
    async fn test_new_member_is_singleton() {
        let connector = connector();
        let a = RingMember::create("A", connector.clone()).unwrap();

        let links = a.links().await;
        assert_eq!(links.successor, *a.descriptor());
        assert_eq!(links.predecessor, *a.descriptor());
        assert!(a.view().await.is_singleton());
        assert_eq!(a.fingers().await.len(), 1);

        // A singleton owns the whole ring.
        for raw in [0, 1, a.id().value(), a.space().modulus() - 1] {
            assert!(a.owns(Identifier(raw)).await);
            assert_eq!(a.lookup_owner(Identifier(raw), 0).await.unwrap(), *a.descriptor());
        }
        assert!(connector.directory().get("A").is_some());
    }

    #[tokio::test]
    async fn test_create_rejects_empty_and_duplicate_names() {
        let connector = connector();
        RingMember::create("A", connector.clone()).unwrap();

        assert!(matches!(
            RingMember::create("", connector.clone()),
            Err(RingError::InvalidArgument(_))
        ));
        assert!(matches!(
            RingMember::create("A", connector.clone()),
            Err(RingError::InvalidArgument(_))
        ));
        assert_eq!(connector.directory().len(), 1);
    }

    // ============================================================
    // TOPOLOGY
    // ============================================================

    #[tokio::test]
    async fn test_successor_walk_returns_after_n_hops() {
        let connector = connector();
        let members = build_ring(&connector, &NAMES).await;
        let directory = connector.directory();

        for start in &members {
            let mut current = start.clone();
            let mut visited = HashSet::new();
            for _ in 0..members.len() {
                assert!(visited.insert(current.id()), "member visited twice");
                let next = current.links().await.successor;
                current = directory.get(&next.name).unwrap();
            }
            assert_eq!(current.id(), start.id(), "walk must close after n hops");
            assert_eq!(visited.len(), members.len());
        }
    }

    #[tokio::test]
    async fn test_links_are_symmetric() {
        let connector = connector();
        let members = build_ring(&connector, &NAMES).await;
        let directory = connector.directory();

        for member in &members {
            let successor = directory.get(&member.links().await.successor.name).unwrap();
            assert_eq!(successor.links().await.predecessor, *member.descriptor());
        }
    }

    #[tokio::test]
    async fn test_enumerate_ring_is_sorted_from_any_member() {
        let connector = connector();
        let members = build_ring(&connector, &NAMES).await;

        let mut expected: Vec<PeerRef> = members.iter().map(|m| m.descriptor().clone()).collect();
        expected.sort_by_key(|m| m.id);

        for member in &members {
            assert_eq!(member.enumerate_ring().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_probe_counts_ring_size() {
        let connector = connector();
        let a = RingMember::create("A", connector.clone()).unwrap();
        assert_eq!(a.start_probe().await.unwrap(), 1);

        let members = build_ring(&connector_with(RingConfig::default()), &NAMES).await;
        for member in &members {
            assert_eq!(member.start_probe().await.unwrap(), NAMES.len());
        }
    }

    // ============================================================
    // OWNERSHIP & ROUTING
    // ============================================================

    #[tokio::test]
    async fn test_every_key_has_one_owner_and_lookups_agree() {
        let connector = connector();
        let members = build_ring(&connector, &NAMES).await;

        for i in 0..200 {
            let key = members[0].space().derive(&format!("key{}", i));
            let owners = owners_of(&members, key).await;
            assert_eq!(owners.len(), 1, "key {} owned by {:?}", key, owners);

            for member in &members {
                assert_eq!(member.lookup_owner(key, 0).await.unwrap(), owners[0]);
            }
        }
    }

    #[tokio::test]
    async fn test_members_own_their_own_identifier() {
        let connector = connector();
        let members = build_ring(&connector, &NAMES).await;

        for member in &members {
            assert_eq!(owners_of(&members, member.id()).await, vec![member.descriptor().clone()]);
        }
    }

    #[tokio::test]
    async fn test_ring_fingers_share_one_epoch() {
        let connector = connector();
        let members = build_ring(&connector, &NAMES).await;

        let epoch = members[0].fingers().await.epoch();
        assert!(epoch > 0);
        for member in &members {
            let fingers = member.fingers().await;
            // 5 members: self plus offsets 1, 2 and 4.
            assert_eq!(fingers.len(), 4);
            assert_eq!(fingers.ring_size(), 5);
            assert_eq!(fingers.epoch(), epoch);
            assert_eq!(fingers.entries()[0], *member.descriptor());
        }
    }

    #[test]
    fn test_finger_table_offsets() {
        let sorted: Vec<PeerRef> = (1..=8).map(|i| peer(&format!("n{}", i), i * 10)).collect();

        let table = FingerTable::build(&sorted[2], &sorted, 7).unwrap();
        let ids: Vec<u64> = table.entries().iter().map(|p| p.id.value()).collect();
        assert_eq!(ids, vec![30, 40, 50, 70]);
        assert_eq!(table.epoch(), 7);
        assert_eq!(table.ring_size(), 8);

        // Offsets wrap around the end of the snapshot.
        let table = FingerTable::build(&sorted[6], &sorted, 1).unwrap();
        let ids: Vec<u64> = table.entries().iter().map(|p| p.id.value()).collect();
        assert_eq!(ids, vec![70, 80, 10, 30]);
    }

    #[test]
    fn test_finger_table_sizes() {
        for (n, expected) in [(1, 1), (2, 2), (3, 3), (4, 3), (5, 4), (8, 4), (9, 5)] {
            let sorted: Vec<PeerRef> = (0..n).map(|i| peer(&format!("n{}", i), i as u64)).collect();
            let table = FingerTable::build(&sorted[0], &sorted, 1).unwrap();
            assert_eq!(table.len(), expected, "ring of {}", n);
        }
    }

    #[test]
    fn test_finger_table_requires_self() {
        let sorted = vec![peer("a", 1), peer("b", 2)];

        let err = FingerTable::build(&peer("c", 3), &sorted, 1).unwrap_err();
        assert!(matches!(err, RingError::RingInconsistency(_)));
    }

    #[test]
    fn test_preceding_finger() {
        let sorted: Vec<PeerRef> = (1..=8).map(|i| peer(&format!("n{}", i), i * 10)).collect();
        let table = FingerTable::build(&sorted[2], &sorted, 1).unwrap();

        let preceding = |key: u64| table.preceding(Identifier(key)).unwrap().id.value();
        assert_eq!(preceding(35), 30);
        assert_eq!(preceding(40), 30);
        assert_eq!(preceding(45), 40);
        assert_eq!(preceding(60), 50);
        // Beyond the last finger: route through it.
        assert_eq!(preceding(75), 70);
        assert_eq!(preceding(5), 70);
    }

    #[tokio::test]
    async fn test_older_finger_epoch_is_ignored() {
        let connector = connector();
        let members = build_ring(&connector, &NAMES).await;
        let member = &members[1];
        let me = std::slice::from_ref(member.descriptor());

        let before = member.fingers().await;
        member.compute_fingers(me, before.epoch() - 1).await.unwrap();
        assert_eq!(member.fingers().await, before);

        member.compute_fingers(me, before.epoch() + 5).await.unwrap();
        let after = member.fingers().await;
        assert_eq!(after.len(), 1);
        assert_eq!(after.epoch(), before.epoch() + 5);
    }

    #[tokio::test]
    async fn test_stale_fingers_fall_back_to_successor() {
        let connector = connector();
        let members = build_ring(&connector, &NAMES).await;
        let stale = &members[0];
        let modulus = stale.space().modulus();

        // Members that never existed, placed right after each real member.
        let mut snapshot: Vec<PeerRef> = Vec::new();
        for (i, member) in members.iter().enumerate() {
            snapshot.push(member.descriptor().clone());
            snapshot.push(peer(&format!("ghost-{}", i), (member.id().value() + 1) % modulus));
        }
        snapshot.sort_by_key(|p| p.id);
        let epoch = stale.fingers().await.epoch() + 1;
        stale.compute_fingers(&snapshot, epoch).await.unwrap();
        assert!(stale.fingers().await.entries().iter().any(|f| f.name.starts_with("ghost")));

        for i in 0..100 {
            let key = stale.space().derive(&format!("key{}", i));
            let owners = owners_of(&members, key).await;
            assert_eq!(stale.lookup_owner(key, 0).await.unwrap(), owners[0]);
        }
    }

    // ============================================================
    // LINK COMPARE-AND-SET
    // ============================================================

    #[tokio::test]
    async fn test_replace_link_checks_expected() {
        let connector = connector();
        let a = RingMember::create("A", connector.clone()).unwrap();
        let other = peer("other", 42);

        let err = a
            .replace_link(LinkSide::Successor, Identifier(7), other.clone())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RingError::StaleLink {
                expected: Identifier(7),
                actual: a.id(),
            }
        );

        a.replace_link(LinkSide::Successor, a.id(), other.clone())
            .await
            .unwrap();
        // Replaying the same replacement is a no-op.
        a.replace_link(LinkSide::Successor, a.id(), other.clone())
            .await
            .unwrap();
        assert_eq!(a.links().await.successor, other);
        assert_eq!(a.links().await.predecessor, *a.descriptor());
    }

    #[tokio::test]
    async fn test_handover_takes_only_the_range() {
        let connector = connector();
        let a = RingMember::create("A", connector.clone()).unwrap();
        a.absorb(
            (1..=10).map(|i| (Identifier(i * 10), format!("v{}", i))).collect(),
            MergeMode::Overwrite,
        )
        .await;

        let mut taken = a.handover(Identifier(20), Identifier(50)).await;
        taken.sort();
        let keys: Vec<u64> = taken.iter().map(|(k, _)| k.value()).collect();
        assert_eq!(keys, vec![30, 40, 50]);
        assert_eq!(a.shard().len().await, 7);
    }

    #[tokio::test]
    async fn test_shard_calls_outside_range_are_refused() {
        let connector = connector();
        let members = build_ring(&connector, &["A", "B"]).await;
        let (a, b) = (&members[0], &members[1]);
        let key = b.id();

        let refused = RingError::NotOwner {
            key,
            member: "A".to_string(),
        };
        assert_eq!(a.store(key, "v".to_string()).await.unwrap_err(), refused);
        assert_eq!(a.fetch(key).await.unwrap_err(), refused);
        assert_eq!(a.remove(key).await.unwrap_err(), refused);
        assert!(a.shard().is_empty().await);

        b.store(key, "v".to_string()).await.unwrap();
        assert_eq!(b.fetch(key).await.unwrap(), Some("v".to_string()));
        b.remove(key).await.unwrap();
        assert_eq!(b.fetch(key).await.unwrap(), None);
    }

    // ============================================================
    // JOIN & LEAVE
    // ============================================================

    #[tokio::test]
    async fn test_join_and_leave_preserve_keys() {
        let connector = connector();
        let members = build_ring(&connector, &["A", "B", "C"]).await;
        let a = members[0].clone();

        for i in 0..100 {
            a.put(&format!("key{}", i), format!("value{}", i)).await.unwrap();
        }

        let d = RingMember::create("D", connector.clone()).unwrap();
        d.join(members[2].descriptor()).await.unwrap();
        let e = RingMember::create("E", connector.clone()).unwrap();
        e.join(d.descriptor()).await.unwrap();

        let grown: Vec<Arc<RingMember>> = members.iter().cloned().chain([d.clone(), e.clone()]).collect();
        let mut stored = 0;
        for member in &grown {
            for key in member.shard().keys().await {
                assert!(member.owns(key).await, "{} holds {} it does not own", member.name(), key);
            }
            stored += member.shard().len().await;
        }
        assert_eq!(stored, 100);
        for i in 0..100 {
            assert_eq!(e.get(&format!("key{}", i)).await.unwrap(), format!("value{}", i));
        }

        d.leave().await.unwrap();
        members[1].leave().await.unwrap();

        assert!(d.shard().is_empty().await);
        assert!(members[1].shard().is_empty().await);
        assert_eq!(a.enumerate_ring().await.unwrap().len(), 3);
        for i in 0..100 {
            assert_eq!(a.get(&format!("key{}", i)).await.unwrap(), format!("value{}", i));
            assert_eq!(e.get(&format!("key{}", i)).await.unwrap(), format!("value{}", i));
        }
    }

    #[tokio::test]
    async fn test_leave_resets_member_to_singleton() {
        let connector = connector();
        let members = build_ring(&connector, &NAMES).await;
        let leaving = members[2].clone();

        leaving.leave().await.unwrap();

        assert!(leaving.view().await.is_singleton());
        assert_eq!(leaving.fingers().await.len(), 1);
        let remaining = members[0].enumerate_ring().await.unwrap();
        assert_eq!(remaining.len(), 4);
        assert!(!remaining.contains(leaving.descriptor()));
        for member in members.iter().filter(|m| m.id() != leaving.id()) {
            assert_eq!(member.fingers().await.ring_size(), 4);
            assert_eq!(member.start_probe().await.unwrap(), 4);
        }

        // A member that left can join again.
        leaving.join(members[0].descriptor()).await.unwrap();
        assert_eq!(members[4].enumerate_ring().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_leave_singleton_is_noop() {
        let connector = connector();
        let a = RingMember::create("A", connector.clone()).unwrap();
        a.put("x", "1".to_string()).await.unwrap();

        a.leave().await.unwrap();

        assert!(a.view().await.is_singleton());
        assert_eq!(a.get("x").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn test_two_member_ring_leave() {
        let connector = connector();
        let members = build_ring(&connector, &["A", "B"]).await;
        members[1].put("x", "1".to_string()).await.unwrap();

        members[1].leave().await.unwrap();

        assert!(members[0].view().await.is_singleton());
        assert_eq!(members[0].get("x").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn test_writes_racing_a_leave_are_kept() {
        let connector = connector();
        let members = build_ring(&connector, &NAMES).await;
        for i in 0..60 {
            members[0].put(&format!("key{}", i), "v1".to_string()).await.unwrap();
        }

        let leaving = members[2].clone();
        let leave = tokio::spawn(async move { leaving.leave().await });
        let mut writers = Vec::new();
        for i in 0..60 {
            let member = members[i % 2].clone();
            writers.push(tokio::spawn(async move {
                let key = format!("key{}", i);
                if i < 30 {
                    member.delete(&key).await
                } else {
                    member.put(&key, "v2".to_string()).await
                }
            }));
        }
        leave.await.unwrap().unwrap();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        assert!(members[2].shard().is_empty().await);
        for i in 0..60 {
            let read = members[4].get(&format!("key{}", i)).await;
            if i < 30 {
                assert_eq!(read.unwrap_err(), RingError::NotFound(format!("key{}", i)));
            } else {
                assert_eq!(read.unwrap(), "v2");
            }
        }
    }

    #[tokio::test]
    async fn test_join_misuse_is_rejected() {
        let connector = connector();
        let members = build_ring(&connector, &["A", "B"]).await;

        let err = members[0].join(members[0].descriptor()).await.unwrap_err();
        assert!(matches!(err, RingError::InvalidArgument(_)));

        let err = members[1].join(members[0].descriptor()).await.unwrap_err();
        assert!(matches!(err, RingError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_join_rejects_identifier_collision() {
        // Four identifiers: "m0" and "m1" share one.
        let config = RingConfig {
            capacity: 2,
            ..RingConfig::default()
        };
        let connector = connector_with(config);
        let m0 = RingMember::create("m0", connector.clone()).unwrap();
        let m1 = RingMember::create("m1", connector.clone()).unwrap();
        assert_eq!(m0.id(), m1.id());

        let err = m1.join(m0.descriptor()).await.unwrap_err();
        assert!(matches!(err, RingError::InvalidArgument(_)));
        assert!(m0.view().await.is_singleton());
        assert!(m1.view().await.is_singleton());
    }

    #[tokio::test]
    async fn test_concurrent_joins() {
        let config = RingConfig {
            splice_retries: 8,
            ..RingConfig::default()
        };
        let connector = connector_with(config);
        let a = RingMember::create("A", connector.clone()).unwrap();
        for i in 0..50 {
            a.put(&format!("key{}", i), format!("value{}", i)).await.unwrap();
        }

        let mut handles = Vec::new();
        for name in ["B", "C", "D"] {
            let member = RingMember::create(name, connector.clone()).unwrap();
            let contact = a.descriptor().clone();
            handles.push(tokio::spawn(async move { member.join(&contact).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        a.refresh_routing().await.unwrap();
        assert_eq!(a.enumerate_ring().await.unwrap().len(), 4);
        for i in 0..50 {
            assert_eq!(a.get(&format!("key{}", i)).await.unwrap(), format!("value{}", i));
        }
    }

    // ============================================================
    // FAILURES
    // ============================================================

    #[tokio::test]
    async fn test_vanished_member_surfaces_unreachable() {
        let connector = connector();
        let members = build_ring(&connector, &["A", "B", "C"]).await;

        // C disappears without leaving.
        connector.directory().deregister("C");

        let err = members[0].enumerate_ring().await.unwrap_err();
        assert!(err.is_unreachable(), "got {:?}", err);
        let err = members[0].refresh_routing().await.unwrap_err();
        assert!(err.is_unreachable(), "got {:?}", err);

        let d = RingMember::create("D", connector.clone()).unwrap();
        assert!(d.join(members[0].descriptor()).await.is_err());
    }

    #[tokio::test]
    async fn test_interval_matches_ownership_after_joins() {
        let connector = connector();
        let members = build_ring(&connector, &NAMES).await;

        for member in &members {
            let links = member.links().await;
            assert!(in_interval(member.id(), links.predecessor.id, member.id()));
            assert!(!member.owns(links.predecessor.id).await);
        }
    }
}
