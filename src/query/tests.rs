//! Query Module Tests
//!
//! Exercises `RingQuery` as implemented by `RingMember`, on rings built
//! in-process.
//!
//! ## Test Scopes
//! - **Key/Value Semantics**: Round trips, overwrites and deletes from any member.
//! - **Concurrency**: Many writers on a multi-member ring lose no update.
//! - **Ring-wide Reads**: Value listing and member enumeration.
//! - **Scenarios**: A value written on a singleton survives a join.

#[cfg(test)]
mod tests {
    use crate::config::RingConfig;
    use crate::error::RingError;
    use crate::lifecycle::create_standalone_ring;
    use crate::query::contract::RingQuery;
    use crate::ring::member::RingMember;
    use crate::ring::peer::{Directory, PeerConnector};
    use std::sync::Arc;

    fn connector() -> Arc<PeerConnector> {
        PeerConnector::new(
            "127.0.0.1:7100".parse().unwrap(),
            Directory::new(),
            RingConfig::default(),
        )
    }

    async fn five_member_ring() -> Vec<Arc<RingMember>> {
        let connector = connector();
        let first = create_standalone_ring("A", connector.clone()).unwrap();
        let mut members = vec![first.clone()];
        for name in ["B", "C", "D", "E"] {
            let member = RingMember::create(name, connector.clone()).unwrap();
            member.join(first.descriptor()).await.unwrap();
            members.push(member);
        }
        members
    }

    // ============================================================
    // KEY/VALUE SEMANTICS
    // ============================================================

    #[tokio::test]
    async fn test_put_get_round_trip_from_any_member() {
        let members = five_member_ring().await;

        members[0].put("apple", "red".to_string()).await.unwrap();

        for member in &members {
            assert_eq!(member.get("apple").await.unwrap(), "red");
        }
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let members = five_member_ring().await;

        members[1].put("k", "v1".to_string()).await.unwrap();
        members[3].put("k", "v2".to_string()).await.unwrap();

        assert_eq!(members[0].get("k").await.unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let members = five_member_ring().await;

        members[2].put("gone", "soon".to_string()).await.unwrap();
        members[4].delete("gone").await.unwrap();

        let err = members[0].get("gone").await.unwrap_err();
        assert_eq!(err, RingError::NotFound("gone".to_string()));
        // Deleting an absent key is not an error.
        members[0].delete("gone").await.unwrap();
    }

    #[tokio::test]
    async fn test_value_lands_on_owner_shard() {
        let members = five_member_ring().await;

        members[0].put("placed", "here".to_string()).await.unwrap();

        let id = members[0].space().derive("placed");
        let mut holders = 0;
        for member in &members {
            if let Some(value) = member.shard().get(id).await {
                assert!(member.owns(id).await);
                assert_eq!(value, "here");
                holders += 1;
            }
        }
        assert_eq!(holders, 1);
    }

    // ============================================================
    // CONCURRENCY
    // ============================================================

    #[tokio::test]
    async fn test_concurrent_puts_lose_nothing() {
        let members = five_member_ring().await;

        let mut handles = Vec::new();
        for i in 0..100 {
            let member = members[i % members.len()].clone();
            handles.push(tokio::spawn(async move {
                member.put(&format!("key{}", i), format!("value{}", i)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for i in 0..100 {
            assert_eq!(
                members[0].get(&format!("key{}", i)).await.unwrap(),
                format!("value{}", i)
            );
        }
        let total: usize = {
            let mut total = 0;
            for member in &members {
                total += member.shard().len().await;
            }
            total
        };
        assert_eq!(total, 100);
    }

    // ============================================================
    // RING-WIDE READS
    // ============================================================

    #[tokio::test]
    async fn test_list_values_covers_every_member() {
        let members = five_member_ring().await;
        for i in 0..30 {
            members[0].put(&format!("key{}", i), format!("value{}", i)).await.unwrap();
        }

        let mut listed = members[3].list_values().await.unwrap();
        listed.sort();
        let mut expected: Vec<String> = (0..30).map(|i| format!("value{}", i)).collect();
        expected.sort();
        assert_eq!(listed, expected);
    }

    #[tokio::test]
    async fn test_enumerate_members_and_probe() {
        let members = five_member_ring().await;

        let listed = members[2].enumerate_members().await.unwrap();
        assert_eq!(listed.len(), 5);
        assert!(listed.windows(2).all(|pair| pair[0].id < pair[1].id));

        assert_eq!(members[4].probe_ring().await.unwrap(), 5);
        members[1].force_routing_refresh().await.unwrap();
    }

    #[tokio::test]
    async fn test_leave_through_query_surface() {
        let members = five_member_ring().await;
        members[0].put("stay", "put".to_string()).await.unwrap();

        for member in &members[1..] {
            RingQuery::leave(&**member).await.unwrap();
        }

        assert_eq!(members[0].enumerate_members().await.unwrap().len(), 1);
        assert_eq!(members[0].get("stay").await.unwrap(), "put");
    }

    // ============================================================
    // SCENARIOS
    // ============================================================

    #[tokio::test]
    async fn test_value_survives_join() {
        let connector = connector();
        let a = create_standalone_ring("A", connector.clone()).unwrap();

        a.put("x", "1".to_string()).await.unwrap();
        assert_eq!(a.get("x").await.unwrap(), "1");

        let b = RingMember::create("B", connector.clone()).unwrap();
        b.join(a.descriptor()).await.unwrap();

        assert_eq!(a.get("x").await.unwrap(), "1");
        assert_eq!(b.get("x").await.unwrap(), "1");
    }
}
