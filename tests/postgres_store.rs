//! PostgreSQL store tests.
//!
//! Run against a scratch database by setting `MEMBERSHIP_TEST_DATABASE_URL`.
//! The tables are truncated, so never point this at real data. Without the
//! variable the test returns early.

#![cfg(feature = "postgres")]

use chrono::Utc;
use membership_graph::store::postgres::PostgresConfig;
use membership_graph::store::{EdgeStore, EntityStore, MembershipStore};
use membership_graph::{Group, MembershipEdge, NewUser, NodeRef, PostgresMembershipStore};

async fn scratch_store() -> Option<PostgresMembershipStore> {
    let url = std::env::var("MEMBERSHIP_TEST_DATABASE_URL").ok()?;
    let store = PostgresMembershipStore::new(PostgresConfig {
        database_url: url,
        max_connections: 2,
        min_connections: 0,
        ..PostgresConfig::from_env()
    })
    .await
    .unwrap();
    store.ensure_schema().await.unwrap();
    store.clear().await.unwrap();
    Some(store)
}

fn group(name: &str) -> Group {
    Group::new(name, Utc::now()).unwrap()
}

#[tokio::test]
async fn test_postgres_store_matches_memory_semantics() {
    let Some(store) = scratch_store().await else {
        eprintln!("MEMBERSHIP_TEST_DATABASE_URL not set, skipping");
        return;
    };

    let alice = NewUser::new("alice", "alice@example.com")
        .with_profile_picture("s3://avatars/alice.png")
        .into_user(Utc::now())
        .unwrap();
    assert!(store.insert_user(alice).await.unwrap());
    assert!(!store.insert_user(
        NewUser::new("alice", "other@example.com").into_user(Utc::now()).unwrap()
    ).await.unwrap());

    // Collation-sensitive names: byte order is "B" < "_x" < "a"
    for name in ["a", "_x", "B"] {
        assert!(store.insert_group(group(name)).await.unwrap());
    }
    assert!(store.insert_user(NewUser::new("B", "b@example.com").into_user(Utc::now()).unwrap()).await.unwrap());

    for name in ["a", "_x", "B"] {
        let edge = MembershipEdge::new(NodeRef::user("alice"), name);
        assert!(store.add_edge(&edge).await.unwrap());
        assert!(!store.add_edge(&edge).await.unwrap());
    }
    store.add_edge(&MembershipEdge::new(NodeRef::group("B"), "a")).await.unwrap();
    store.add_edge(&MembershipEdge::new(NodeRef::user("B"), "a")).await.unwrap();

    assert_eq!(
        store.direct_groups_of(&NodeRef::user("alice")).await.unwrap(),
        vec!["B".to_string(), "_x".to_string(), "a".to_string()]
    );
    // Users first, then groups, each by byte order
    assert_eq!(
        store.direct_members_of("a").await.unwrap(),
        vec![NodeRef::user("B"), NodeRef::user("alice"), NodeRef::group("B")]
    );
    assert_eq!(store.edge_count().await.unwrap(), 5);

    // Creation order for listings, request order for batch lookups
    let listed: Vec<_> = store.list_groups().await.unwrap()
        .into_iter().map(|g| g.group_name).collect();
    assert_eq!(listed, vec!["a", "_x", "B"]);
    let fetched: Vec<_> = store
        .get_groups(&["B".to_string(), "missing".to_string(), "a".to_string()])
        .await.unwrap()
        .into_iter().map(|g| g.group_name).collect();
    assert_eq!(fetched, vec!["B", "a"]);

    let stored = store.get_user("alice").await.unwrap().unwrap();
    assert_eq!(stored.profile_picture_s3_uri(), Some("s3://avatars/alice.png"));
    assert!(store.is_healthy().await);

    store.clear().await.unwrap();
    assert!(store.list_users().await.unwrap().is_empty());
    assert_eq!(store.edge_count().await.unwrap(), 0);
}
