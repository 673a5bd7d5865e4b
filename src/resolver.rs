//! Membership graph resolver.
//!
//! Computes direct neighbors and transitive closures over the edge
//! store in either direction. The resolver holds no state of its own;
//! every answer is a function of the edge set at query time.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{MembershipError, MembershipResult};
use crate::store::{EdgeStore, EntityStore, MembershipStore};
use crate::types::NodeRef;

/// Which way to follow membership edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// member -> group: the groups a node belongs to.
    Ancestors,
    /// group -> member: the members a group contains.
    Descendants,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ancestors => write!(f, "ancestors"),
            Self::Descendants => write!(f, "descendants"),
        }
    }
}

/// How far to follow edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    /// One hop.
    Direct,
    /// Full closure.
    Transitive,
}

/// Membership graph resolver.
///
/// ## Algorithm
///
/// 1. Mark the start node visited (it is never reported)
/// 2. Seed a FIFO queue with the start node
/// 3. While the queue is not empty:
///    - Check cancellation
///    - Pop a node and fetch its one-hop neighbors from the edge store
///    - Report and enqueue each neighbor not yet visited
/// 4. Return neighbors in discovery order
///
/// Visited nodes are keyed by (kind, id), so cycles, diamonds and self
/// edges are each expanded at most once. Users are leaves when walking
/// descendants.
pub struct GraphResolver<S: MembershipStore> {
    store: Arc<S>,
}

impl<S: MembershipStore> GraphResolver<S> {
    /// Create a resolver over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolve `start` in `direction` to the given `depth`.
    ///
    /// Fails with `NotFound` if `start` does not exist, and with
    /// `Validation` when asking for descendants of a user.
    pub async fn resolve(
        &self,
        start: &NodeRef,
        direction: Direction,
        depth: Depth,
        cancel: &CancellationToken,
    ) -> MembershipResult<Vec<NodeRef>> {
        if direction == Direction::Descendants && start.is_user() {
            return Err(MembershipError::Validation(format!(
                "{} cannot have members",
                start.describe()
            )));
        }

        let exists = self.store.contains(start).await
            .map_err(MembershipError::from_store)?;
        if !exists {
            return Err(MembershipError::NotFound(start.clone()));
        }

        match depth {
            Depth::Direct => self.neighbors(start, direction).await,
            Depth::Transitive => self.closure(start, direction, cancel).await,
        }
    }

    /// One-hop lookup straight against the edge store.
    ///
    /// This is the base lookup the closure is built from. It does not
    /// check that `node` exists. A user has no descendants.
    pub async fn neighbors(&self, node: &NodeRef, direction: Direction) -> MembershipResult<Vec<NodeRef>> {
        match direction {
            Direction::Ancestors => {
                let groups = self.store.direct_groups_of(node).await
                    .map_err(MembershipError::from_store)?;
                Ok(groups.into_iter().map(NodeRef::group).collect())
            }
            Direction::Descendants => {
                if node.is_user() {
                    return Ok(Vec::new());
                }
                self.store.direct_members_of(&node.id).await
                    .map_err(MembershipError::from_store)
            }
        }
    }

    /// Breadth-first closure from `start`, excluding `start` itself.
    ///
    /// Does not check that `start` exists.
    pub async fn closure(
        &self,
        start: &NodeRef,
        direction: Direction,
        cancel: &CancellationToken,
    ) -> MembershipResult<Vec<NodeRef>> {
        let mut visited: HashSet<NodeRef> = HashSet::new();
        let mut queue: VecDeque<NodeRef> = VecDeque::new();
        let mut reached: Vec<NodeRef> = Vec::new();
        let mut expanded = 0usize;

        visited.insert(start.clone());
        queue.push_back(start.clone());

        while let Some(node) = queue.pop_front() {
            if cancel.is_cancelled() {
                tracing::debug!(
                    start = %start,
                    direction = %direction,
                    expanded,
                    reached = reached.len(),
                    "Traversal cancelled"
                );
                return Err(MembershipError::Cancelled);
            }

            expanded += 1;
            for next in self.neighbors(&node, direction).await? {
                if visited.insert(next.clone()) {
                    reached.push(next.clone());
                    // Only groups are expanded past the start node
                    if next.is_group() {
                        queue.push_back(next);
                    }
                }
            }
        }

        tracing::debug!(
            start = %start,
            direction = %direction,
            expanded,
            reached = reached.len(),
            "Closure resolved"
        );

        Ok(reached)
    }

    /// Get a reference to the store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: MembershipStore> Clone for GraphResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::store::InMemoryMembershipStore;
    use crate::types::{Group, MembershipEdge, NewUser};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn build_store(users: &[&str], groups: &[&str], edges: &[(NodeRef, &str)]) -> Arc<InMemoryMembershipStore> {
        let store = InMemoryMembershipStore::new();
        for u in users {
            let user = NewUser::new(*u, format!("{}@example.com", u))
                .into_user(Utc::now())
                .unwrap();
            store.insert_user(user).await.unwrap();
        }
        for g in groups {
            store.insert_group(Group::new(*g, Utc::now()).unwrap()).await.unwrap();
        }
        for (member, group) in edges {
            store.add_edge(&MembershipEdge::new(member.clone(), *group)).await.unwrap();
        }
        Arc::new(store)
    }

    fn ids(nodes: &[NodeRef]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_linear_chain_ancestors() {
        let store = build_store(
            &["alice"],
            &["a", "b", "c"],
            &[
                (NodeRef::user("alice"), "a"),
                (NodeRef::group("a"), "b"),
                (NodeRef::group("b"), "c"),
            ],
        ).await;
        let resolver = GraphResolver::new(store);
        let cancel = CancellationToken::new();

        let direct = resolver
            .resolve(&NodeRef::user("alice"), Direction::Ancestors, Depth::Direct, &cancel)
            .await.unwrap();
        assert_eq!(direct, vec![NodeRef::group("a")]);

        let all = resolver
            .resolve(&NodeRef::user("alice"), Direction::Ancestors, Depth::Transitive, &cancel)
            .await.unwrap();
        assert_eq!(ids(&all), vec!["a", "b", "c"]);
        assert!(all.iter().all(NodeRef::is_group));
    }

    #[tokio::test]
    async fn test_two_cycle_terminates() {
        let store = build_store(
            &[],
            &["a", "b"],
            &[(NodeRef::group("a"), "b"), (NodeRef::group("b"), "a")],
        ).await;
        let resolver = GraphResolver::new(store);
        let cancel = CancellationToken::new();

        let up = resolver
            .resolve(&NodeRef::group("a"), Direction::Ancestors, Depth::Transitive, &cancel)
            .await.unwrap();
        assert_eq!(up, vec![NodeRef::group("b")]);

        let down = resolver
            .resolve(&NodeRef::group("a"), Direction::Descendants, Depth::Transitive, &cancel)
            .await.unwrap();
        assert_eq!(down, vec![NodeRef::group("b")]);
    }

    #[tokio::test]
    async fn test_self_membership_excluded() {
        let store = build_store(
            &["u"],
            &["g"],
            &[(NodeRef::group("g"), "g"), (NodeRef::user("u"), "g")],
        ).await;
        let resolver = GraphResolver::new(store);
        let cancel = CancellationToken::new();

        let down = resolver
            .resolve(&NodeRef::group("g"), Direction::Descendants, Depth::Transitive, &cancel)
            .await.unwrap();
        assert_eq!(down, vec![NodeRef::user("u")]);

        // The direct lookup still reports the stored self edge
        let direct = resolver
            .resolve(&NodeRef::group("g"), Direction::Descendants, Depth::Direct, &cancel)
            .await.unwrap();
        assert_eq!(direct, vec![NodeRef::user("u"), NodeRef::group("g")]);
    }

    #[tokio::test]
    async fn test_diamond_reports_once() {
        //       top
        //      /   \
        //   left   right
        //      \   /
        //      alice
        let store = build_store(
            &["alice"],
            &["left", "right", "top"],
            &[
                (NodeRef::user("alice"), "left"),
                (NodeRef::user("alice"), "right"),
                (NodeRef::group("left"), "top"),
                (NodeRef::group("right"), "top"),
            ],
        ).await;
        let resolver = GraphResolver::new(store);
        let cancel = CancellationToken::new();

        let up = resolver
            .resolve(&NodeRef::user("alice"), Direction::Ancestors, Depth::Transitive, &cancel)
            .await.unwrap();
        assert_eq!(ids(&up), vec!["left", "right", "top"]);

        let down = resolver
            .resolve(&NodeRef::group("top"), Direction::Descendants, Depth::Transitive, &cancel)
            .await.unwrap();
        assert_eq!(
            down,
            vec![NodeRef::group("left"), NodeRef::group("right"), NodeRef::user("alice")]
        );
    }

    #[tokio::test]
    async fn test_user_and_group_with_same_name() {
        // Group "ops" contains user "ops"; they must not alias.
        let store = build_store(&["ops"], &["ops"], &[(NodeRef::user("ops"), "ops")]).await;
        let resolver = GraphResolver::new(store);
        let cancel = CancellationToken::new();

        let down = resolver
            .resolve(&NodeRef::group("ops"), Direction::Descendants, Depth::Transitive, &cancel)
            .await.unwrap();
        assert_eq!(down, vec![NodeRef::user("ops")]);

        let up = resolver
            .resolve(&NodeRef::user("ops"), Direction::Ancestors, Depth::Transitive, &cancel)
            .await.unwrap();
        assert_eq!(up, vec![NodeRef::group("ops")]);
    }

    #[tokio::test]
    async fn test_missing_start_is_not_found() {
        let store = build_store(&[], &[], &[]).await;
        let resolver = GraphResolver::new(store);
        let cancel = CancellationToken::new();

        let err = resolver
            .resolve(&NodeRef::user("ghost"), Direction::Ancestors, Depth::Transitive, &cancel)
            .await.unwrap_err();
        assert_eq!(err, MembershipError::NotFound(NodeRef::user("ghost")));
    }

    #[tokio::test]
    async fn test_descendants_of_user_rejected() {
        let store = build_store(&["alice"], &[], &[]).await;
        let resolver = GraphResolver::new(store);
        let cancel = CancellationToken::new();

        let err = resolver
            .resolve(&NodeRef::user("alice"), Direction::Descendants, Depth::Direct, &cancel)
            .await.unwrap_err();
        assert!(matches!(err, MembershipError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cancelled_traversal() {
        let store = build_store(&[], &["a", "b"], &[(NodeRef::group("a"), "b")]).await;
        let resolver = GraphResolver::new(store);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = resolver
            .resolve(&NodeRef::group("a"), Direction::Ancestors, Depth::Transitive, &cancel)
            .await.unwrap_err();
        assert_eq!(err, MembershipError::Cancelled);

        // Direct lookups never traverse, so they ignore the token
        let direct = resolver
            .resolve(&NodeRef::group("a"), Direction::Ancestors, Depth::Direct, &cancel)
            .await.unwrap();
        assert_eq!(direct, vec![NodeRef::group("b")]);
    }

    /// Store that cancels a token on its n-th forward lookup.
    struct CancelOnLookup {
        inner: Arc<InMemoryMembershipStore>,
        token: CancellationToken,
        cancel_at: usize,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl EntityStore for CancelOnLookup {
        type Error = std::convert::Infallible;

        async fn insert_user(&self, user: crate::types::User) -> Result<bool, Self::Error> {
            self.inner.insert_user(user).await
        }
        async fn insert_group(&self, group: Group) -> Result<bool, Self::Error> {
            self.inner.insert_group(group).await
        }
        async fn get_user(&self, username: &str) -> Result<Option<crate::types::User>, Self::Error> {
            self.inner.get_user(username).await
        }
        async fn get_group(&self, group_name: &str) -> Result<Option<Group>, Self::Error> {
            self.inner.get_group(group_name).await
        }
        async fn get_groups(&self, names: &[String]) -> Result<Vec<Group>, Self::Error> {
            self.inner.get_groups(names).await
        }
        async fn list_users(&self) -> Result<Vec<crate::types::User>, Self::Error> {
            self.inner.list_users().await
        }
        async fn list_groups(&self) -> Result<Vec<Group>, Self::Error> {
            self.inner.list_groups().await
        }
    }

    #[async_trait]
    impl EdgeStore for CancelOnLookup {
        type Error = std::convert::Infallible;

        async fn add_edge(&self, edge: &MembershipEdge) -> Result<bool, Self::Error> {
            self.inner.add_edge(edge).await
        }
        async fn direct_groups_of(&self, node: &NodeRef) -> Result<Vec<String>, Self::Error> {
            if self.lookups.fetch_add(1, Ordering::SeqCst) + 1 == self.cancel_at {
                self.token.cancel();
            }
            self.inner.direct_groups_of(node).await
        }
        async fn direct_members_of(&self, group_name: &str) -> Result<Vec<NodeRef>, Self::Error> {
            self.inner.direct_members_of(group_name).await
        }
        async fn edge_count(&self) -> Result<usize, Self::Error> {
            self.inner.edge_count().await
        }
    }

    #[async_trait]
    impl MembershipStore for CancelOnLookup {
        async fn clear(&self) -> Result<(), std::convert::Infallible> {
            self.inner.clear().await
        }
    }

    #[tokio::test]
    async fn test_cancellation_between_expansions() {
        // alice -> g0 -> g1 -> ... -> g5
        let names: Vec<String> = (0..6).map(|i| format!("g{}", i)).collect();
        let mut edges = vec![(NodeRef::user("alice"), "g0")];
        for pair in names.windows(2) {
            edges.push((NodeRef::group(pair[0].clone()), pair[1].as_str()));
        }
        let group_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let inner = build_store(&["alice"], &group_refs, &edges).await;

        let token = CancellationToken::new();
        let store = Arc::new(CancelOnLookup {
            inner,
            token: token.clone(),
            cancel_at: 2,
            lookups: AtomicUsize::new(0),
        });
        let resolver = GraphResolver::new(Arc::clone(&store));

        let err = resolver
            .resolve(&NodeRef::user("alice"), Direction::Ancestors, Depth::Transitive, &token)
            .await.unwrap_err();
        assert_eq!(err, MembershipError::Cancelled);
        // Expanded alice and g0, then stopped before g1
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);

        // The same walk completes with a fresh token
        store.lookups.store(0, Ordering::SeqCst);
        let all = resolver
            .resolve(&NodeRef::user("alice"), Direction::Ancestors, Depth::Transitive, &CancellationToken::new())
            .await.unwrap();
        assert_eq!(all.len(), 6);
    }

    #[tokio::test]
    async fn test_resolution_is_deterministic() {
        let store = build_store(
            &["u1", "u2"],
            &["g1", "g2", "g3"],
            &[
                (NodeRef::user("u2"), "g1"),
                (NodeRef::user("u1"), "g1"),
                (NodeRef::group("g3"), "g1"),
                (NodeRef::group("g2"), "g1"),
                (NodeRef::user("u1"), "g2"),
            ],
        ).await;
        let resolver = GraphResolver::new(store);
        let cancel = CancellationToken::new();

        let first = resolver
            .resolve(&NodeRef::group("g1"), Direction::Descendants, Depth::Transitive, &cancel)
            .await.unwrap();
        for _ in 0..20 {
            let again = resolver
                .resolve(&NodeRef::group("g1"), Direction::Descendants, Depth::Transitive, &cancel)
                .await.unwrap();
            assert_eq!(first, again);
        }
        assert_eq!(
            first,
            vec![
                NodeRef::user("u1"),
                NodeRef::user("u2"),
                NodeRef::group("g2"),
                NodeRef::group("g3"),
            ]
        );
    }
}
