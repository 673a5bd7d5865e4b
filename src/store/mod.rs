//! Membership storage backends.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use crate::types::{Group, MembershipEdge, NodeRef, User};

/// Storage for user and group identities.
///
/// Listing order is creation order. Inserts report whether the
/// identifier was free; duplicate detection is atomic with insertion.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync;

    /// Insert a user. Returns `false` if the username is taken.
    async fn insert_user(&self, user: User) -> Result<bool, Self::Error>;

    /// Insert a group. Returns `false` if the group name is taken.
    async fn insert_group(&self, group: Group) -> Result<bool, Self::Error>;

    /// Fetch a user by username.
    async fn get_user(&self, username: &str) -> Result<Option<User>, Self::Error>;

    /// Fetch a group by name.
    async fn get_group(&self, group_name: &str) -> Result<Option<Group>, Self::Error>;

    /// Fetch multiple groups by name, in the order given. Unknown names are skipped.
    async fn get_groups(&self, names: &[String]) -> Result<Vec<Group>, Self::Error>;

    /// All users in creation order.
    async fn list_users(&self) -> Result<Vec<User>, Self::Error>;

    /// All groups in creation order.
    async fn list_groups(&self) -> Result<Vec<Group>, Self::Error>;

    /// Whether the referenced node exists in its namespace.
    async fn contains(&self, node: &NodeRef) -> Result<bool, Self::Error> {
        Ok(match node.kind {
            crate::types::NodeKind::User => self.get_user(&node.id).await?.is_some(),
            crate::types::NodeKind::Group => self.get_group(&node.id).await?.is_some(),
        })
    }
}

/// Storage for directed member-of edges.
///
/// Both lookups are indexed (forward and reverse) so each call is
/// O(degree). Results come back in a deterministic per-hop order.
#[async_trait]
pub trait EdgeStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync;

    /// Add an edge. Returns `false` if it already existed.
    async fn add_edge(&self, edge: &MembershipEdge) -> Result<bool, Self::Error>;

    /// Groups `node` is a direct member of (ordered by name).
    async fn direct_groups_of(&self, node: &NodeRef) -> Result<Vec<String>, Self::Error>;

    /// Direct members of a group (ordered by kind, then id).
    async fn direct_members_of(&self, group_name: &str) -> Result<Vec<NodeRef>, Self::Error>;

    /// Number of stored edges.
    async fn edge_count(&self) -> Result<usize, Self::Error>;
}

/// A backend holding both entities and edges.
#[async_trait]
pub trait MembershipStore: EntityStore + EdgeStore {
    /// Remove every user, group and edge.
    async fn clear(&self) -> Result<(), <Self as EntityStore>::Error>;

    /// Whether the backend is reachable.
    async fn is_healthy(&self) -> bool {
        true
    }
}

pub use memory::InMemoryMembershipStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresMembershipStore;
