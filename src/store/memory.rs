//! In-memory membership store.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::types::{Group, MembershipEdge, NodeRef, User};
use super::{EdgeStore, EntityStore, MembershipStore};

/// Error type for in-memory store. The memory backend cannot fail.
pub type InMemoryError = Infallible;

#[derive(Debug, Default)]
struct Tables {
    /// Users by username.
    users: BTreeMap<String, User>,
    /// Usernames in creation order.
    user_order: Vec<String>,
    /// Groups by name.
    groups: BTreeMap<String, Group>,
    /// Group names in creation order.
    group_order: Vec<String>,
    /// Member -> containing groups.
    groups_of: BTreeMap<NodeRef, BTreeSet<String>>,
    /// Group -> direct members.
    members_of: BTreeMap<String, BTreeSet<NodeRef>>,
    edge_count: usize,
}

/// In-memory membership store.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order. Writers
/// take the lock exclusively, so forward and reverse edge indexes are
/// never observed out of step.
#[derive(Debug, Default)]
pub struct InMemoryMembershipStore {
    tables: RwLock<Tables>,
}

impl InMemoryMembershipStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get number of users.
    pub fn num_users(&self) -> usize {
        self.tables.read().users.len()
    }

    /// Get number of groups.
    pub fn num_groups(&self) -> usize {
        self.tables.read().groups.len()
    }

    /// Get number of edges.
    pub fn num_edges(&self) -> usize {
        self.tables.read().edge_count
    }
}

#[async_trait]
impl EntityStore for InMemoryMembershipStore {
    type Error = InMemoryError;

    async fn insert_user(&self, user: User) -> Result<bool, Self::Error> {
        let mut tables = self.tables.write();
        if tables.users.contains_key(&user.username) {
            return Ok(false);
        }
        tables.user_order.push(user.username.clone());
        tables.users.insert(user.username.clone(), user);
        Ok(true)
    }

    async fn insert_group(&self, group: Group) -> Result<bool, Self::Error> {
        let mut tables = self.tables.write();
        if tables.groups.contains_key(&group.group_name) {
            return Ok(false);
        }
        tables.group_order.push(group.group_name.clone());
        tables.groups.insert(group.group_name.clone(), group);
        Ok(true)
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>, Self::Error> {
        Ok(self.tables.read().users.get(username).cloned())
    }

    async fn get_group(&self, group_name: &str) -> Result<Option<Group>, Self::Error> {
        Ok(self.tables.read().groups.get(group_name).cloned())
    }

    async fn get_groups(&self, names: &[String]) -> Result<Vec<Group>, Self::Error> {
        let tables = self.tables.read();
        Ok(names.iter()
            .filter_map(|name| tables.groups.get(name).cloned())
            .collect())
    }

    async fn list_users(&self) -> Result<Vec<User>, Self::Error> {
        let tables = self.tables.read();
        Ok(tables.user_order.iter()
            .filter_map(|name| tables.users.get(name).cloned())
            .collect())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, Self::Error> {
        let tables = self.tables.read();
        Ok(tables.group_order.iter()
            .filter_map(|name| tables.groups.get(name).cloned())
            .collect())
    }
}

#[async_trait]
impl EdgeStore for InMemoryMembershipStore {
    type Error = InMemoryError;

    async fn add_edge(&self, edge: &MembershipEdge) -> Result<bool, Self::Error> {
        let mut tables = self.tables.write();

        let inserted = tables.groups_of
            .entry(edge.member.clone())
            .or_default()
            .insert(edge.group_name.clone());
        if !inserted {
            return Ok(false);
        }

        tables.members_of
            .entry(edge.group_name.clone())
            .or_default()
            .insert(edge.member.clone());
        tables.edge_count += 1;

        Ok(true)
    }

    async fn direct_groups_of(&self, node: &NodeRef) -> Result<Vec<String>, Self::Error> {
        Ok(self.tables.read()
            .groups_of
            .get(node)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn direct_members_of(&self, group_name: &str) -> Result<Vec<NodeRef>, Self::Error> {
        Ok(self.tables.read()
            .members_of
            .get(group_name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn edge_count(&self) -> Result<usize, Self::Error> {
        Ok(self.num_edges())
    }
}

#[async_trait]
impl MembershipStore for InMemoryMembershipStore {
    async fn clear(&self) -> Result<(), InMemoryError> {
        *self.tables.write() = Tables::default();
        Ok(())
    }
}
