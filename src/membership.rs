//! Membership service: the operation set exposed to transports.
//!
//! Validates that referenced entities exist, then delegates storage to
//! the entity and edge stores and graph questions to the resolver.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{MembershipError, MembershipResult};
use crate::resolver::{Depth, Direction, GraphResolver};
use crate::store::{EdgeStore, EntityStore, MembershipStore};
use crate::types::{validate_identifier, Group, MembershipEdge, NewUser, NodeKind, NodeRef, User};

/// Outcome of adding a member to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedMember {
    /// The containing group.
    pub group_name: String,
    /// The member that was added.
    pub member: NodeRef,
    /// False when the edge already existed.
    pub created: bool,
}

/// Membership service over a store backend.
pub struct MembershipService<S: MembershipStore> {
    store: Arc<S>,
    resolver: GraphResolver<S>,
}

impl<S: MembershipStore> MembershipService<S> {
    /// Create a service over a shared store.
    pub fn new(store: Arc<S>) -> Self {
        let resolver = GraphResolver::new(Arc::clone(&store));
        Self { store, resolver }
    }

    /// Create a user. Fails with `AlreadyExists` if the username is taken.
    pub async fn create_user(&self, input: NewUser) -> MembershipResult<User> {
        let user = input.into_user(Utc::now())?;
        let node = user.node_ref();

        let inserted = self.store.insert_user(user.clone()).await
            .map_err(MembershipError::from_store)?;
        if !inserted {
            tracing::debug!(username = %user.username, "User already exists");
            return Err(MembershipError::AlreadyExists(node));
        }

        tracing::info!(
            username = %user.username,
            email_count = user.email.len(),
            has_picture = user.profile_picture.is_some(),
            "User created"
        );
        Ok(user)
    }

    /// Create a group. Fails with `AlreadyExists` if the name is taken.
    pub async fn create_group(&self, group_name: &str) -> MembershipResult<Group> {
        let group = Group::new(group_name, Utc::now())?;

        let inserted = self.store.insert_group(group.clone()).await
            .map_err(MembershipError::from_store)?;
        if !inserted {
            tracing::debug!(group_name = %group.group_name, "Group already exists");
            return Err(MembershipError::AlreadyExists(group.node_ref()));
        }

        tracing::info!(group_name = %group.group_name, "Group created");
        Ok(group)
    }

    /// Fetch a user.
    pub async fn get_user(&self, username: &str) -> MembershipResult<User> {
        self.store.get_user(username).await
            .map_err(MembershipError::from_store)?
            .ok_or_else(|| MembershipError::NotFound(NodeRef::user(username)))
    }

    /// Fetch a group.
    pub async fn get_group(&self, group_name: &str) -> MembershipResult<Group> {
        self.store.get_group(group_name).await
            .map_err(MembershipError::from_store)?
            .ok_or_else(|| MembershipError::NotFound(NodeRef::group(group_name)))
    }

    /// Add `member` to `group_name`.
    ///
    /// Both nodes must exist. Re-adding an existing edge succeeds with
    /// `created == false`. A group may be made a member of itself.
    pub async fn add_group_member(&self, member: &NodeRef, group_name: &str) -> MembershipResult<AddedMember> {
        validate_identifier(member.kind, &member.id)?;
        validate_identifier(NodeKind::Group, group_name)?;

        self.ensure_exists(member).await?;
        self.ensure_exists(&NodeRef::group(group_name)).await?;

        let edge = MembershipEdge::new(member.clone(), group_name);
        let created = self.store.add_edge(&edge).await
            .map_err(MembershipError::from_store)?;

        if created {
            tracing::info!(
                member = %member,
                group_name = %group_name,
                self_membership = edge.is_self_membership(),
                "Member added"
            );
        } else {
            tracing::debug!(member = %member, group_name = %group_name, "Membership already present");
        }

        Ok(AddedMember {
            group_name: group_name.to_string(),
            member: member.clone(),
            created,
        })
    }

    /// All users in creation order.
    pub async fn list_users(&self) -> MembershipResult<Vec<User>> {
        self.store.list_users().await.map_err(MembershipError::from_store)
    }

    /// All groups in creation order.
    pub async fn list_groups(&self) -> MembershipResult<Vec<Group>> {
        self.store.list_groups().await.map_err(MembershipError::from_store)
    }

    /// Groups a user belongs to directly.
    pub async fn direct_groups_of_user(&self, username: &str) -> MembershipResult<Vec<Group>> {
        self.groups_of(&NodeRef::user(username), Depth::Direct, &CancellationToken::new()).await
    }

    /// Groups a user belongs to, directly or through nested groups.
    pub async fn all_groups_of_user(&self, username: &str, cancel: &CancellationToken) -> MembershipResult<Vec<Group>> {
        self.groups_of(&NodeRef::user(username), Depth::Transitive, cancel).await
    }

    /// Parent groups of a group.
    pub async fn direct_groups_of_group(&self, group_name: &str) -> MembershipResult<Vec<Group>> {
        self.groups_of(&NodeRef::group(group_name), Depth::Direct, &CancellationToken::new()).await
    }

    /// All ancestor groups of a group.
    pub async fn all_groups_of_group(&self, group_name: &str, cancel: &CancellationToken) -> MembershipResult<Vec<Group>> {
        self.groups_of(&NodeRef::group(group_name), Depth::Transitive, cancel).await
    }

    /// Direct members of a group, tagged by kind.
    pub async fn direct_members_of_group(&self, group_name: &str) -> MembershipResult<Vec<NodeRef>> {
        self.resolver
            .resolve(&NodeRef::group(group_name), Direction::Descendants, Depth::Direct, &CancellationToken::new())
            .await
    }

    /// All members of a group, recursing through member groups.
    pub async fn all_members_of_group(&self, group_name: &str, cancel: &CancellationToken) -> MembershipResult<Vec<NodeRef>> {
        self.resolver
            .resolve(&NodeRef::group(group_name), Direction::Descendants, Depth::Transitive, cancel)
            .await
    }

    /// Remove every user, group and membership.
    pub async fn reset(&self) -> MembershipResult<()> {
        self.store.clear().await.map_err(MembershipError::from_store)?;
        tracing::warn!("Membership graph reset");
        Ok(())
    }

    /// Whether the backing store is reachable.
    pub async fn is_healthy(&self) -> bool {
        self.store.is_healthy().await
    }

    /// Get a reference to the store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get a reference to the resolver.
    pub fn resolver(&self) -> &GraphResolver<S> {
        &self.resolver
    }

    async fn groups_of(&self, node: &NodeRef, depth: Depth, cancel: &CancellationToken) -> MembershipResult<Vec<Group>> {
        let refs = self.resolver.resolve(node, Direction::Ancestors, depth, cancel).await?;
        let names: Vec<String> = refs.into_iter().map(|r| r.id).collect();
        self.store.get_groups(&names).await.map_err(MembershipError::from_store)
    }

    async fn ensure_exists(&self, node: &NodeRef) -> MembershipResult<()> {
        let exists = self.store.contains(node).await
            .map_err(MembershipError::from_store)?;
        if exists {
            Ok(())
        } else {
            Err(MembershipError::NotFound(node.clone()))
        }
    }
}

impl<S: MembershipStore> Clone for MembershipService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            resolver: self.resolver.clone(),
        }
    }
}
