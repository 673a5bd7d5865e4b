//! Membership edge type.

use serde::{Deserialize, Serialize};

use super::node::NodeRef;

/// Directed "member-of" edge in the membership graph.
///
/// The target is always a group, so only its name is stored.
/// Implements `Ord` for deterministic ordering: (member, group_name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MembershipEdge {
    /// The user or group that belongs to `group_name`.
    pub member: NodeRef,
    /// The containing group.
    pub group_name: String,
}

impl MembershipEdge {
    /// Create a new edge.
    pub fn new(member: NodeRef, group_name: impl Into<String>) -> Self {
        Self {
            member,
            group_name: group_name.into(),
        }
    }

    /// True if a group is recorded as a member of itself.
    pub fn is_self_membership(&self) -> bool {
        self.member.is_group() && self.member.id == self.group_name
    }
}
