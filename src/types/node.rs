//! Node references for the membership graph.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MembershipError;

/// Maximum identifier length in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 256;

/// Kind of a node in the membership graph.
///
/// Users and groups live in separate namespaces, so every reference
/// carries its kind explicitly. Ordering puts users before groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A user account (always a leaf when walking members).
    User,
    /// A group, which may contain users and other groups.
    Group,
}

impl NodeKind {
    /// Parse kind from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Self::User),
            "group" => Some(Self::Group),
            _ => None,
        }
    }

    /// Lowercase label used on the wire and in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }

    /// Capitalized label for messages.
    fn title(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Group => "Group",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged reference to a user or group.
///
/// Implements `Ord` as (kind, id), which is the per-hop order stores
/// return members in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    /// Which namespace `id` lives in.
    pub kind: NodeKind,
    /// Username or group name.
    pub id: String,
}

impl NodeRef {
    /// Create a reference with an explicit kind.
    pub fn new(kind: NodeKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    /// Reference to a user.
    pub fn user(username: impl Into<String>) -> Self {
        Self::new(NodeKind::User, username)
    }

    /// Reference to a group.
    pub fn group(group_name: impl Into<String>) -> Self {
        Self::new(NodeKind::Group, group_name)
    }

    /// True if this reference points at a group.
    pub fn is_group(&self) -> bool {
        self.kind == NodeKind::Group
    }

    /// True if this reference points at a user.
    pub fn is_user(&self) -> bool {
        self.kind == NodeKind::User
    }

    /// Human readable form, e.g. `User 'alice'`.
    pub fn describe(&self) -> String {
        format!("{} '{}'", self.kind.title(), self.id)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Validate a username or group name.
///
/// Identifiers double as URL path segments on the HTTP surface, so
/// slashes and control characters are rejected.
pub fn validate_identifier(kind: NodeKind, id: &str) -> Result<(), MembershipError> {
    let field = match kind {
        NodeKind::User => "username",
        NodeKind::Group => "group_name",
    };

    if id.trim().is_empty() {
        return Err(MembershipError::Validation(format!("{} must not be empty", field)));
    }
    if id.len() > MAX_IDENTIFIER_LEN {
        return Err(MembershipError::Validation(format!(
            "{} exceeds {} bytes",
            field, MAX_IDENTIFIER_LEN
        )));
    }
    if id.contains('/') {
        return Err(MembershipError::Validation(format!(
            "{} must not contain '/': {}",
            field, id
        )));
    }
    if id.chars().any(char::is_control) {
        return Err(MembershipError::Validation(format!(
            "{} must not contain control characters",
            field
        )));
    }
    Ok(())
}
