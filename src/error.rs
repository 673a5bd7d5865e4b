//! Error taxonomy for membership operations.

use crate::types::NodeRef;

/// Error type for membership operations.
///
/// Cycles and duplicate edges are never errors; they are absorbed by
/// the resolver and the edge store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MembershipError {
    /// Referenced user or group does not exist.
    #[error("{} not found", .0.describe())]
    NotFound(NodeRef),
    /// Identifier already taken on create.
    #[error("{} already exists", .0.describe())]
    AlreadyExists(NodeRef),
    /// Malformed input or invalid membership target.
    #[error("Validation error: {0}")]
    Validation(String),
    /// Caller deadline or cancellation hit during traversal.
    #[error("Operation cancelled")]
    Cancelled,
    /// Backing store failure. Retryable by the caller.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl MembershipError {
    /// Create an unavailable error from any store error.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::Unavailable(e.to_string())
    }

    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Unavailable(_) => "UNAVAILABLE",
        }
    }
}

/// Result alias for membership operations.
pub type MembershipResult<T> = Result<T, MembershipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_node() {
        let e = MembershipError::AlreadyExists(NodeRef::user("testuser"));
        assert_eq!(e.to_string(), "User 'testuser' already exists");

        let e = MembershipError::NotFound(NodeRef::group("eng"));
        assert_eq!(e.to_string(), "Group 'eng' not found");
    }

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(MembershipError::Unavailable("down".into()).is_retryable());
        assert!(!MembershipError::Cancelled.is_retryable());
        assert!(!MembershipError::NotFound(NodeRef::user("x")).is_retryable());
    }

    #[test]
    fn test_from_store() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let e = MembershipError::from_store(io);
        assert_eq!(e.code(), "UNAVAILABLE");
        assert!(e.to_string().contains("refused"));
    }
}
