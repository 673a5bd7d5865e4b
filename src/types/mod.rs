//! Core types for the membership graph.

pub mod node;
pub mod entity;
pub mod edge;

pub use node::{NodeKind, NodeRef, validate_identifier, MAX_IDENTIFIER_LEN};
pub use entity::{User, Group, NewUser, ProfilePicture};
pub use edge::MembershipEdge;
