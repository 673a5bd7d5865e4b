//! # membership-graph
//!
//! Users, groups and nested group membership.
//!
//! The resolver answers two questions over one edge set:
//!
//! > Which groups does this node belong to? Which members does this group contain?
//!
//! Each has a direct (one hop) and a transitive (full closure) form.
//!
//! ## Architecture
//!
//! ```text
//! Transport → MembershipService → GraphResolver
//!                   ↓                   ↓
//!              EntityStore          EdgeStore
//!                   (Memory or Postgres)
//! ```
//!
//! ## Guarantees
//!
//! - Every node reference carries an explicit kind (user or group)
//! - Closures terminate on cycles and self edges and report each node once
//! - The start node never appears in its own closure
//! - Transitive results are in breadth-first discovery order; each hop is
//!   ordered by (kind, id) with users first

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod error;
pub mod store;
pub mod resolver;
pub mod membership;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{NodeKind, NodeRef, User, Group, NewUser, ProfilePicture, MembershipEdge};
pub use error::{MembershipError, MembershipResult};
pub use store::{EntityStore, EdgeStore, MembershipStore, InMemoryMembershipStore};
#[cfg(feature = "postgres")]
pub use store::PostgresMembershipStore;
pub use resolver::{GraphResolver, Direction, Depth};
pub use membership::{MembershipService, AddedMember};

// Service re-exports (when service feature is enabled)
#[cfg(feature = "service")]
pub use service::{create_router, ServiceConfig, ServiceState};

/// Cancellation token accepted by transitive queries.
pub use tokio_util::sync::CancellationToken;
