//! Membership REST Service
//!
//! Exposes the membership service over HTTP.
//!
//! ## Endpoints
//!
//! - `GET/POST /users` - List or create users
//! - `GET/POST /groups` - List or create groups
//! - `GET/POST /groups/{group}/members` - Direct members / add a member
//! - `GET /groups/{group}/all-members` - Transitive members
//! - `GET /groups/{group}/groups`, `/groups/{group}/all-groups` - Parent groups of a group
//! - `GET /users/{user}/groups`, `/users/{user}/all-groups` - Groups of a user
//! - `POST /reset` - Clear the store
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe

pub mod config;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::{LogFormat, ServiceConfig};
pub use middleware::{metrics_middleware, request_logging_middleware, record_query_metrics};
pub use routes::{create_router, ApiError};
pub use state::ServiceState;
