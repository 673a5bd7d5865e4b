//! Axum routes for the membership service.

use axum::{
    extract::{rejection::JsonRejection, Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::MembershipError;
use crate::membership::AddedMember;
use crate::store::MembershipStore;
use crate::types::{Group, NewUser, NodeKind, NodeRef, User};

use super::middleware::record_query_metrics;
use super::state::ServiceState;

type SharedState<S> = Arc<ServiceState<S>>;

// ============================================================================
// Request/Response Types
// ============================================================================

/// A single address or a list of addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmailField {
    /// `"email": "a@b.c"`
    One(String),
    /// `"email": ["a@b.c", "d@e.f"]`
    Many(Vec<String>),
}

impl EmailField {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(e) => vec![e],
            Self::Many(v) => v,
        }
    }
}

/// Request to create a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    /// Unique username (required).
    pub username: Option<String>,
    /// One address or a list.
    pub email: Option<EmailField>,
    /// `http(s)` URL or S3 object reference.
    pub profile_picture_uri: Option<String>,
}

/// Request to create a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroupRequest {
    /// Unique group name (required).
    pub group_name: Option<String>,
}

/// Request to add a member. Exactly one of the fields must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMemberRequest {
    /// User to add.
    pub username: Option<String>,
    /// Group to add as a nested member.
    pub group_name: Option<String>,
}

impl AddMemberRequest {
    fn into_member(self) -> Result<NodeRef, MembershipError> {
        match (self.username, self.group_name) {
            (Some(u), None) => Ok(NodeRef::user(u)),
            (None, Some(g)) => Ok(NodeRef::group(g)),
            (None, None) => Err(MembershipError::Validation(
                "Either 'username' or 'group_name' is required".to_string(),
            )),
            (Some(_), Some(_)) => Err(MembershipError::Validation(
                "Provide either 'username' or 'group_name', not both".to_string(),
            )),
        }
    }
}

/// Serializable user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDto {
    /// Username.
    pub username: String,
    /// Email addresses, deduplicated.
    pub email: Vec<String>,
    /// Set when the picture is an `http(s)` URL.
    pub profile_picture_url: Option<String>,
    /// Set when the picture is an S3 reference.
    pub profile_picture_s3_uri: Option<String>,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            profile_picture_url: user.profile_picture_url().map(str::to_string),
            profile_picture_s3_uri: user.profile_picture_s3_uri().map(str::to_string),
            username: user.username,
            email: user.email,
        }
    }
}

/// Serializable group record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDto {
    /// Group name.
    pub group_name: String,
}

impl From<Group> for GroupDto {
    fn from(group: Group) -> Self {
        Self { group_name: group.group_name }
    }
}

/// Serializable member record, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDto {
    /// `user` or `group`.
    pub member_type: NodeKind,
    /// Username or group name.
    pub member_name: String,
}

impl From<NodeRef> for MemberDto {
    fn from(node: NodeRef) -> Self {
        Self {
            member_type: node.kind,
            member_name: node.id,
        }
    }
}

/// Response to user creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserResponse {
    /// Confirmation message.
    pub message: String,
    /// Created username.
    pub username: String,
    /// Stored email addresses.
    pub email: Vec<String>,
}

/// Response to group creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroupResponse {
    /// Confirmation message.
    pub message: String,
    /// Created group name.
    pub group_name: String,
}

/// Response to adding a member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMemberResponse {
    /// Confirmation message.
    pub message: String,
    /// Containing group.
    pub group_name: String,
    /// Kind of the added member.
    pub member_type: NodeKind,
    /// Name of the added member.
    pub member_name: String,
    /// False when the membership already existed.
    pub created: bool,
}

impl From<AddedMember> for AddMemberResponse {
    fn from(added: AddedMember) -> Self {
        let label = match added.member.kind {
            NodeKind::User => "User",
            NodeKind::Group => "Group",
        };
        Self {
            message: format!("{} added to group successfully", label),
            group_name: added.group_name,
            member_type: added.member.kind,
            member_name: added.member.id,
            created: added.created,
        }
    }
}

/// Generic acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Message text.
    pub message: String,
}

/// Service health response (detailed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded".
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Store backend label (`memory` or `postgres`).
    pub backend: String,
    /// Whether the store answered its health check.
    pub store_connected: bool,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    /// Always "alive".
    pub status: String,
}

/// Readiness response with dependency status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Whether the service can take traffic.
    pub ready: bool,
    /// Store health.
    pub store: bool,
    /// Reason when not ready.
    pub details: Option<String>,
}

/// Structured error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
    /// Whether retrying the same request may succeed.
    pub retryable: bool,
}

/// Membership error as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub MembershipError);

impl From<MembershipError> for ApiError {
    fn from(e: MembershipError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(MembershipError::Validation(format!(
            "Invalid request body: {}",
            rejection.body_text()
        )))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            MembershipError::NotFound(_) => StatusCode::NOT_FOUND,
            MembershipError::AlreadyExists(_) => StatusCode::CONFLICT,
            MembershipError::Validation(_) => StatusCode::BAD_REQUEST,
            MembershipError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            MembershipError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.0.to_string(),
            code: self.0.code().to_string(),
            retryable: self.0.is_retryable(),
        };
        tracing::warn!(
            code = %body.code,
            error = %body.error,
            status = status.as_u16(),
            "Request error"
        );
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Query deadline
// ============================================================================

/// Cancellation token that fires after a timeout.
///
/// The timer task is aborted when the deadline is dropped.
struct Deadline {
    token: CancellationToken,
    timer: JoinHandle<()>,
}

impl Deadline {
    fn start(timeout: Duration) -> Self {
        let token = CancellationToken::new();
        let timer = tokio::spawn({
            let token = token.clone();
            async move {
                tokio::time::sleep(timeout).await;
                token.cancel();
            }
        });
        Self { token, timer }
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn list_users_handler<S: MembershipStore + 'static>(
    State(state): State<SharedState<S>>,
) -> Result<Json<Vec<UserDto>>, ApiError> {
    let users = state.membership.list_users().await?;
    Ok(Json(users.into_iter().map(UserDto::from).collect()))
}

async fn create_user_handler<S: MembershipStore + 'static>(
    State(state): State<SharedState<S>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateUserResponse>), ApiError> {
    let Json(request) = payload?;
    let username = request.username.ok_or_else(|| {
        MembershipError::Validation("Username is required".to_string())
    })?;
    let email = request.email.map(EmailField::into_vec).unwrap_or_default();

    let user = state.membership
        .create_user(NewUser {
            username,
            email,
            profile_picture_uri: request.profile_picture_uri,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            message: "User created successfully".to_string(),
            username: user.username,
            email: user.email,
        }),
    ))
}

async fn list_groups_handler<S: MembershipStore + 'static>(
    State(state): State<SharedState<S>>,
) -> Result<Json<Vec<GroupDto>>, ApiError> {
    let groups = state.membership.list_groups().await?;
    Ok(Json(groups.into_iter().map(GroupDto::from).collect()))
}

async fn create_group_handler<S: MembershipStore + 'static>(
    State(state): State<SharedState<S>>,
    payload: Result<Json<CreateGroupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateGroupResponse>), ApiError> {
    let Json(request) = payload?;
    let group_name = request.group_name.ok_or_else(|| {
        MembershipError::Validation("Group name is required".to_string())
    })?;

    let group = state.membership.create_group(&group_name).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateGroupResponse {
            message: "Group created successfully".to_string(),
            group_name: group.group_name,
        }),
    ))
}

async fn add_member_handler<S: MembershipStore + 'static>(
    State(state): State<SharedState<S>>,
    Path(group_name): Path<String>,
    payload: Result<Json<AddMemberRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AddMemberResponse>), ApiError> {
    let Json(request) = payload?;
    let member = request.into_member()?;
    let added = state.membership.add_group_member(&member, &group_name).await?;
    Ok((StatusCode::CREATED, Json(added.into())))
}

async fn direct_members_handler<S: MembershipStore + 'static>(
    State(state): State<SharedState<S>>,
    Path(group_name): Path<String>,
) -> Result<Json<Vec<MemberDto>>, ApiError> {
    let members = state.membership.direct_members_of_group(&group_name).await?;
    Ok(Json(members.into_iter().map(MemberDto::from).collect()))
}

async fn all_members_handler<S: MembershipStore + 'static>(
    State(state): State<SharedState<S>>,
    Path(group_name): Path<String>,
) -> Result<Json<Vec<MemberDto>>, ApiError> {
    let start = Instant::now();
    let deadline = Deadline::start(state.config.query_timeout);
    let members = state.membership
        .all_members_of_group(&group_name, &deadline.token)
        .await?;
    record_query_metrics("all_members_of_group", members.len(), start.elapsed().as_millis() as u64);
    Ok(Json(members.into_iter().map(MemberDto::from).collect()))
}

async fn user_groups_handler<S: MembershipStore + 'static>(
    State(state): State<SharedState<S>>,
    Path(username): Path<String>,
) -> Result<Json<Vec<GroupDto>>, ApiError> {
    let groups = state.membership.direct_groups_of_user(&username).await?;
    Ok(Json(groups.into_iter().map(GroupDto::from).collect()))
}

async fn user_all_groups_handler<S: MembershipStore + 'static>(
    State(state): State<SharedState<S>>,
    Path(username): Path<String>,
) -> Result<Json<Vec<GroupDto>>, ApiError> {
    let start = Instant::now();
    let deadline = Deadline::start(state.config.query_timeout);
    let groups = state.membership
        .all_groups_of_user(&username, &deadline.token)
        .await?;
    record_query_metrics("all_groups_of_user", groups.len(), start.elapsed().as_millis() as u64);
    Ok(Json(groups.into_iter().map(GroupDto::from).collect()))
}

async fn group_groups_handler<S: MembershipStore + 'static>(
    State(state): State<SharedState<S>>,
    Path(group_name): Path<String>,
) -> Result<Json<Vec<GroupDto>>, ApiError> {
    let groups = state.membership.direct_groups_of_group(&group_name).await?;
    Ok(Json(groups.into_iter().map(GroupDto::from).collect()))
}

async fn group_all_groups_handler<S: MembershipStore + 'static>(
    State(state): State<SharedState<S>>,
    Path(group_name): Path<String>,
) -> Result<Json<Vec<GroupDto>>, ApiError> {
    let start = Instant::now();
    let deadline = Deadline::start(state.config.query_timeout);
    let groups = state.membership
        .all_groups_of_group(&group_name, &deadline.token)
        .await?;
    record_query_metrics("all_groups_of_group", groups.len(), start.elapsed().as_millis() as u64);
    Ok(Json(groups.into_iter().map(GroupDto::from).collect()))
}

async fn reset_handler<S: MembershipStore + 'static>(
    State(state): State<SharedState<S>>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.membership.reset().await?;
    Ok(Json(MessageResponse {
        message: "Database reset successfully".to_string(),
    }))
}

/// Health check endpoint (detailed).
async fn health_handler<S: MembershipStore + 'static>(
    State(state): State<SharedState<S>>,
) -> Json<HealthResponse> {
    let healthy = state.membership.is_healthy().await;

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.backend().to_string(),
        store_connected: healthy,
    })
}

/// Liveness probe endpoint.
///
/// Does NOT check dependencies. Returns 200 if the process is alive.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 if the store is reachable, 503 otherwise.
async fn readiness_handler<S: MembershipStore + 'static>(
    State(state): State<SharedState<S>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    if state.membership.is_healthy().await {
        Ok(Json(ReadinessResponse {
            ready: true,
            store: true,
            details: None,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                store: false,
                details: Some("Store connection failed".to_string()),
            }),
        ))
    }
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the membership service.
pub fn create_router<S: MembershipStore + 'static>(state: ServiceState<S>) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Entities
        .route("/users", get(list_users_handler::<S>).post(create_user_handler::<S>))
        .route("/groups", get(list_groups_handler::<S>).post(create_group_handler::<S>))
        // Membership
        .route(
            "/groups/:group_name/members",
            get(direct_members_handler::<S>).post(add_member_handler::<S>),
        )
        .route("/groups/:group_name/all-members", get(all_members_handler::<S>))
        .route("/groups/:group_name/groups", get(group_groups_handler::<S>))
        .route("/groups/:group_name/all-groups", get(group_all_groups_handler::<S>))
        .route("/users/:username/groups", get(user_groups_handler::<S>))
        .route("/users/:username/all-groups", get(user_all_groups_handler::<S>))
        // Test support
        .route("/reset", post(reset_handler::<S>))
        // Health checks
        .route("/health", get(health_handler::<S>))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler::<S>))
        .with_state(state)
}
