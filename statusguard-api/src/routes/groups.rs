/// Group and membership endpoints
///
/// All endpoints require a bearer identity. Role checks happen in the
/// Membership Store; handlers only translate between HTTP and engine calls.
///
/// # Endpoints
///
/// - `POST /v1/groups` - Create group (caller becomes owner)
/// - `GET /v1/groups` - List caller's groups with role
/// - `GET /v1/groups/:id` - Group with members (role >= member)
/// - `PATCH /v1/groups/:id` - Rename or describe (role >= admin)
/// - `DELETE /v1/groups/:id` - Deactivate (owner only)
/// - `PATCH /v1/groups/:id/members/:user_id` - Change role
/// - `DELETE /v1/groups/:id/members/:user_id` - Remove member

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use statusguard_shared::auth::identity::Identity;
use statusguard_shared::groups::{GroupChanges, GroupDetail, NewGroup};
use statusguard_shared::models::group::{Group, GroupSummary};
use statusguard_shared::models::membership::{GroupMembership, GroupRole};
use uuid::Uuid;

/// Role change request
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    /// New role; `owner` transfers ownership
    pub role: GroupRole,
}

/// List groups response
#[derive(Debug, Serialize)]
pub struct ListGroupsResponse {
    pub groups: Vec<GroupSummary>,
}

/// Create group
///
/// ```text
/// POST /v1/groups
/// Authorization: Bearer <jwt_token>
/// Content-Type: application/json
///
/// {
///   "name": "Platform Team",
///   "description": "Status pages for platform services"
/// }
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Name empty or too long
/// - `409 Conflict`: Caller already owns an active group with this name
pub async fn create_group(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Json(req): Json<NewGroup>,
) -> ApiResult<(StatusCode, Json<Group>)> {
    let group = state.engine.memberships().create_group(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn list_groups(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
) -> ApiResult<Json<ListGroupsResponse>> {
    let groups = state.engine.memberships().list_groups(&actor).await?;
    Ok(Json(ListGroupsResponse { groups }))
}

/// Group detail
///
/// Non-members receive `404 Not Found`, the same as for a missing group.
pub async fn get_group(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<GroupDetail>> {
    let detail = state.engine.memberships().group_detail(&actor, group_id).await?;
    Ok(Json(detail))
}

pub async fn update_group(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<GroupChanges>,
) -> ApiResult<Json<Group>> {
    let group = state
        .engine
        .memberships()
        .update_group(&actor, group_id, req)
        .await?;
    Ok(Json(group))
}

pub async fn deactivate_group(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<Group>> {
    let group = state
        .engine
        .memberships()
        .deactivate_group(&actor, group_id)
        .await?;
    Ok(Json(group))
}

/// Change a member's role
///
/// ```text
/// PATCH /v1/groups/:id/members/:user_id
/// Authorization: Bearer <jwt_token>
/// Content-Type: application/json
///
/// { "role": "admin" }
/// ```
///
/// # Errors
///
/// - `409 Conflict` with reason `last_owner_protected`: demoting the owner
/// - `403 Forbidden`: caller's role is too low for the change
pub async fn update_member_role(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateRoleRequest>,
) -> ApiResult<Json<GroupMembership>> {
    let membership = state
        .engine
        .memberships()
        .set_role(&actor, group_id, user_id, req.role)
        .await?;
    Ok(Json(membership))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    state
        .engine
        .memberships()
        .remove_member(&actor, group_id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
