/// Invitation endpoints
///
/// # Endpoints
///
/// - `POST /v1/groups/invitations` - Invite an e-mail address to a group
/// - `GET /v1/groups/:id/invitations` - Group's invitations (role >= admin)
/// - `GET /v1/invitations` - Caller's pending inbox
/// - `PATCH /v1/invitations/:id` - Accept or decline

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use statusguard_shared::auth::identity::Identity;
use statusguard_shared::invitations::{InvitationResponse, NewInvitation};
use statusguard_shared::models::invitation::{InboxEntry, Invitation};
use uuid::Uuid;

/// Response to an invitation
#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    /// `accepted` or `declined`
    pub status: InvitationResponse,
}

#[derive(Debug, Serialize)]
pub struct InboxResponse {
    pub invitations: Vec<InboxEntry>,
}

#[derive(Debug, Serialize)]
pub struct GroupInvitationsResponse {
    pub invitations: Vec<Invitation>,
}

/// Create invitation
///
/// ```text
/// POST /v1/groups/invitations
/// Authorization: Bearer <jwt_token>
/// Content-Type: application/json
///
/// {
///   "group_id": "8d7e...",
///   "email": "bob@example.com",
///   "role": "member",
///   "message": "Join the on-call rotation"
/// }
/// ```
///
/// The invitation expires seven days after creation.
///
/// # Errors
///
/// - `403 Forbidden`: Caller is a plain member, or an admin granting `owner`
/// - `409 Conflict`: Address is already a member or has a pending invitation
/// - `422 Unprocessable Entity`: Invalid e-mail or `owner` role
pub async fn create_invitation(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Json(req): Json<NewInvitation>,
) -> ApiResult<(StatusCode, Json<Invitation>)> {
    let invitation = state.engine.invitations().create(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

pub async fn list_group_invitations(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<GroupInvitationsResponse>> {
    let invitations = state
        .engine
        .invitations()
        .list_for_group(&actor, group_id)
        .await?;
    Ok(Json(GroupInvitationsResponse { invitations }))
}

pub async fn inbox(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
) -> ApiResult<Json<InboxResponse>> {
    let invitations = state.engine.invitations().inbox(&actor).await?;
    Ok(Json(InboxResponse { invitations }))
}

/// Accept or decline an invitation
///
/// ```text
/// PATCH /v1/invitations/:id
/// Authorization: Bearer <jwt_token>
/// Content-Type: application/json
///
/// { "status": "accepted" }
/// ```
///
/// # Errors
///
/// - `404 Not Found`: No invitation addressed to the caller
/// - `409 Conflict` with reason `invitation_expired` or `already_responded`
pub async fn respond(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(invitation_id): Path<Uuid>,
    Json(req): Json<RespondRequest>,
) -> ApiResult<Json<Invitation>> {
    let invitation = state
        .engine
        .invitations()
        .respond(&actor, invitation_id, req.status)
        .await?;
    Ok(Json(invitation))
}
