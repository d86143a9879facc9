/// Admin endpoints
///
/// Mounted under `/v1/admin` behind the admin feature gate (503 when
/// disabled) and the identity layer. Authorization is the Admin Override
/// Layer's: self-protection, then active admin, then `InactiveUser`, then
/// `Forbidden`.
///
/// List endpoints accept `?skip=&limit=` (defaults 0 / 50, limit at most 100).

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use statusguard_shared::auth::admin::PlatformStats;
use statusguard_shared::auth::identity::Identity;
use statusguard_shared::models::decision::DecisionRecord;
use statusguard_shared::models::group::Group;
use statusguard_shared::models::incident::Incident;
use statusguard_shared::models::invitation::Invitation;
use statusguard_shared::models::project::Project;
use statusguard_shared::models::subscription::Subscription;
use statusguard_shared::models::user::{UpdateUserFlags, User};
use statusguard_shared::models::Page;
use uuid::Uuid;

/// Pagination query parameters
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    fn page(&self) -> Result<Page, ApiError> {
        Ok(Page::new(self.skip, self.limit)?)
    }
}

#[derive(Debug, Deserialize)]
pub struct IncidentQuery {
    pub resolved: Option<bool>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionQuery {
    /// Only decisions taken for this actor
    pub actor_id: Option<Uuid>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GroupStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProjectVisibilityRequest {
    pub is_public: bool,
}

pub async fn stats(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
) -> ApiResult<Json<PlatformStats>> {
    Ok(Json(state.engine.admin().stats(&actor).await?))
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<User>>> {
    let users = state.engine.admin().list_users(&actor, query.page()?).await?;
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.engine.admin().get_user(&actor, user_id).await?))
}

/// Update a user's flags
///
/// ```text
/// PATCH /v1/admin/users/:id
/// Authorization: Bearer <jwt_token>
/// Content-Type: application/json
///
/// { "is_active": false }
/// ```
///
/// # Errors
///
/// - `403 Forbidden` with reason `self_protection`: an admin revoking their own
///   admin or active flag
pub async fn update_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserFlags>,
) -> ApiResult<Json<User>> {
    let user = state.engine.admin().update_user(&actor, user_id, req).await?;
    Ok(Json(user))
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Subscription>>> {
    let subscriptions = state
        .engine
        .admin()
        .list_subscriptions(&actor, query.page()?)
        .await?;
    Ok(Json(subscriptions))
}

pub async fn list_groups(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Group>>> {
    let groups = state.engine.admin().list_groups(&actor, query.page()?).await?;
    Ok(Json(groups))
}

pub async fn update_group(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<GroupStatusRequest>,
) -> ApiResult<Json<Group>> {
    let group = state
        .engine
        .admin()
        .set_group_active(&actor, group_id, req.is_active)
        .await?;
    Ok(Json(group))
}

pub async fn list_projects(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Project>>> {
    let projects = state.engine.admin().list_projects(&actor, query.page()?).await?;
    Ok(Json(projects))
}

pub async fn update_project(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<ProjectVisibilityRequest>,
) -> ApiResult<Json<Project>> {
    let project = state
        .engine
        .admin()
        .set_project_public(&actor, project_id, req.is_public)
        .await?;
    Ok(Json(project))
}

pub async fn list_incidents(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Query(query): Query<IncidentQuery>,
) -> ApiResult<Json<Vec<Incident>>> {
    let page = Page::new(query.skip, query.limit)?;
    let incidents = state
        .engine
        .admin()
        .list_incidents(&actor, query.resolved, page)
        .await?;
    Ok(Json(incidents))
}

pub async fn list_invitations(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Invitation>>> {
    let invitations = state
        .engine
        .admin()
        .list_invitations(&actor, query.page()?)
        .await?;
    Ok(Json(invitations))
}

pub async fn list_decisions(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Query(query): Query<DecisionQuery>,
) -> ApiResult<Json<Vec<DecisionRecord>>> {
    let page = Page::new(query.skip, query.limit)?;
    let records = state
        .engine
        .admin()
        .list_decisions(&actor, query.actor_id, page)
        .await?;
    Ok(Json(records))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_defaults_and_bounds() {
        assert_eq!(PageQuery::default().page().unwrap(), Page::default());

        let too_large = PageQuery {
            skip: None,
            limit: Some(500),
        };
        assert!(matches!(too_large.page(), Err(ApiError::ValidationError(_))));
    }
}
