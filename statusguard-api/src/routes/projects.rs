/// Project and incident endpoints
///
/// Every request is routed through the Resource Guard. A project the caller
/// can't see answers `404`, exactly like a project that doesn't exist.
///
/// # Endpoints
///
/// - `POST /v1/projects` - Create project (quota-checked)
/// - `GET /v1/projects` - Personal and group projects
/// - `GET /v1/projects/:id` - Project
/// - `PATCH /v1/projects/:id` - Rename or change visibility
/// - `GET /v1/projects/:id/incidents` - Incidents of a project
/// - `POST /v1/incidents` - Open incident (quota-checked)
/// - `POST /v1/incidents/:id/resolve` - Resolve incident

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Serialize;
use statusguard_shared::auth::identity::Identity;
use statusguard_shared::models::incident::Incident;
use statusguard_shared::models::project::{Project, UpdateProject};
use statusguard_shared::projects::{NewIncident, NewProject};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ListProjectsResponse {
    pub projects: Vec<Project>,
}

#[derive(Debug, Serialize)]
pub struct ListIncidentsResponse {
    pub incidents: Vec<Incident>,
}

/// Create project
///
/// ```text
/// POST /v1/projects
/// Authorization: Bearer <jwt_token>
/// Content-Type: application/json
///
/// {
///   "name": "api.example.com",
///   "group_id": null,
///   "is_public": false
/// }
/// ```
///
/// # Errors
///
/// - `403 Forbidden` with reason `quota_exceeded` and `limit`: tier limit reached
/// - `404 Not Found`: Group doesn't exist or caller isn't a member
pub async fn create_project(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Json(req): Json<NewProject>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let project = state.engine.projects().create_project(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn list_projects(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
) -> ApiResult<Json<ListProjectsResponse>> {
    let projects = state.engine.projects().list_projects(&actor).await?;
    Ok(Json(ListProjectsResponse { projects }))
}

pub async fn get_project(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Project>> {
    let project = state.engine.projects().get_project(&actor, project_id).await?;
    Ok(Json(project))
}

/// Update project
///
/// ```text
/// PATCH /v1/projects/:id
/// Authorization: Bearer <jwt_token>
/// Content-Type: application/json
///
/// { "is_public": true }
/// ```
pub async fn update_project(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<UpdateProject>,
) -> ApiResult<Json<Project>> {
    let project = state
        .engine
        .projects()
        .update_project(&actor, project_id, req)
        .await?;
    Ok(Json(project))
}

pub async fn list_incidents(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<ListIncidentsResponse>> {
    let incidents = state
        .engine
        .projects()
        .list_incidents(&actor, project_id)
        .await?;
    Ok(Json(ListIncidentsResponse { incidents }))
}

pub async fn create_incident(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Json(req): Json<NewIncident>,
) -> ApiResult<(StatusCode, Json<Incident>)> {
    let incident = state.engine.projects().create_incident(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(incident)))
}

/// Resolve incident
///
/// # Errors
///
/// - `409 Conflict` with reason `invalid_transition`: already resolved
pub async fn resolve_incident(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(incident_id): Path<Uuid>,
) -> ApiResult<Json<Incident>> {
    let incident = state
        .engine
        .projects()
        .resolve_incident(&actor, incident_id)
        .await?;
    Ok(Json(incident))
}
