/// Incident model and database operations
///
/// `resolved` / `resolved_at` are set exactly once. There is no un-resolve.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE incidents (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     title VARCHAR(200) NOT NULL,
///     description TEXT NOT NULL,
///     resolved BOOLEAN NOT NULL DEFAULT FALSE,
///     scheduled_start TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     resolved_at TIMESTAMPTZ,
///     CHECK (resolved = (resolved_at IS NOT NULL))
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

use super::Page;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Incident {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub resolved: bool,

    /// Start of a scheduled maintenance window, if this is one
    pub scheduled_start: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreateIncident {
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub scheduled_start: Option<DateTime<Utc>>,
}

const INCIDENT_COLUMNS: &str =
    "id, project_id, title, description, resolved, scheduled_start, created_at, resolved_at";

impl Incident {
    pub async fn find_by_id(db: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Incident>(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Returns the project an incident belongs to
    pub async fn project_of(db: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar("SELECT project_id FROM incidents WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn insert(db: impl PgExecutor<'_>, data: CreateIncident) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Incident>(&format!(
            r#"
            INSERT INTO incidents (project_id, title, description, scheduled_start)
            VALUES ($1, $2, $3, $4)
            RETURNING {INCIDENT_COLUMNS}
            "#
        ))
        .bind(data.project_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.scheduled_start)
        .fetch_one(db)
        .await
    }

    /// Marks an unresolved incident resolved
    ///
    /// # Returns
    ///
    /// The resolved incident, or None if it doesn't exist or was already resolved
    pub async fn resolve(
        db: impl PgExecutor<'_>,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Incident>(&format!(
            r#"
            UPDATE incidents
            SET resolved = TRUE, resolved_at = $2
            WHERE id = $1 AND NOT resolved
            RETURNING {INCIDENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(db)
        .await
    }

    /// Counts a project's incidents (resolved ones included)
    pub async fn count_by_project(
        db: impl PgExecutor<'_>,
        project_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM incidents WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(db)
            .await
    }

    /// Incidents of one project, newest first
    pub async fn list_by_project(
        db: impl PgExecutor<'_>,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Incident>(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE project_id = $1 ORDER BY created_at DESC"
        ))
        .bind(project_id)
        .fetch_all(db)
        .await
    }

    /// All incidents on the platform, optionally filtered by resolution, newest first
    pub async fn list(
        db: impl PgExecutor<'_>,
        resolved: Option<bool>,
        page: Page,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Incident>(&format!(
            r#"
            SELECT {INCIDENT_COLUMNS} FROM incidents
            WHERE ($1::boolean IS NULL OR resolved = $1)
            ORDER BY created_at DESC, id ASC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(resolved)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(db)
        .await
    }
}
