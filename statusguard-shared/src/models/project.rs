/// Project model and database operations
///
/// A project is personal when `group_id` is NULL and group-scoped otherwise.
/// Creation is quota-governed; see `crate::quota`.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE projects (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(200) NOT NULL,
///     owner_user_id UUID NOT NULL REFERENCES users(id),
///     group_id UUID REFERENCES groups(id),
///     is_public BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use super::Page;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,

    /// Creating user; the quota principal for personal projects
    pub owner_user_id: Uuid,

    /// Owning group, None for personal projects
    pub group_id: Option<Uuid>,

    /// Readable by any active user when true
    pub is_public: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Project row joined with the state of its owning group
///
/// This is everything the resource guard needs to decide on a project.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectAccess {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub group_id: Option<Uuid>,
    pub is_public: bool,

    /// None for personal projects
    pub group_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct CreateProject {
    pub name: String,
    pub owner_user_id: Uuid,
    pub group_id: Option<Uuid>,
    pub is_public: bool,
}

/// Partial update; `None` keeps the current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub is_public: Option<bool>,
}

const PROJECT_COLUMNS: &str =
    "id, name, owner_user_id, group_id, is_public, created_at, updated_at";

impl Project {
    pub async fn find_by_id(db: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Loads the access facts of a project
    pub async fn access(
        db: impl PgExecutor<'_>,
        id: Uuid,
    ) -> Result<Option<ProjectAccess>, sqlx::Error> {
        sqlx::query_as::<_, ProjectAccess>(
            r#"
            SELECT p.id, p.owner_user_id, p.group_id, p.is_public, g.is_active AS group_active
            FROM projects p
            LEFT JOIN groups g ON g.id = p.group_id
            WHERE p.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Locks the project row for the rest of the transaction
    ///
    /// Serializes incident quota checks per project.
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    pub async fn insert(db: impl PgExecutor<'_>, data: CreateProject) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects (name, owner_user_id, group_id, is_public)
            VALUES ($1, $2, $3, $4)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(&data.name)
        .bind(data.owner_user_id)
        .bind(data.group_id)
        .bind(data.is_public)
        .fetch_one(db)
        .await
    }

    /// Applies a partial update
    ///
    /// # Returns
    ///
    /// The updated project, or None if it doesn't exist
    pub async fn update(
        db: impl PgExecutor<'_>,
        id: Uuid,
        data: &UpdateProject,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            r#"
            UPDATE projects
            SET name = COALESCE($2, name),
                is_public = COALESCE($3, is_public),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&data.name)
        .bind(data.is_public)
        .fetch_optional(db)
        .await
    }

    /// Counts every project created by `user_id`, personal or in a group
    pub async fn count_owned(db: impl PgExecutor<'_>, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE owner_user_id = $1")
            .bind(user_id)
            .fetch_one(db)
            .await
    }

    /// Personal projects of `user_id` plus projects of active groups they belong to
    pub async fn list_visible(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            r#"
            SELECT p.id, p.name, p.owner_user_id, p.group_id, p.is_public, p.created_at, p.updated_at
            FROM projects p
            WHERE (p.group_id IS NULL AND p.owner_user_id = $1)
               OR p.group_id IN (
                   SELECT m.group_id
                   FROM group_memberships m
                   JOIN groups g ON g.id = m.group_id
                   WHERE m.user_id = $1 AND g.is_active
               )
            ORDER BY p.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await
    }

    /// All projects on the platform, newest first
    pub async fn list(db: impl PgExecutor<'_>, page: Page) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects \
             ORDER BY created_at DESC, id ASC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(db)
        .await
    }
}
