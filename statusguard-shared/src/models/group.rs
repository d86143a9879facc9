/// Group model and database operations
///
/// Groups are soft-deactivated, never hard-deleted. `owner_user_id` mirrors the
/// single `owner` membership and is updated in the same transaction as an
/// ownership transfer.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE groups (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(100) NOT NULL,
///     description TEXT,
///     owner_user_id UUID NOT NULL REFERENCES users(id),
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE UNIQUE INDEX groups_owner_name_active ON groups(owner_user_id, name) WHERE is_active;
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use super::membership::GroupRole;
use super::Page;

/// Unique index backing "one active group per name per owner"
pub const OWNER_NAME_CONSTRAINT: &str = "groups_owner_name_active";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub owner_user_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A group as seen by one of its members
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub group: Group,

    /// Caller's role in the group
    pub role: GroupRole,

    pub member_count: i64,
    pub project_count: i64,
}

const GROUP_COLUMNS: &str =
    "id, name, description, owner_user_id, is_active, created_at, updated_at";

impl Group {
    pub async fn find_by_id(db: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Group>(&format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Locks the group row for the rest of the transaction
    ///
    /// Every mutation of a group's membership set takes this lock first, which
    /// serializes them per group.
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Group>(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Inserts a group row (the owner membership is written separately)
    pub async fn insert(
        db: impl PgExecutor<'_>,
        owner_user_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Group>(&format!(
            r#"
            INSERT INTO groups (name, description, owner_user_id)
            VALUES ($1, $2, $3)
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(description)
        .bind(owner_user_id)
        .fetch_one(db)
        .await
    }

    /// Whether `owner_user_id` already owns an active group called `name`
    pub async fn active_name_taken(
        db: impl PgExecutor<'_>,
        owner_user_id: Uuid,
        name: &str,
        except: Option<Uuid>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM groups
                WHERE owner_user_id = $1 AND name = $2 AND is_active
                  AND ($3::uuid IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(owner_user_id)
        .bind(name)
        .bind(except)
        .fetch_one(db)
        .await
    }

    /// Updates name and/or description; `None` keeps the current value
    pub async fn update_details(
        db: impl PgExecutor<'_>,
        id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Group>(&format!(
            r#"
            UPDATE groups
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_one(db)
        .await
    }

    /// Sets the active flag
    ///
    /// # Returns
    ///
    /// The updated group, or None if it doesn't exist
    pub async fn set_active(
        db: impl PgExecutor<'_>,
        id: Uuid,
        is_active: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Group>(&format!(
            r#"
            UPDATE groups
            SET is_active = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(is_active)
        .fetch_optional(db)
        .await
    }

    /// Points `owner_user_id` at the new owner after a transfer
    pub async fn set_owner(
        db: impl PgExecutor<'_>,
        id: Uuid,
        owner_user_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE groups SET owner_user_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(owner_user_id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Lists the active groups a user belongs to, with their role and counts
    pub async fn list_for_member(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
    ) -> Result<Vec<GroupSummary>, sqlx::Error> {
        sqlx::query_as::<_, GroupSummary>(
            r#"
            SELECT g.id, g.name, g.description, g.owner_user_id, g.is_active,
                   g.created_at, g.updated_at,
                   m.role,
                   (SELECT COUNT(*) FROM group_memberships gm WHERE gm.group_id = g.id) AS member_count,
                   (SELECT COUNT(*) FROM projects p WHERE p.group_id = g.id) AS project_count
            FROM groups g
            JOIN group_memberships m ON m.group_id = g.id
            WHERE m.user_id = $1 AND g.is_active
            ORDER BY g.created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await
    }

    /// Lists all groups, including deactivated ones
    pub async fn list(db: impl PgExecutor<'_>, page: Page) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Group>(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups ORDER BY created_at ASC, id ASC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(db)
        .await
    }
}
