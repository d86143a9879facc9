/// Group membership model and database operations
///
/// A many-to-many relationship between users and groups with a per-group role.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE group_role AS ENUM ('owner', 'admin', 'member');
///
/// CREATE TABLE group_memberships (
///     group_id UUID NOT NULL REFERENCES groups(id),
///     user_id UUID NOT NULL REFERENCES users(id),
///     role group_role NOT NULL DEFAULT 'member',
///     joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (group_id, user_id)
/// );
///
/// -- at most one owner per group
/// CREATE UNIQUE INDEX group_memberships_single_owner
///     ON group_memberships(group_id) WHERE role = 'owner';
/// ```
///
/// # Roles
///
/// - **owner**: Everything, including ownership transfer and deactivation
/// - **admin**: Invite, change roles below owner, remove non-owners, edit group resources
/// - **member**: Read group resources, create projects and incidents, resolve incidents
///
/// # Example
///
/// ```no_run
/// use statusguard_shared::models::membership::{GroupMembership, GroupRole};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, group_id: Uuid, user_id: Uuid) -> Result<(), sqlx::Error> {
/// if let Some(role) = GroupMembership::role_of(&pool, group_id, user_id).await? {
///     println!("role: {}", role.as_str());
/// }
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Primary key of `group_memberships`
pub const MEMBERSHIP_PKEY: &str = "group_memberships_pkey";

/// Per-group role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "group_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Owner,
    Admin,
    Member,
}

impl GroupRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::Owner => "owner",
            GroupRole::Admin => "admin",
            GroupRole::Member => "member",
        }
    }

    /// Checks if this role is at least `required`
    ///
    /// Hierarchy: Owner > Admin > Member
    pub fn has_permission(&self, required: GroupRole) -> bool {
        self.permission_level() >= required.permission_level()
    }

    /// Numeric permission level for comparison
    pub fn permission_level(&self) -> u8 {
        match self {
            GroupRole::Owner => 3,
            GroupRole::Admin => 2,
            GroupRole::Member => 1,
        }
    }

    /// Can invite users, change roles below owner, and remove non-owners
    pub fn can_manage_members(&self) -> bool {
        self.has_permission(GroupRole::Admin)
    }
}

/// A user's membership in a group
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupMembership {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub role: GroupRole,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Member listing entry for group detail views
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberInfo {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: GroupRole,
    pub joined_at: DateTime<Utc>,
}

const MEMBERSHIP_COLUMNS: &str = "group_id, user_id, role, joined_at, updated_at";

impl GroupMembership {
    /// Gets a user's role in a group, None if not a member
    pub async fn role_of(
        db: impl PgExecutor<'_>,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupRole>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT role FROM group_memberships WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(db)
        .await
    }

    /// Gets the role held by the user with e-mail `email`, None if not a member
    pub async fn role_of_email(
        db: impl PgExecutor<'_>,
        group_id: Uuid,
        email: &str,
    ) -> Result<Option<GroupRole>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT m.role
            FROM group_memberships m
            JOIN users u ON u.id = m.user_id
            WHERE m.group_id = $1 AND u.email = $2
            "#,
        )
        .bind(group_id)
        .bind(email)
        .fetch_optional(db)
        .await
    }

    /// Adds a user to a group
    ///
    /// # Errors
    ///
    /// Fails with a unique violation on [`MEMBERSHIP_PKEY`] if the user is
    /// already a member, or on the single-owner index if `role` is owner and the
    /// group already has one.
    pub async fn insert(
        db: impl PgExecutor<'_>,
        group_id: Uuid,
        user_id: Uuid,
        role: GroupRole,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, GroupMembership>(&format!(
            r#"
            INSERT INTO group_memberships (group_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        ))
        .bind(group_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(db)
        .await
    }

    /// Changes a member's role
    ///
    /// # Returns
    ///
    /// The updated membership, or None if the user is not a member
    pub async fn update_role(
        db: impl PgExecutor<'_>,
        group_id: Uuid,
        user_id: Uuid,
        role: GroupRole,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GroupMembership>(&format!(
            r#"
            UPDATE group_memberships
            SET role = $3, updated_at = NOW()
            WHERE group_id = $1 AND user_id = $2
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        ))
        .bind(group_id)
        .bind(user_id)
        .bind(role)
        .fetch_optional(db)
        .await
    }

    /// Removes a member, returning whether a row was deleted
    pub async fn delete(
        db: impl PgExecutor<'_>,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM group_memberships WHERE group_id = $1 AND user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists members with their e-mail, owner first
    pub async fn list_members(
        db: impl PgExecutor<'_>,
        group_id: Uuid,
    ) -> Result<Vec<MemberInfo>, sqlx::Error> {
        sqlx::query_as::<_, MemberInfo>(
            r#"
            SELECT m.user_id, u.email, u.name, m.role, m.joined_at
            FROM group_memberships m
            JOIN users u ON u.id = m.user_id
            WHERE m.group_id = $1
            ORDER BY m.role ASC, m.joined_at ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(db)
        .await
    }

    /// Counts owner rows in a group (1 for every healthy active group)
    pub async fn count_owners(db: impl PgExecutor<'_>, group_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM group_memberships WHERE group_id = $1 AND role = 'owner'",
        )
        .bind(group_id)
        .fetch_one(db)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_role_as_str() {
        assert_eq!(GroupRole::Owner.as_str(), "owner");
        assert_eq!(GroupRole::Admin.as_str(), "admin");
        assert_eq!(GroupRole::Member.as_str(), "member");
    }

    #[test]
    fn test_role_hierarchy() {
        assert!(GroupRole::Owner.has_permission(GroupRole::Admin));
        assert!(GroupRole::Owner.has_permission(GroupRole::Member));
        assert!(GroupRole::Admin.has_permission(GroupRole::Admin));
        assert!(GroupRole::Admin.has_permission(GroupRole::Member));
        assert!(!GroupRole::Admin.has_permission(GroupRole::Owner));
        assert!(!GroupRole::Member.has_permission(GroupRole::Admin));
    }

    #[test]
    fn test_can_manage_members() {
        assert!(GroupRole::Owner.can_manage_members());
        assert!(GroupRole::Admin.can_manage_members());
        assert!(!GroupRole::Member.can_manage_members());
    }
}
