/// User model and database operations
///
/// Users are created on first successful identity resolution and are never
/// hard-deleted; deactivation flips `is_active`. Only the admin override layer
/// changes `is_active` / `is_admin`.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email TEXT NOT NULL UNIQUE,           -- stored lower-cased
///     name VARCHAR(255),
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     is_admin BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use statusguard_shared::models::user::{User, UpdateUserFlags};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let user = User::find_or_create_by_email(&pool, "carol@example.com").await?;
///
/// User::update_flags(&pool, user.id, UpdateUserFlags {
///     is_active: None,
///     is_admin: Some(true),
/// }).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::info;
use uuid::Uuid;

use super::{normalize_email, Page};

/// Platform user
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID
    pub id: Uuid,

    /// Lower-cased e-mail address
    pub email: String,

    /// Display name
    pub name: Option<String>,

    /// Deactivated users are denied every operation
    pub is_active: bool,

    /// Platform administrator flag
    pub is_admin: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Admin-driven change to a user's flags
///
/// `None` leaves the flag unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUserFlags {
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
}

impl UpdateUserFlags {
    /// Whether the change revokes admin or active status
    pub fn revokes_access(&self) -> bool {
        self.is_active == Some(false) || self.is_admin == Some(false)
    }
}

const USER_COLUMNS: &str = "id, email, name, is_active, is_admin, created_at, updated_at";

impl User {
    /// Returns the user for `email`, creating it with a free subscription on first sight
    ///
    /// The address is trimmed and lower-cased first, so lookups are
    /// case-insensitive. User and subscription rows are written in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn find_or_create_by_email(pool: &PgPool, email: &str) -> Result<Self, sqlx::Error> {
        let email = normalize_email(email);

        if let Some(user) = Self::find_by_email(pool, &email).await? {
            return Ok(user);
        }

        let mut tx = pool.begin().await?;

        // DO UPDATE (not DO NOTHING) so RETURNING yields the row when a
        // concurrent request inserted it first
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email)
            VALUES ($1)
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&email)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, tier, status)
            VALUES ($1, 'free', 'none')
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(user_id = %user.id, "Created user on first identity resolution");
        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id(db: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Finds a user by normalized e-mail address
    pub async fn find_by_email(
        db: impl PgExecutor<'_>,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(normalize_email(email))
            .fetch_optional(db)
            .await
    }

    /// Locks the user row for the rest of the transaction
    ///
    /// Serializes quota checks for personal resources owned by this user.
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Applies an admin flag change
    ///
    /// # Returns
    ///
    /// The updated user, or None if it doesn't exist
    pub async fn update_flags(
        db: impl PgExecutor<'_>,
        id: Uuid,
        flags: UpdateUserFlags,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET is_active = COALESCE($2, is_active),
                is_admin = COALESCE($3, is_admin),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(flags.is_active)
        .bind(flags.is_admin)
        .fetch_optional(db)
        .await
    }

    /// Lists users, oldest first
    pub async fn list(db: impl PgExecutor<'_>, page: Page) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC, id ASC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(db)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revokes_access() {
        assert!(UpdateUserFlags {
            is_active: Some(false),
            is_admin: None
        }
        .revokes_access());
        assert!(UpdateUserFlags {
            is_active: None,
            is_admin: Some(false)
        }
        .revokes_access());
        assert!(!UpdateUserFlags {
            is_active: Some(true),
            is_admin: Some(true)
        }
        .revokes_access());
        assert!(!UpdateUserFlags::default().revokes_access());
    }
}
