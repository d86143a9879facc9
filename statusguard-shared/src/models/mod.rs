/// Database models for StatusGuard
///
/// Each model is a `sqlx::FromRow` struct plus the queries that touch its table.
/// Queries that must run inside a caller's transaction take a
/// `&mut PgConnection`; single-statement queries accept any
/// [`sqlx::PgExecutor`] so they work with both a pool and a transaction.
///
/// # Models
///
/// - `user`: Platform users with admin/active flags
/// - `subscription`: 1:1 billing state per user (read-only to the engine)
/// - `group`: Tenant groups
/// - `membership`: Per-group roles (owner/admin/member)
/// - `invitation`: Time-bounded group invitations
/// - `project`: Quota-governed projects, personal or group-scoped
/// - `incident`: Quota-governed incidents per project
/// - `decision`: Persisted denied decisions
///
/// # Example
///
/// ```no_run
/// use statusguard_shared::models::{user::User, Page};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let user = User::find_or_create_by_email(&pool, "Alice@Example.com").await?;
/// assert_eq!(user.email, "alice@example.com");
///
/// let first_page = User::list(&pool, Page::default()).await?;
/// # Ok(())
/// # }
/// ```

pub mod decision;
pub mod group;
pub mod incident;
pub mod invitation;
pub mod membership;
pub mod project;
pub mod subscription;
pub mod user;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Offset pagination for listing endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Rows to skip
    pub skip: i64,

    /// Maximum rows to return
    pub limit: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 100;

    /// Validates optional query parameters into a page
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` if `skip` is negative or `limit` is outside `1..=100`
    pub fn new(skip: Option<i64>, limit: Option<i64>) -> Result<Self, Error> {
        let skip = skip.unwrap_or(0);
        let limit = limit.unwrap_or(Self::DEFAULT_LIMIT);

        if skip < 0 {
            return Err(Error::Invalid("skip must be greater than or equal to 0".into()));
        }
        if !(1..=Self::MAX_LIMIT).contains(&limit) {
            return Err(Error::Invalid(format!(
                "limit must be between 1 and {}",
                Self::MAX_LIMIT
            )));
        }

        Ok(Self { skip, limit })
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// Trims and lower-cases an e-mail address for storage and comparison
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults() {
        let page = Page::new(None, None).unwrap();
        assert_eq!(page, Page::default());
        assert_eq!(page.limit, 50);
    }

    #[test]
    fn test_page_bounds() {
        assert!(Page::new(Some(-1), None).is_err());
        assert!(Page::new(None, Some(0)).is_err());
        assert!(Page::new(None, Some(101)).is_err());
        assert_eq!(Page::new(Some(20), Some(100)).unwrap().skip, 20);
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Bob@Example.COM "), "bob@example.com");
    }
}
