/// Authenticated caller identity
///
/// Every engine operation takes an [`Identity`]: the user the external identity
/// provider vouched for, with the platform-wide admin and active flags as
/// currently stored. The API inserts it into request extensions after
/// validating the bearer token.
///
/// # Example
///
/// ```no_run
/// use statusguard_shared::auth::identity::Identity;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let identity = Identity::resolve(&pool, "Frank@Example.com").await?;
/// identity.require_active()?;
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Denial;
use crate::models::user::User;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,

    /// Lower-cased e-mail address
    pub email: String,

    pub is_admin: bool,
    pub is_active: bool,
}

impl Identity {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            is_admin: user.is_admin,
            is_active: user.is_active,
        }
    }

    /// Resolves a verified e-mail address to an identity
    ///
    /// Creates the user (and its free subscription) on first sight.
    pub async fn resolve(pool: &PgPool, email: &str) -> Result<Self, sqlx::Error> {
        let user = User::find_or_create_by_email(pool, email).await?;
        Ok(Self::from_user(&user))
    }

    /// Denies deactivated callers
    pub fn require_active(&self) -> Result<(), Denial> {
        if self.is_active {
            Ok(())
        } else {
            Err(Denial::InactiveUser)
        }
    }

    /// Whether the caller may use the admin override surface
    pub fn is_active_admin(&self) -> bool {
        self.is_admin && self.is_active
    }
}
