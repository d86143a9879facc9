/// Quota enforcement for tier-based resource limits
///
/// Quotas are enforced on:
/// - Projects per creating user, personal and group projects alike
/// - Incidents per project (charged to the project's quota principal)
///
/// # Check-and-reserve
///
/// [`QuotaEnforcer::check_and_reserve`] runs inside the caller's transaction.
/// It locks the row that owns the quota scope (`users` or `projects`),
/// counts existing units, and compares against the principal's entitlement.
/// The lock is held until the caller commits the insert, so two concurrent
/// creations at the limit boundary cannot both pass.
///
/// Limits are checked only at creation time. A downgrade can leave a scope over
/// quota; existing units are kept and new ones are refused.
///
/// # Example
///
/// ```no_run
/// use statusguard_shared::entitlements::EntitlementResolver;
/// use statusguard_shared::quota::{QuotaEnforcer, QuotaScope};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let enforcer = QuotaEnforcer::new(EntitlementResolver::new(true));
///
/// let mut tx = pool.begin().await?;
/// let check = enforcer
///     .check_and_reserve(&mut tx, QuotaScope::OwnedProjects { user_id })
///     .await?;
///
/// if check.allowed {
///     // insert the project on the same transaction, then commit
/// }
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use tracing::debug;
use uuid::Uuid;

use crate::entitlements::{EntitlementResolver, Limits};
use crate::error::{Denial, Error};
use crate::models::group::Group;
use crate::models::incident::Incident;
use crate::models::project::Project;
use crate::models::user::User;

/// Quota-governed resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaResource {
    Projects,
    IncidentsPerProject,
}

impl QuotaResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaResource::Projects => "projects",
            QuotaResource::IncidentsPerProject => "incidents_per_project",
        }
    }

    /// Limit for this resource in `limits`, None = uncapped
    pub fn limit_in(&self, limits: &Limits) -> Option<i64> {
        match self {
            QuotaResource::Projects => limits.max_projects,
            QuotaResource::IncidentsPerProject => limits.max_incidents_per_project,
        }
    }
}

/// The unit of serialization and counting for one quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaScope {
    /// Every project created by a user, including those placed in a group
    OwnedProjects { user_id: Uuid },

    /// Incidents of a project
    ProjectIncidents { project_id: Uuid },
}

impl QuotaScope {
    pub fn resource(&self) -> QuotaResource {
        match self {
            QuotaScope::OwnedProjects { .. } => QuotaResource::Projects,
            QuotaScope::ProjectIncidents { .. } => QuotaResource::IncidentsPerProject,
        }
    }
}

/// Result of quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaCheckResult {
    /// Whether one more unit may be created
    pub allowed: bool,

    /// Current usage
    pub current: i64,

    /// Maximum allowed, None = uncapped
    pub limit: Option<i64>,

    /// Remaining units, None = uncapped
    pub remaining: Option<i64>,
}

impl QuotaCheckResult {
    /// Compares current usage against a limit
    pub fn evaluate(current: i64, limit: Option<i64>) -> Self {
        match limit {
            None => QuotaCheckResult {
                allowed: true,
                current,
                limit,
                remaining: None,
            },
            Some(max) => QuotaCheckResult {
                allowed: current < max,
                current,
                limit,
                remaining: Some((max - current).max(0)),
            },
        }
    }

    /// Converts a refused check into the client-facing denial
    pub fn into_denial(self, resource: QuotaResource) -> Option<Denial> {
        if self.allowed {
            return None;
        }
        Some(Denial::QuotaExceeded {
            resource,
            limit: self.limit.unwrap_or_default(),
        })
    }
}

/// Quota enforcement service
#[derive(Debug, Clone, Copy)]
pub struct QuotaEnforcer {
    resolver: EntitlementResolver,
}

impl QuotaEnforcer {
    pub fn new(resolver: EntitlementResolver) -> Self {
        QuotaEnforcer { resolver }
    }

    /// Locks the scope, counts usage and compares it to the principal's limit
    ///
    /// Must be called on the transaction that will perform the insert.
    ///
    /// # Errors
    ///
    /// Returns `Denial::NotFound` if the scope's owning row doesn't exist, or
    /// a database error.
    pub async fn check_and_reserve(
        &self,
        conn: &mut PgConnection,
        scope: QuotaScope,
    ) -> Result<QuotaCheckResult, Error> {
        let (principal, current) = match scope {
            QuotaScope::OwnedProjects { user_id } => {
                User::lock(&mut *conn, user_id)
                    .await?
                    .ok_or(Denial::NotFound)?;
                (user_id, Project::count_owned(&mut *conn, user_id).await?)
            }
            QuotaScope::ProjectIncidents { project_id } => {
                let project = Project::lock(&mut *conn, project_id)
                    .await?
                    .ok_or(Denial::NotFound)?;
                let principal = match project.group_id {
                    Some(group_id) => {
                        Group::find_by_id(&mut *conn, group_id)
                            .await?
                            .ok_or(Denial::NotFound)?
                            .owner_user_id
                    }
                    None => project.owner_user_id,
                };
                (
                    principal,
                    Incident::count_by_project(&mut *conn, project_id).await?,
                )
            }
        };

        let entitlement = self.resolver.resolve(&mut *conn, principal).await?;
        let resource = scope.resource();
        let result = QuotaCheckResult::evaluate(current, resource.limit_in(&entitlement.limits));

        debug!(
            ?scope,
            %principal,
            current = result.current,
            limit = ?result.limit,
            allowed = result.allowed,
            "Quota checked"
        );

        Ok(result)
    }
}
