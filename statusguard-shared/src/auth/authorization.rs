/// Resource guard: the single authorization decision point
///
/// Every read, create and mutation of a group, project or incident, and every
/// admin-surface call, is decided here. Handlers never re-implement ownership
/// checks.
///
/// # Decision Order
///
/// First match wins:
///
/// 1. Admin-surface targets are decided by [`super::admin::decide`]
///    (self-protection, then active-admin bypass).
/// 2. Inactive caller: `InactiveUser`.
/// 3. Ownership/role on the owning user or group. A caller who cannot see an
///    existing resource at all gets `NotFound`, exactly as for a missing id.
///    A caller who can see it but lacks the level gets `NotOwner`.
/// 4. Create operations: check-and-reserve against the tier quota,
///    `QuotaExceeded { limit }` when full.
/// 5. Allow.
///
/// # Required Level
///
/// | Operation | Personal resource | Group resource |
/// |-----------|-------------------|----------------|
/// | Read      | owner, or public  | member, or public |
/// | Create    | owner             | member         |
/// | Resolve   | owner             | member         |
/// | Update    | owner             | admin          |
/// | Delete    | owner             | admin          |
///
/// # Example
///
/// ```no_run
/// use statusguard_shared::auth::authorization::{Operation, ResourceGuard, ResourceRef};
/// use statusguard_shared::auth::identity::Identity;
/// use statusguard_shared::entitlements::EntitlementResolver;
/// use statusguard_shared::quota::QuotaEnforcer;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, actor: Identity, project_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let guard = ResourceGuard::new(QuotaEnforcer::new(EntitlementResolver::new(true)));
///
/// let mut tx = pool.begin().await?;
/// guard
///     .authorize(&mut tx, &actor, Operation::Update, &ResourceRef::Project(project_id))
///     .await?;
/// // ... perform the update on `tx` ...
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```

use serde::Serialize;
use sqlx::PgConnection;
use tracing::debug;
use uuid::Uuid;

use super::admin::{self, AdminTarget};
use super::identity::Identity;
use crate::error::{Denial, Error};
use crate::models::group::Group;
use crate::models::incident::Incident;
use crate::models::membership::{GroupMembership, GroupRole};
use crate::models::project::Project;
use crate::quota::{QuotaEnforcer, QuotaScope};

/// Operation kinds the guard decides on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Create,
    Update,
    Resolve,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Resolve => "resolve",
            Operation::Delete => "delete",
        }
    }

    /// Minimum group role for this operation on a group-scoped resource
    pub fn required_group_role(&self) -> GroupRole {
        match self {
            Operation::Read | Operation::Create | Operation::Resolve => GroupRole::Member,
            Operation::Update | Operation::Delete => GroupRole::Admin,
        }
    }
}

/// Target of an authorization decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    /// An existing group
    Group(Uuid),

    /// An existing project
    Project(Uuid),

    /// A project about to be created, personal when `group_id` is None
    NewProject { group_id: Option<Uuid> },

    /// An existing incident
    Incident(Uuid),

    /// An incident about to be created in `project_id`
    NewIncident { project_id: Uuid },

    /// The platform-wide admin surface
    Admin(AdminTarget),
}

impl ResourceRef {
    /// Resource type name for logs and the decision log
    pub fn resource_type(&self) -> &'static str {
        match self {
            ResourceRef::Group(_) => "group",
            ResourceRef::Project(_) | ResourceRef::NewProject { .. } => "project",
            ResourceRef::Incident(_) | ResourceRef::NewIncident { .. } => "incident",
            ResourceRef::Admin(target) => target.resource_type(),
        }
    }

    /// Identifier of the target, None for resources not created yet
    pub fn resource_id(&self) -> Option<Uuid> {
        match self {
            ResourceRef::Group(id) | ResourceRef::Project(id) | ResourceRef::Incident(id) => {
                Some(*id)
            }
            ResourceRef::NewProject { .. } | ResourceRef::NewIncident { .. } => None,
            ResourceRef::Admin(target) => target.resource_id(),
        }
    }

    /// Quota scope consumed by creating this resource
    pub fn quota_scope(&self, actor: &Identity) -> Option<QuotaScope> {
        match self {
            ResourceRef::NewProject { .. } => Some(QuotaScope::OwnedProjects {
                user_id: actor.user_id,
            }),
            ResourceRef::NewIncident { project_id } => Some(QuotaScope::ProjectIncidents {
                project_id: *project_id,
            }),
            _ => None,
        }
    }
}

/// Visibility of a resource to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Doesn't exist, or belongs to a deactivated group
    Missing,

    /// Owned by a single user
    Personal { owner_user_id: Uuid, is_public: bool },

    /// Owned by a group; `role` is the caller's role in it
    Group {
        role: Option<GroupRole>,
        is_public: bool,
    },
}

/// Pure ownership decision (steps 2 and 3)
pub fn decide(actor: &Identity, op: Operation, scope: &Scope) -> Result<(), Denial> {
    actor.require_active()?;

    match *scope {
        Scope::Missing => Err(Denial::NotFound),
        Scope::Personal {
            owner_user_id,
            is_public,
        } => {
            if owner_user_id == actor.user_id {
                Ok(())
            } else {
                public_access(op, is_public)
            }
        }
        Scope::Group { role, is_public } => match role {
            Some(role) if role.has_permission(op.required_group_role()) => Ok(()),
            Some(_) => Err(Denial::NotOwner),
            None => public_access(op, is_public),
        },
    }
}

/// Outsiders may read public resources; anything else on a public resource is
/// `NotOwner`, and private resources stay invisible
fn public_access(op: Operation, is_public: bool) -> Result<(), Denial> {
    match (is_public, op) {
        (true, Operation::Read) => Ok(()),
        (true, _) => Err(Denial::NotOwner),
        (false, _) => Err(Denial::NotFound),
    }
}

/// Authorization decision point
#[derive(Debug, Clone, Copy)]
pub struct ResourceGuard {
    quota: QuotaEnforcer,
}

impl ResourceGuard {
    pub fn new(quota: QuotaEnforcer) -> Self {
        Self { quota }
    }

    /// Decides whether `actor` may perform `op` on `resource`
    ///
    /// Must run on the transaction that performs the operation: for create
    /// operations the quota scope stays locked until that transaction ends.
    ///
    /// # Errors
    ///
    /// Returns `Error::Denied` with the typed reason, or a database error.
    /// Denials are not logged here; the calling operation records them after
    /// its transaction rolls back.
    pub async fn authorize(
        &self,
        conn: &mut PgConnection,
        actor: &Identity,
        op: Operation,
        resource: &ResourceRef,
    ) -> Result<(), Error> {
        if let ResourceRef::Admin(target) = resource {
            return Ok(admin::decide(actor, target)?);
        }

        actor.require_active()?;

        let scope = load_scope(conn, actor, resource).await?;
        decide(actor, op, &scope)?;

        if op == Operation::Create {
            if let Some(quota_scope) = resource.quota_scope(actor) {
                let check = self.quota.check_and_reserve(conn, quota_scope).await?;
                if let Some(denial) = check.into_denial(quota_scope.resource()) {
                    return Err(denial.into());
                }
            }
        }

        debug!(
            actor_id = %actor.user_id,
            operation = op.as_str(),
            resource_type = resource.resource_type(),
            resource_id = ?resource.resource_id(),
            "Authorized"
        );
        Ok(())
    }
}

async fn load_scope(
    conn: &mut PgConnection,
    actor: &Identity,
    resource: &ResourceRef,
) -> Result<Scope, sqlx::Error> {
    match resource {
        ResourceRef::Group(group_id)
        | ResourceRef::NewProject {
            group_id: Some(group_id),
        } => group_scope(conn, actor, *group_id).await,
        ResourceRef::NewProject { group_id: None } => Ok(Scope::Personal {
            owner_user_id: actor.user_id,
            is_public: false,
        }),
        ResourceRef::Project(project_id) | ResourceRef::NewIncident { project_id } => {
            project_scope(conn, actor, *project_id).await
        }
        ResourceRef::Incident(incident_id) => {
            match Incident::project_of(&mut *conn, *incident_id).await? {
                Some(project_id) => project_scope(conn, actor, project_id).await,
                None => Ok(Scope::Missing),
            }
        }
        ResourceRef::Admin(_) => Ok(Scope::Missing),
    }
}

async fn group_scope(
    conn: &mut PgConnection,
    actor: &Identity,
    group_id: Uuid,
) -> Result<Scope, sqlx::Error> {
    match Group::find_by_id(&mut *conn, group_id).await? {
        Some(group) if group.is_active => Ok(Scope::Group {
            role: GroupMembership::role_of(&mut *conn, group_id, actor.user_id).await?,
            is_public: false,
        }),
        _ => Ok(Scope::Missing),
    }
}

async fn project_scope(
    conn: &mut PgConnection,
    actor: &Identity,
    project_id: Uuid,
) -> Result<Scope, sqlx::Error> {
    let Some(access) = Project::access(&mut *conn, project_id).await? else {
        return Ok(Scope::Missing);
    };

    match access.group_id {
        None => Ok(Scope::Personal {
            owner_user_id: access.owner_user_id,
            is_public: access.is_public,
        }),
        Some(_) if access.group_active != Some(true) => Ok(Scope::Missing),
        Some(group_id) => Ok(Scope::Group {
            role: GroupMembership::role_of(&mut *conn, group_id, actor.user_id).await?,
            is_public: access.is_public,
        }),
    }
}
