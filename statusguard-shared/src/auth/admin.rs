/// Admin override layer
///
/// Platform administrators (`users.is_admin`) get cross-tenant list, read and
/// update access to every entity, independent of any group role.
///
/// # Decision Order
///
/// 1. Self-protection: an admin changing their own flags so that `is_admin` or
///    `is_active` becomes false is denied `SelfProtection`. This runs before
///    the admin check, so every admin operation inherits it.
/// 2. Active admin: allowed.
/// 3. Inactive caller: `InactiveUser` (an inactive admin included).
/// 4. Everyone else: `Forbidden`.
///
/// The whole layer is switched off by the `admin` feature toggle, in which
/// case every operation fails with `Error::FeatureDisabled`.

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::identity::Identity;
use crate::audit::AuditTarget;
use crate::engine::Engine;
use crate::error::{Denial, Error, Result};
use crate::models::decision::DecisionRecord;
use crate::models::group::{Group, OWNER_NAME_CONSTRAINT};
use crate::models::incident::Incident;
use crate::models::invitation::Invitation;
use crate::models::project::{Project, UpdateProject};
use crate::models::subscription::Subscription;
use crate::models::user::{UpdateUserFlags, User};
use crate::models::Page;

/// Feature name reported when the admin toggle is off
pub const ADMIN_FEATURE: &str = "admin";

/// Target on the admin surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminTarget {
    Stats,
    Users,
    User(Uuid),
    UserFlags { user_id: Uuid, change: UpdateUserFlags },
    Subscriptions,
    Groups,
    Group(Uuid),
    Projects,
    Project(Uuid),
    Incidents,
    Invitations,
    Decisions,
}

impl AdminTarget {
    pub fn resource_type(&self) -> &'static str {
        match self {
            AdminTarget::Stats => "platform",
            AdminTarget::Users | AdminTarget::User(_) | AdminTarget::UserFlags { .. } => "user",
            AdminTarget::Subscriptions => "subscription",
            AdminTarget::Groups | AdminTarget::Group(_) => "group",
            AdminTarget::Projects | AdminTarget::Project(_) => "project",
            AdminTarget::Incidents => "incident",
            AdminTarget::Invitations => "invitation",
            AdminTarget::Decisions => "decision",
        }
    }

    pub fn resource_id(&self) -> Option<Uuid> {
        match self {
            AdminTarget::User(id)
            | AdminTarget::UserFlags { user_id: id, .. }
            | AdminTarget::Group(id)
            | AdminTarget::Project(id) => Some(*id),
            _ => None,
        }
    }
}

/// Pure admin-surface decision
pub fn decide(actor: &Identity, target: &AdminTarget) -> std::result::Result<(), Denial> {
    if let AdminTarget::UserFlags { user_id, change } = target {
        if *user_id == actor.user_id && change.revokes_access() {
            return Err(Denial::SelfProtection);
        }
    }

    if actor.is_active_admin() {
        return Ok(());
    }

    actor.require_active()?;
    Err(Denial::Forbidden)
}

/// Platform-wide counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PlatformStats {
    pub users: i64,
    pub active_users: i64,
    pub pro_subscribers: i64,
    pub projects: i64,
    pub incidents: i64,
    pub unresolved_incidents: i64,
    pub groups: i64,
    pub active_groups: i64,
    pub pending_invitations: i64,
}

/// Cross-tenant operations for platform administrators
pub struct AdminOverride<'a> {
    engine: &'a Engine,
}

impl<'a> AdminOverride<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Gates, decides and audits one admin operation
    async fn run<T, Fut>(
        &self,
        actor: &Identity,
        action: &'static str,
        target: AdminTarget,
        op: impl FnOnce() -> Fut,
    ) -> Result<T>
    where
        Fut: std::future::Future<Output = Result<T>>,
    {
        if !self.engine.admin_enabled() {
            return Err(Error::FeatureDisabled(ADMIN_FEATURE));
        }

        let result = match decide(actor, &target) {
            Ok(()) => op().await,
            Err(denial) => Err(denial.into()),
        };

        self.engine
            .decisions()
            .observe(
                actor,
                action,
                AuditTarget::new(target.resource_type(), target.resource_id()),
                result,
            )
            .await
    }

    pub async fn stats(&self, actor: &Identity) -> Result<PlatformStats> {
        self.run(actor, "admin_stats", AdminTarget::Stats, || async {
            let stats = sqlx::query_as::<_, PlatformStats>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM users) AS users,
                    (SELECT COUNT(*) FROM users WHERE is_active) AS active_users,
                    (SELECT COUNT(*) FROM subscriptions
                     WHERE tier = 'pro' AND status NOT IN ('none', 'expired')) AS pro_subscribers,
                    (SELECT COUNT(*) FROM projects) AS projects,
                    (SELECT COUNT(*) FROM incidents) AS incidents,
                    (SELECT COUNT(*) FROM incidents WHERE NOT resolved) AS unresolved_incidents,
                    (SELECT COUNT(*) FROM groups) AS groups,
                    (SELECT COUNT(*) FROM groups WHERE is_active) AS active_groups,
                    (SELECT COUNT(*) FROM invitations WHERE status = 'pending') AS pending_invitations
                "#,
            )
            .fetch_one(self.engine.db())
            .await?;
            Ok(stats)
        })
        .await
    }

    pub async fn list_users(&self, actor: &Identity, page: Page) -> Result<Vec<User>> {
        self.run(actor, "admin_list_users", AdminTarget::Users, || async {
            Ok(User::list(self.engine.db(), page).await?)
        })
        .await
    }

    pub async fn get_user(&self, actor: &Identity, user_id: Uuid) -> Result<User> {
        self.run(actor, "admin_get_user", AdminTarget::User(user_id), || async {
            User::find_by_id(self.engine.db(), user_id)
                .await?
                .ok_or_else(|| Denial::NotFound.into())
        })
        .await
    }

    /// Changes a user's active/admin flags
    ///
    /// An admin can never revoke their own admin or active flag here.
    pub async fn update_user(
        &self,
        actor: &Identity,
        user_id: Uuid,
        change: UpdateUserFlags,
    ) -> Result<User> {
        let target = AdminTarget::UserFlags { user_id, change };

        self.run(actor, "admin_update_user", target, || async {
            let user = User::update_flags(self.engine.db(), user_id, change)
                .await?
                .ok_or(Denial::NotFound)?;

            info!(
                actor_id = %actor.user_id,
                %user_id,
                is_active = user.is_active,
                is_admin = user.is_admin,
                "User flags updated by admin"
            );
            Ok(user)
        })
        .await
    }

    pub async fn list_subscriptions(&self, actor: &Identity, page: Page) -> Result<Vec<Subscription>> {
        self.run(actor, "admin_list_subscriptions", AdminTarget::Subscriptions, || async {
            Ok(Subscription::list(self.engine.db(), page).await?)
        })
        .await
    }

    pub async fn list_groups(&self, actor: &Identity, page: Page) -> Result<Vec<Group>> {
        self.run(actor, "admin_list_groups", AdminTarget::Groups, || async {
            Ok(Group::list(self.engine.db(), page).await?)
        })
        .await
    }

    /// Activates or deactivates any group
    ///
    /// Reactivation fails with `Conflict` when the owner already has another
    /// active group with the same name.
    pub async fn set_group_active(
        &self,
        actor: &Identity,
        group_id: Uuid,
        is_active: bool,
    ) -> Result<Group> {
        self.run(actor, "admin_update_group", AdminTarget::Group(group_id), || async {
            let group = Group::set_active(self.engine.db(), group_id, is_active)
                .await
                .map_err(|e| {
                    Error::conflict_on(
                        e,
                        OWNER_NAME_CONSTRAINT,
                        "The owner already has an active group with this name",
                    )
                })?
                .ok_or(Denial::NotFound)?;

            info!(actor_id = %actor.user_id, %group_id, is_active, "Group toggled by admin");
            Ok(group)
        })
        .await
    }

    pub async fn list_projects(&self, actor: &Identity, page: Page) -> Result<Vec<Project>> {
        self.run(actor, "admin_list_projects", AdminTarget::Projects, || async {
            Ok(Project::list(self.engine.db(), page).await?)
        })
        .await
    }

    /// Changes the visibility of any project
    pub async fn set_project_public(
        &self,
        actor: &Identity,
        project_id: Uuid,
        is_public: bool,
    ) -> Result<Project> {
        self.run(actor, "admin_update_project", AdminTarget::Project(project_id), || async {
            let change = UpdateProject {
                name: None,
                is_public: Some(is_public),
            };
            let project = Project::update(self.engine.db(), project_id, &change)
                .await?
                .ok_or(Denial::NotFound)?;

            info!(actor_id = %actor.user_id, %project_id, is_public, "Project visibility changed by admin");
            Ok(project)
        })
        .await
    }

    pub async fn list_incidents(
        &self,
        actor: &Identity,
        resolved: Option<bool>,
        page: Page,
    ) -> Result<Vec<Incident>> {
        self.run(actor, "admin_list_incidents", AdminTarget::Incidents, || async {
            Ok(Incident::list(self.engine.db(), resolved, page).await?)
        })
        .await
    }

    /// Lists invitations with expiry evaluated as of now
    pub async fn list_invitations(&self, actor: &Identity, page: Page) -> Result<Vec<Invitation>> {
        self.run(actor, "admin_list_invitations", AdminTarget::Invitations, || async {
            let now = Utc::now();
            let invitations = Invitation::list(self.engine.db(), page).await?;
            Ok(invitations.into_iter().map(|i| i.as_of(now)).collect())
        })
        .await
    }

    /// Lists decision-log rows, newest first, optionally for one actor
    pub async fn list_decisions(
        &self,
        actor: &Identity,
        actor_filter: Option<Uuid>,
        page: Page,
    ) -> Result<Vec<DecisionRecord>> {
        self.run(actor, "admin_list_decisions", AdminTarget::Decisions, || async {
            let records = match actor_filter {
                Some(actor_id) => {
                    DecisionRecord::list_by_actor(self.engine.db(), actor_id, page).await?
                }
                None => self.engine.decisions().list(page).await?,
            };
            Ok(records)
        })
        .await
    }
}
