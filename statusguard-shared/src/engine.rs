/// Engine facade
///
/// Owns the pool and the process-wide settings, and hands out the component
/// services. Cloning is cheap; the API keeps one in its state.
///
/// # Example
///
/// ```no_run
/// use statusguard_shared::engine::{Engine, EngineConfig};
/// use statusguard_shared::auth::identity::Identity;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let engine = Engine::new(pool.clone(), EngineConfig::default());
/// let owner = Identity::resolve(&pool, "owner@example.com").await?;
///
/// let groups = engine.memberships().list_groups(&owner).await?;
/// println!("{} groups", groups.len());
/// # Ok(())
/// # }
/// ```

use serde::Serialize;
use sqlx::PgPool;

use crate::audit::DecisionLog;
use crate::auth::admin::AdminOverride;
use crate::auth::authorization::ResourceGuard;
use crate::auth::identity::Identity;
use crate::db::retry::RetryPolicy;
use crate::entitlements::{Entitlement, EntitlementResolver, Usage};
use crate::error::Result;
use crate::groups::MembershipStore;
use crate::invitations::InvitationStateMachine;
use crate::models::subscription::Subscription;
use crate::projects::ProjectService;
use crate::quota::QuotaEnforcer;

/// Process-wide engine settings, read once at startup
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Enforce finite tier limits; when false every user is unlimited
    pub billing_enabled: bool,

    /// Expose the admin override layer
    pub admin_enabled: bool,

    pub retry: RetryPolicy,
}

/// Caller's subscription, resolved limits and current consumption
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionOverview {
    pub subscription: Option<Subscription>,
    pub entitlement: Entitlement,
    pub usage: Usage,
    pub billing_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct Engine {
    db: PgPool,
    config: EngineConfig,
    entitlements: EntitlementResolver,
    guard: ResourceGuard,
    decisions: DecisionLog,
}

impl Engine {
    pub fn new(db: PgPool, config: EngineConfig) -> Self {
        let entitlements = EntitlementResolver::new(config.billing_enabled);
        let guard = ResourceGuard::new(QuotaEnforcer::new(entitlements));
        let decisions = DecisionLog::new(db.clone());

        Self {
            db,
            config,
            entitlements,
            guard,
            decisions,
        }
    }

    pub fn db(&self) -> &PgPool {
        &self.db
    }

    pub fn billing_enabled(&self) -> bool {
        self.config.billing_enabled
    }

    pub fn admin_enabled(&self) -> bool {
        self.config.admin_enabled
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry
    }

    pub fn entitlements(&self) -> &EntitlementResolver {
        &self.entitlements
    }

    pub fn guard(&self) -> &ResourceGuard {
        &self.guard
    }

    pub fn decisions(&self) -> &DecisionLog {
        &self.decisions
    }

    pub fn memberships(&self) -> MembershipStore<'_> {
        MembershipStore::new(self)
    }

    pub fn invitations(&self) -> InvitationStateMachine<'_> {
        InvitationStateMachine::new(self)
    }

    pub fn projects(&self) -> ProjectService<'_> {
        ProjectService::new(self)
    }

    pub fn admin(&self) -> AdminOverride<'_> {
        AdminOverride::new(self)
    }

    /// Subscription, entitlement and usage of the caller
    pub async fn subscription_overview(&self, actor: &Identity) -> Result<SubscriptionOverview> {
        actor.require_active()?;

        let subscription = Subscription::find_by_user(&self.db, actor.user_id).await?;
        let entitlement =
            Entitlement::from_subscription(subscription.as_ref(), self.billing_enabled());
        let usage = self.entitlements.usage(&self.db, actor.user_id).await?;

        Ok(SubscriptionOverview {
            subscription,
            entitlement,
            usage,
            billing_enabled: self.billing_enabled(),
        })
    }
}
