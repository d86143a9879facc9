/// Entitlement resolution
///
/// Turns a user's stored subscription into the effective tier and limits that
/// quota enforcement and feature checks use. Resolution always reads the
/// latest committed subscription row; nothing is cached.
///
/// # Limits by Tier
///
/// **Free:**
/// - Projects: 1
/// - Incidents per project: 5
/// - Features: basic_status_page, email_notifications
///
/// **Pro:**
/// - Projects: 10
/// - Incidents per project: 100
/// - Features: free features + custom_domain, advanced_analytics, webhook_notifications
///
/// When billing is disabled every user gets [`Limits::unlimited`]. A `pro`
/// subscription whose status is `expired` or `none` resolves to free limits.
/// A missing subscription row resolves to the free default instead of failing.
///
/// # Example
///
/// ```no_run
/// use statusguard_shared::entitlements::EntitlementResolver;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
/// let resolver = EntitlementResolver::new(true);
/// let entitlement = resolver.resolve(&pool, user_id).await?;
///
/// if entitlement.has_feature("custom_domain") {
///     println!("custom domains enabled");
/// }
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use tracing::debug;
use uuid::Uuid;

use crate::models::subscription::{Subscription, SubscriptionStatus, SubscriptionTier};

pub const FEATURE_BASIC_STATUS_PAGE: &str = "basic_status_page";
pub const FEATURE_EMAIL_NOTIFICATIONS: &str = "email_notifications";
pub const FEATURE_CUSTOM_DOMAIN: &str = "custom_domain";
pub const FEATURE_ADVANCED_ANALYTICS: &str = "advanced_analytics";
pub const FEATURE_WEBHOOK_NOTIFICATIONS: &str = "webhook_notifications";

const FREE_FEATURES: &[&str] = &[FEATURE_BASIC_STATUS_PAGE, FEATURE_EMAIL_NOTIFICATIONS];

const ALL_FEATURES: &[&str] = &[
    FEATURE_BASIC_STATUS_PAGE,
    FEATURE_EMAIL_NOTIFICATIONS,
    FEATURE_CUSTOM_DOMAIN,
    FEATURE_ADVANCED_ANALYTICS,
    FEATURE_WEBHOOK_NOTIFICATIONS,
];

/// Numeric and feature limits
///
/// `None` means no cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub max_projects: Option<i64>,
    pub max_incidents_per_project: Option<i64>,
    pub features: Vec<String>,
}

impl Limits {
    /// Limits for a tier
    pub fn for_tier(tier: SubscriptionTier) -> Self {
        match tier {
            SubscriptionTier::Free => Limits {
                max_projects: Some(1),
                max_incidents_per_project: Some(5),
                features: FREE_FEATURES.iter().map(|f| f.to_string()).collect(),
            },
            SubscriptionTier::Pro => Limits {
                max_projects: Some(10),
                max_incidents_per_project: Some(100),
                features: ALL_FEATURES.iter().map(|f| f.to_string()).collect(),
            },
        }
    }

    /// Limits applied while billing is disabled
    pub fn unlimited() -> Self {
        Limits {
            max_projects: None,
            max_incidents_per_project: None,
            features: ALL_FEATURES.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Resolved entitlement for a user at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    /// Tier the limits were derived from
    pub tier: SubscriptionTier,

    /// Stored subscription status
    pub status: SubscriptionStatus,

    pub limits: Limits,
}

impl Entitlement {
    /// Derives the entitlement from a subscription row
    ///
    /// # Arguments
    ///
    /// * `subscription` - Stored subscription, None if the row is missing
    /// * `billing_enabled` - When false, limits are unlimited regardless of tier
    pub fn from_subscription(subscription: Option<&Subscription>, billing_enabled: bool) -> Self {
        let (stored_tier, status) = subscription
            .map(|s| (s.tier, s.status))
            .unwrap_or((SubscriptionTier::Free, SubscriptionStatus::None));

        let tier = effective_tier(stored_tier, status);
        let limits = if billing_enabled {
            Limits::for_tier(tier)
        } else {
            Limits::unlimited()
        };

        Entitlement {
            tier,
            status,
            limits,
        }
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.limits.features.iter().any(|f| f == feature)
    }
}

/// Tier whose limits apply given the stored tier and status
pub fn effective_tier(tier: SubscriptionTier, status: SubscriptionStatus) -> SubscriptionTier {
    match tier {
        SubscriptionTier::Pro if !status.grants_paid_tier() => SubscriptionTier::Free,
        other => other,
    }
}

/// Current consumption of quota-governed resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Usage {
    /// Projects created by the user, personal and group
    pub projects: i64,

    /// Active groups the user owns
    pub groups_owned: i64,
}

/// Reads subscriptions and produces entitlements
#[derive(Debug, Clone, Copy)]
pub struct EntitlementResolver {
    billing_enabled: bool,
}

impl EntitlementResolver {
    /// Creates a resolver; `billing_enabled` is the process-wide feature toggle
    pub fn new(billing_enabled: bool) -> Self {
        Self { billing_enabled }
    }

    pub fn billing_enabled(&self) -> bool {
        self.billing_enabled
    }

    /// Resolves the entitlement of `user_id`
    ///
    /// # Errors
    ///
    /// Returns an error only if the database query fails; a missing
    /// subscription resolves to the free tier.
    pub async fn resolve(
        &self,
        db: impl PgExecutor<'_>,
        user_id: Uuid,
    ) -> Result<Entitlement, sqlx::Error> {
        let subscription = Subscription::find_by_user(db, user_id).await?;

        if subscription.is_none() {
            debug!(%user_id, "No subscription row, resolving free tier");
        }

        Ok(Entitlement::from_subscription(
            subscription.as_ref(),
            self.billing_enabled,
        ))
    }

    /// Current quota consumption of `user_id`
    pub async fn usage(&self, db: impl PgExecutor<'_>, user_id: Uuid) -> Result<Usage, sqlx::Error> {
        sqlx::query_as::<_, Usage>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM projects WHERE owner_user_id = $1) AS projects,
                (SELECT COUNT(*) FROM groups
                 WHERE owner_user_id = $1 AND is_active) AS groups_owned
            "#,
        )
        .bind(user_id)
        .fetch_one(db)
        .await
    }
}
