/// Subscription model
///
/// One row per user, created together with the user on the free tier. Tier and
/// status are written by the external billing webhook handler; the engine only
/// reads them through the entitlement resolver.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE subscription_tier AS ENUM ('free', 'pro');
/// CREATE TYPE subscription_status AS ENUM
///     ('none', 'active', 'on_trial', 'canceled', 'past_due', 'expired');
///
/// CREATE TABLE subscriptions (
///     user_id UUID PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
///     tier subscription_tier NOT NULL DEFAULT 'free',
///     status subscription_status NOT NULL DEFAULT 'none',
///     external_subscription_id VARCHAR(255),
///     trial_ends_at TIMESTAMPTZ,
///     renews_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

use super::Page;

/// Subscription plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_tier", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Pro,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Pro => "pro",
        }
    }
}

/// Billing provider status of the subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Never subscribed
    None,
    Active,
    OnTrial,
    /// Canceled but paid through the current period
    Canceled,
    PastDue,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::OnTrial => "on_trial",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Expired => "expired",
        }
    }

    /// Whether paid entitlements still apply in this status
    pub fn grants_paid_tier(&self) -> bool {
        !matches!(self, SubscriptionStatus::None | SubscriptionStatus::Expired)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub user_id: Uuid,
    pub tier: SubscriptionTier,
    pub status: SubscriptionStatus,

    /// Subscription ID at the billing provider
    pub external_subscription_id: Option<String>,

    pub trial_ends_at: Option<DateTime<Utc>>,
    pub renews_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SUBSCRIPTION_COLUMNS: &str = "user_id, tier, status, external_subscription_id, \
     trial_ends_at, renews_at, created_at, updated_at";

impl Subscription {
    /// Reads the latest committed subscription for a user
    pub async fn find_by_user(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(db)
        .await
    }

    /// Lists subscriptions, most recently updated first
    pub async fn list(db: impl PgExecutor<'_>, page: Page) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions \
             ORDER BY updated_at DESC, user_id ASC LIMIT $1 OFFSET $2"
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
    fn test_paid_statuses() {
        assert!(SubscriptionStatus::Active.grants_paid_tier());
        assert!(SubscriptionStatus::OnTrial.grants_paid_tier());
        assert!(SubscriptionStatus::Canceled.grants_paid_tier());
        assert!(SubscriptionStatus::PastDue.grants_paid_tier());
        assert!(!SubscriptionStatus::Expired.grants_paid_tier());
        assert!(!SubscriptionStatus::None.grants_paid_tier());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SubscriptionStatus::OnTrial).unwrap();
        assert_eq!(json, "\"on_trial\"");
        assert_eq!(SubscriptionStatus::PastDue.as_str(), "past_due");
    }
}
