/// Decision log
///
/// Every denied decision (authorization, quota, invitation state) is written to
/// `decision_log` with the actor, the resource, the reason code and a JSON
/// detail payload. Denials are observed after the operation's transaction has
/// rolled back, so the row always persists.
///
/// # Example
///
/// ```no_run
/// use statusguard_shared::audit::{AuditTarget, DecisionLog};
/// use statusguard_shared::auth::identity::Identity;
/// use statusguard_shared::error::{Denial, Result};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool, actor: Identity) -> Result<()> {
/// let log = DecisionLog::new(pool);
/// let result: Result<()> = Err(Denial::Forbidden.into());
///
/// // Records the denial, then hands the original result back
/// let result = log.observe(&actor, "delete_group", AuditTarget::new("group", None), result).await;
/// assert!(result.is_err());
/// # Ok(())
/// # }
/// ```

use serde_json::json;
use sqlx::PgPool;
use tracing::{error, warn};
use uuid::Uuid;

use crate::auth::authorization::ResourceRef;
use crate::auth::identity::Identity;
use crate::error::{Denial, Result};
use crate::models::decision::{DecisionRecord, NewDecisionRecord};
use crate::models::Page;

/// Resource id recorded when the denial hides the resource's existence
pub const UNKNOWN_RESOURCE: &str = "unknown";

/// Resource id recorded for resources that were about to be created
pub const NEW_RESOURCE: &str = "new";

/// What an audited operation acted on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditTarget {
    pub resource_type: &'static str,
    pub resource_id: Option<Uuid>,
}

impl AuditTarget {
    pub fn new(resource_type: &'static str, resource_id: Option<Uuid>) -> Self {
        Self {
            resource_type,
            resource_id,
        }
    }
}

impl From<&ResourceRef> for AuditTarget {
    fn from(resource: &ResourceRef) -> Self {
        Self::new(resource.resource_type(), resource.resource_id())
    }
}

/// Builds the row for a denied decision
pub fn denial_entry(
    actor: &Identity,
    action: &str,
    target: &AuditTarget,
    denial: &Denial,
) -> NewDecisionRecord {
    let resource_id = if denial.hides_resource() {
        UNKNOWN_RESOURCE.to_string()
    } else {
        target
            .resource_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| NEW_RESOURCE.to_string())
    };

    let detail = match denial {
        Denial::QuotaExceeded { resource, limit } => json!({
            "message": denial.to_string(),
            "resource": resource.as_str(),
            "limit": limit,
        }),
        _ => json!({ "message": denial.to_string() }),
    };

    NewDecisionRecord {
        actor_id: Some(actor.user_id),
        action: action.to_string(),
        resource_type: target.resource_type.to_string(),
        resource_id,
        reason: denial.code().to_string(),
        detail,
    }
}

/// Append-only store of denied decisions
#[derive(Debug, Clone)]
pub struct DecisionLog {
    db: PgPool,
}

impl DecisionLog {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn record(&self, entry: &NewDecisionRecord) -> std::result::Result<DecisionRecord, sqlx::Error> {
        DecisionRecord::insert(&self.db, entry).await
    }

    /// Newest entries first
    pub async fn list(&self, page: Page) -> std::result::Result<Vec<DecisionRecord>, sqlx::Error> {
        DecisionRecord::list(&self.db, page).await
    }

    /// Records `result` if it is a denial, then returns it unchanged
    ///
    /// A failure to write the row is logged and never replaces the denial.
    pub async fn observe<T>(
        &self,
        actor: &Identity,
        action: &str,
        target: AuditTarget,
        result: Result<T>,
    ) -> Result<T> {
        let denial = match &result {
            Err(err) => err.denial().copied(),
            Ok(_) => None,
        };
        let Some(denial) = denial else {
            return result;
        };

        let entry = denial_entry(actor, action, &target, &denial);

        warn!(
            actor_id = %actor.user_id,
            action,
            resource_type = %entry.resource_type,
            resource_id = %entry.resource_id,
            reason = %entry.reason,
            "Decision denied"
        );

        if let Err(e) = self.record(&entry).await {
            error!(
                error = %e,
                action,
                reason = %entry.reason,
                "Failed to write decision log entry"
            );
        }

        result
    }
}
