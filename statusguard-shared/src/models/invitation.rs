/// Invitation model and database operations
///
/// Status transitions out of `pending` are always conditional updates
/// (`WHERE status = 'pending'`), so a live response and a background sweep can
/// never both win.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE invitation_status AS ENUM ('pending', 'accepted', 'declined', 'expired');
///
/// CREATE TABLE invitations (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     group_id UUID NOT NULL REFERENCES groups(id),
///     invited_email TEXT NOT NULL,              -- stored lower-cased
///     invited_by_user_id UUID NOT NULL REFERENCES users(id),
///     role group_role NOT NULL DEFAULT 'member', -- never 'owner'
///     status invitation_status NOT NULL DEFAULT 'pending',
///     message TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     expires_at TIMESTAMPTZ NOT NULL,
///     responded_at TIMESTAMPTZ
/// );
///
/// CREATE UNIQUE INDEX invitations_one_pending
///     ON invitations(group_id, invited_email) WHERE status = 'pending';
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use super::membership::GroupRole;
use super::Page;

/// Unique index backing "one pending invitation per address per group"
pub const ONE_PENDING_CONSTRAINT: &str = "invitations_one_pending";

/// How long an invitation stays answerable
pub fn invitation_ttl() -> Duration {
    Duration::days(7)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invitation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Declined => "declined",
            InvitationStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvitationStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invitation {
    pub id: Uuid,
    pub group_id: Uuid,
    pub invited_email: String,
    pub invited_by_user_id: Uuid,
    pub role: GroupRole,
    pub status: InvitationStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

/// Inbox entry: an invitation plus the name of the inviting group
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InboxEntry {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub invitation: Invitation,

    pub group_name: String,
}

/// Input for a new invitation row
#[derive(Debug, Clone)]
pub struct CreateInvitation {
    pub group_id: Uuid,
    pub invited_email: String,
    pub invited_by_user_id: Uuid,
    pub role: GroupRole,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

const INVITATION_COLUMNS: &str = "id, group_id, invited_email, invited_by_user_id, role, \
     status, message, created_at, expires_at, responded_at";

impl Invitation {
    /// Status as observed at `now`
    ///
    /// A pending invitation past its expiry reads as expired even before the
    /// transition is written.
    pub fn effective_status(&self, now: DateTime<Utc>) -> InvitationStatus {
        if self.status == InvitationStatus::Pending && now > self.expires_at {
            InvitationStatus::Expired
        } else {
            self.status
        }
    }

    /// Copy of the invitation with the lazily evaluated status applied
    pub fn as_of(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.effective_status(now);
        self
    }

    pub async fn find_by_id(db: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Invitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Locks the invitation row for the rest of the transaction
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Invitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Finds the pending invitation for an address in a group, if any
    pub async fn find_pending(
        db: impl PgExecutor<'_>,
        group_id: Uuid,
        invited_email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Invitation>(&format!(
            r#"
            SELECT {INVITATION_COLUMNS} FROM invitations
            WHERE group_id = $1 AND invited_email = $2 AND status = 'pending'
            "#
        ))
        .bind(group_id)
        .bind(invited_email)
        .fetch_optional(db)
        .await
    }

    /// Inserts a pending invitation expiring one TTL after `created_at`
    pub async fn insert(db: impl PgExecutor<'_>, data: CreateInvitation) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Invitation>(&format!(
            r#"
            INSERT INTO invitations
                (group_id, invited_email, invited_by_user_id, role, message, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {INVITATION_COLUMNS}
            "#
        ))
        .bind(data.group_id)
        .bind(&data.invited_email)
        .bind(data.invited_by_user_id)
        .bind(data.role)
        .bind(&data.message)
        .bind(data.created_at)
        .bind(data.created_at + invitation_ttl())
        .fetch_one(db)
        .await
    }

    /// Moves a pending invitation to `status`
    ///
    /// # Returns
    ///
    /// The updated invitation, or None if it was no longer pending
    pub async fn transition_from_pending(
        db: impl PgExecutor<'_>,
        id: Uuid,
        status: InvitationStatus,
        responded_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Invitation>(&format!(
            r#"
            UPDATE invitations
            SET status = $2, responded_at = $3
            WHERE id = $1 AND status = 'pending'
            RETURNING {INVITATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .bind(responded_at)
        .fetch_optional(db)
        .await
    }

    /// Expires up to `batch_size` pending invitations past their expiry
    ///
    /// Rows locked by an in-flight response are skipped and picked up by a
    /// later sweep.
    ///
    /// # Returns
    ///
    /// Number of invitations expired
    pub async fn expire_stale(
        db: impl PgExecutor<'_>,
        now: DateTime<Utc>,
        batch_size: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE invitations
            SET status = 'expired'
            WHERE status = 'pending'
              AND id IN (
                  SELECT id FROM invitations
                  WHERE status = 'pending' AND expires_at < $1
                  ORDER BY expires_at ASC
                  LIMIT $2
                  FOR UPDATE SKIP LOCKED
              )
            "#,
        )
        .bind(now)
        .bind(batch_size)
        .execute(db)
        .await?;

        Ok(result.rows_affected())
    }

    /// Pending invitations addressed to `email` in active groups, newest first
    pub async fn inbox(db: impl PgExecutor<'_>, email: &str) -> Result<Vec<InboxEntry>, sqlx::Error> {
        sqlx::query_as::<_, InboxEntry>(
            r#"
            SELECT i.id, i.group_id, i.invited_email, i.invited_by_user_id, i.role,
                   i.status, i.message, i.created_at, i.expires_at, i.responded_at,
                   g.name AS group_name
            FROM invitations i
            JOIN groups g ON g.id = i.group_id
            WHERE i.invited_email = $1 AND i.status = 'pending' AND g.is_active
            ORDER BY i.created_at DESC
            "#,
        )
        .bind(email)
        .fetch_all(db)
        .await
    }

    /// All invitations of a group, newest first
    pub async fn list_by_group(
        db: impl PgExecutor<'_>,
        group_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Invitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE group_id = $1 ORDER BY created_at DESC"
        ))
        .bind(group_id)
        .fetch_all(db)
        .await
    }

    /// All invitations on the platform, newest first
    pub async fn list(db: impl PgExecutor<'_>, page: Page) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Invitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations \
             ORDER BY created_at DESC, id ASC LIMIT $1 OFFSET $2"
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

    fn invitation(status: InvitationStatus, created_at: DateTime<Utc>) -> Invitation {
        Invitation {
            id: Uuid::new_v4(),
            group_id: Uuid::new_v4(),
            invited_email: "bob@example.com".to_string(),
            invited_by_user_id: Uuid::new_v4(),
            role: GroupRole::Member,
            status,
            message: None,
            created_at,
            expires_at: created_at + invitation_ttl(),
            responded_at: None,
        }
    }

    #[test]
    fn test_pending_reads_expired_after_ttl() {
        let t0 = Utc::now();
        let inv = invitation(InvitationStatus::Pending, t0);

        assert_eq!(inv.effective_status(t0 + Duration::days(6)), InvitationStatus::Pending);
        assert_eq!(inv.effective_status(t0 + Duration::days(7)), InvitationStatus::Pending);
        assert_eq!(inv.effective_status(t0 + Duration::days(8)), InvitationStatus::Expired);
    }

    #[test]
    fn test_terminal_status_is_not_rewritten() {
        let t0 = Utc::now();
        let inv = invitation(InvitationStatus::Accepted, t0);
        assert_eq!(inv.effective_status(t0 + Duration::days(30)), InvitationStatus::Accepted);
    }

    #[test]
    fn test_as_of_applies_lazy_status() {
        let t0 = Utc::now();
        let inv = invitation(InvitationStatus::Pending, t0).as_of(t0 + Duration::days(8));
        assert_eq!(inv.status, InvitationStatus::Expired);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!InvitationStatus::Pending.is_terminal());
        assert!(InvitationStatus::Accepted.is_terminal());
        assert!(InvitationStatus::Declined.is_terminal());
        assert!(InvitationStatus::Expired.is_terminal());
    }
}
