/// Invitation state machine
///
/// ```text
///            accept           +----------+
///        +------------------> | accepted |
///        |                    +----------+
///  +---------+   decline      +----------+
///  | pending | -------------> | declined |
///  +---------+                +----------+
///        |   now > expires_at +----------+
///        +------------------> | expired  |
///                             +----------+
/// ```
///
/// Every transition out of `pending` is a conditional update guarded on
/// `status = 'pending'`, so a response, a lazy expiry and the background
/// sweeper can never overwrite one another. Responding also locks the group
/// row, which serializes acceptance against role changes and removals.
///
/// Expiry is evaluated lazily: reads show `expired` once the TTL has passed,
/// and a response to such an invitation first writes the expiry and then
/// fails with `InvitationExpired`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::audit::AuditTarget;
use crate::auth::authorization::{Operation, ResourceRef};
use crate::auth::identity::Identity;
use crate::db::retry::with_retry;
use crate::engine::Engine;
use crate::error::{Denial, Error, Result};
use crate::groups::lock_active_group;
use crate::models::invitation::{
    CreateInvitation, InboxEntry, Invitation, InvitationStatus, ONE_PENDING_CONSTRAINT,
};
use crate::models::membership::{GroupMembership, GroupRole, MEMBERSHIP_PKEY};
use crate::models::normalize_email;

const PENDING_EXISTS: &str = "A pending invitation already exists for this address";

/// Input for a new invitation
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewInvitation {
    pub group_id: Uuid,

    #[validate(email(message = "invalid e-mail address"))]
    pub email: String,

    pub role: GroupRole,

    #[validate(length(max = 500, message = "message must be at most 500 characters"))]
    pub message: Option<String>,
}

impl NewInvitation {
    fn normalized(&self) -> Self {
        Self {
            group_id: self.group_id,
            email: normalize_email(&self.email),
            role: self.role,
            message: self.message.as_deref().map(|m| m.trim().to_string()),
        }
    }
}

/// Invitee's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationResponse {
    Accepted,
    Declined,
}

/// Transition a response leads to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePlan {
    /// Pending past its TTL: write the expiry, then reject
    Expire,
    Accept,
    Decline,
}

/// Checks the inviter's role against the role being granted
pub fn check_inviter(
    inviter_role: Option<GroupRole>,
    granted: GroupRole,
) -> std::result::Result<(), Denial> {
    let inviter_role = inviter_role.ok_or(Denial::NotFound)?;

    if !inviter_role.can_manage_members() || !inviter_role.has_permission(granted) {
        return Err(Denial::Forbidden);
    }

    Ok(())
}

/// Decides what a response to `invitation` does at `now`
///
/// # Arguments
///
/// * `responder_email` - Normalized e-mail of the responding user
/// * `already_member` - Whether the responder already belongs to the group
pub fn evaluate_response(
    invitation: &Invitation,
    responder_email: &str,
    already_member: bool,
    response: InvitationResponse,
    now: DateTime<Utc>,
) -> std::result::Result<ResponsePlan, Denial> {
    if invitation.invited_email != responder_email {
        return Err(Denial::NotFound);
    }

    match invitation.status {
        InvitationStatus::Accepted | InvitationStatus::Declined => {
            return Err(Denial::AlreadyResponded)
        }
        InvitationStatus::Expired => return Err(Denial::InvitationExpired),
        InvitationStatus::Pending => {}
    }

    if invitation.effective_status(now) == InvitationStatus::Expired {
        return Ok(ResponsePlan::Expire);
    }

    match response {
        InvitationResponse::Accepted if already_member => Err(Denial::InvalidTransition),
        InvitationResponse::Accepted => Ok(ResponsePlan::Accept),
        InvitationResponse::Declined => Ok(ResponsePlan::Decline),
    }
}

/// Invitation lifecycle operations
#[derive(Clone, Copy)]
pub struct InvitationStateMachine<'a> {
    engine: &'a Engine,
}

impl<'a> InvitationStateMachine<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Invites an e-mail address into a group
    ///
    /// # Errors
    ///
    /// - `Invalid` for a malformed address or an owner invitation
    /// - `NotFound` if the group is missing, inactive, or the actor isn't a member
    /// - `Forbidden` if the actor is below admin or grants a role above their own
    /// - `Conflict` if the address is already a member or already has a live invitation
    pub async fn create(&self, actor: &Identity, input: NewInvitation) -> Result<Invitation> {
        self.create_at(actor, input, Utc::now()).await
    }

    /// [`Self::create`] with an explicit clock
    pub async fn create_at(
        &self,
        actor: &Identity,
        input: NewInvitation,
        now: DateTime<Utc>,
    ) -> Result<Invitation> {
        let input = input.normalized();
        let group_id = input.group_id;

        let result = match validate_invitation(&input) {
            Ok(()) => {
                with_retry(self.engine.retry_policy(), "create_invitation", || {
                    self.try_create(actor, &input, now)
                })
                .await
            }
            Err(err) => Err(err),
        };

        self.engine
            .decisions()
            .observe(
                actor,
                "create_invitation",
                AuditTarget::new("group", Some(group_id)),
                result,
            )
            .await
    }

    async fn try_create(
        &self,
        actor: &Identity,
        input: &NewInvitation,
        now: DateTime<Utc>,
    ) -> Result<Invitation> {
        actor.require_active()?;

        let mut tx = self.engine.db().begin().await?;
        lock_active_group(&mut tx, input.group_id).await?;

        let inviter_role =
            GroupMembership::role_of(&mut *tx, input.group_id, actor.user_id).await?;
        check_inviter(inviter_role, input.role)?;

        if GroupMembership::role_of_email(&mut *tx, input.group_id, &input.email)
            .await?
            .is_some()
        {
            return Err(Error::Conflict(
                "This address already belongs to a member of the group".to_string(),
            ));
        }

        if let Some(pending) = Invitation::find_pending(&mut *tx, input.group_id, &input.email).await? {
            if pending.effective_status(now) != InvitationStatus::Expired {
                return Err(Error::Conflict(PENDING_EXISTS.to_string()));
            }
            Invitation::transition_from_pending(&mut *tx, pending.id, InvitationStatus::Expired, None)
                .await?;
        }

        let invitation = Invitation::insert(
            &mut *tx,
            CreateInvitation {
                group_id: input.group_id,
                invited_email: input.email.clone(),
                invited_by_user_id: actor.user_id,
                role: input.role,
                message: input.message.clone(),
                created_at: now,
            },
        )
        .await
        .map_err(|e| Error::conflict_on(e, ONE_PENDING_CONSTRAINT, PENDING_EXISTS))?;

        tx.commit().await?;

        info!(
            invitation_id = %invitation.id,
            group_id = %invitation.group_id,
            inviter_id = %actor.user_id,
            role = invitation.role.as_str(),
            expires_at = %invitation.expires_at,
            "Invitation created"
        );
        Ok(invitation)
    }

    /// Accepts or declines an invitation addressed to the actor
    ///
    /// Accepting creates the membership and marks the invitation accepted in
    /// one transaction. A second response fails with `AlreadyResponded`.
    pub async fn respond(
        &self,
        actor: &Identity,
        invitation_id: Uuid,
        response: InvitationResponse,
    ) -> Result<Invitation> {
        self.respond_at(actor, invitation_id, response, Utc::now())
            .await
    }

    /// [`Self::respond`] with an explicit clock
    pub async fn respond_at(
        &self,
        actor: &Identity,
        invitation_id: Uuid,
        response: InvitationResponse,
        now: DateTime<Utc>,
    ) -> Result<Invitation> {
        let result = with_retry(self.engine.retry_policy(), "respond_invitation", || {
            self.try_respond(actor, invitation_id, response, now)
        })
        .await;

        self.engine
            .decisions()
            .observe(
                actor,
                "respond_invitation",
                AuditTarget::new("invitation", Some(invitation_id)),
                result,
            )
            .await
    }

    async fn try_respond(
        &self,
        actor: &Identity,
        invitation_id: Uuid,
        response: InvitationResponse,
        now: DateTime<Utc>,
    ) -> Result<Invitation> {
        actor.require_active()?;

        let mut tx = self.engine.db().begin().await?;

        let group_id = match Invitation::find_by_id(&mut *tx, invitation_id).await? {
            Some(invitation) if invitation.invited_email == actor.email => invitation.group_id,
            _ => return Err(Denial::NotFound.into()),
        };

        // Group before invitation, matching the lock order of role changes
        lock_active_group(&mut tx, group_id).await?;
        let invitation = Invitation::lock(&mut tx, invitation_id)
            .await?
            .ok_or(Denial::NotFound)?;

        let already_member = GroupMembership::role_of(&mut *tx, group_id, actor.user_id)
            .await?
            .is_some();

        let (status, responded_at) =
            match evaluate_response(&invitation, &actor.email, already_member, response, now)? {
                ResponsePlan::Expire => {
                    Invitation::transition_from_pending(
                        &mut *tx,
                        invitation_id,
                        InvitationStatus::Expired,
                        None,
                    )
                    .await?;
                    tx.commit().await?;

                    info!(%invitation_id, "Invitation expired on response");
                    return Err(Denial::InvitationExpired.into());
                }
                ResponsePlan::Accept => {
                    GroupMembership::insert(&mut *tx, group_id, actor.user_id, invitation.role)
                        .await
                        .map_err(|e| {
                            Error::conflict_on(e, MEMBERSHIP_PKEY, "Already a member of this group")
                        })?;
                    (InvitationStatus::Accepted, now)
                }
                ResponsePlan::Decline => (InvitationStatus::Declined, now),
            };

        let invitation =
            Invitation::transition_from_pending(&mut *tx, invitation_id, status, Some(responded_at))
                .await?
                .ok_or(Denial::AlreadyResponded)?;

        tx.commit().await?;

        info!(
            %invitation_id,
            %group_id,
            user_id = %actor.user_id,
            status = invitation.status.as_str(),
            "Invitation answered"
        );
        Ok(invitation)
    }

    /// Pending invitations addressed to the actor
    ///
    /// Invitations past their TTL are shown as expired even before the
    /// transition is written.
    pub async fn inbox(&self, actor: &Identity) -> Result<Vec<InboxEntry>> {
        self.inbox_at(actor, Utc::now()).await
    }

    /// [`Self::inbox`] with an explicit clock
    pub async fn inbox_at(&self, actor: &Identity, now: DateTime<Utc>) -> Result<Vec<InboxEntry>> {
        actor.require_active()?;

        let entries = Invitation::inbox(self.engine.db(), &actor.email).await?;
        Ok(entries
            .into_iter()
            .map(|entry| InboxEntry {
                invitation: entry.invitation.as_of(now),
                group_name: entry.group_name,
            })
            .collect())
    }

    /// All invitations of a group; requires admin
    pub async fn list_for_group(&self, actor: &Identity, group_id: Uuid) -> Result<Vec<Invitation>> {
        let resource = ResourceRef::Group(group_id);
        let result = self.try_list_for_group(actor, group_id, &resource).await;

        self.engine
            .decisions()
            .observe(
                actor,
                "list_group_invitations",
                AuditTarget::from(&resource),
                result,
            )
            .await
    }

    async fn try_list_for_group(
        &self,
        actor: &Identity,
        group_id: Uuid,
        resource: &ResourceRef,
    ) -> Result<Vec<Invitation>> {
        let mut conn = self.engine.db().acquire().await?;
        self.engine
            .guard()
            .authorize(&mut conn, actor, Operation::Read, resource)
            .await?;

        let role = GroupMembership::role_of(&mut *conn, group_id, actor.user_id).await?;
        if !role.is_some_and(|r| r.can_manage_members()) {
            return Err(Denial::Forbidden.into());
        }

        let now = Utc::now();
        let invitations = Invitation::list_by_group(&mut *conn, group_id).await?;
        Ok(invitations.into_iter().map(|i| i.as_of(now)).collect())
    }

    /// Writes the expiry of up to `batch_size` stale pending invitations
    ///
    /// Uses the same conditional transition as responses, so it never
    /// overwrites an accepted or declined invitation.
    pub async fn expire_stale(&self, now: DateTime<Utc>, batch_size: i64) -> Result<u64> {
        Ok(Invitation::expire_stale(self.engine.db(), now, batch_size).await?)
    }
}

fn validate_invitation(input: &NewInvitation) -> Result<()> {
    input.validate()?;

    if input.role == GroupRole::Owner {
        return Err(Error::Invalid(
            "Invitations may grant the admin or member role only".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::models::invitation::invitation_ttl;

    fn pending_invitation(created_at: DateTime<Utc>) -> Invitation {
        Invitation {
            id: Uuid::new_v4(),
            group_id: Uuid::new_v4(),
            invited_email: "bob@example.com".to_string(),
            invited_by_user_id: Uuid::new_v4(),
            role: GroupRole::Member,
            status: InvitationStatus::Pending,
            message: None,
            created_at,
            expires_at: created_at + invitation_ttl(),
            responded_at: None,
        }
    }

    #[test]
    fn test_accept_pending() {
        let t0 = Utc::now();
        let invitation = pending_invitation(t0);

        assert_eq!(
            evaluate_response(
                &invitation,
                "bob@example.com",
                false,
                InvitationResponse::Accepted,
                t0 + Duration::days(1)
            ),
            Ok(ResponsePlan::Accept)
        );
        assert_eq!(
            evaluate_response(
                &invitation,
                "bob@example.com",
                false,
                InvitationResponse::Declined,
                t0
            ),
            Ok(ResponsePlan::Decline)
        );
    }

    #[test]
    fn test_second_response_is_already_responded() {
        let t0 = Utc::now();
        let mut invitation = pending_invitation(t0);
        invitation.status = InvitationStatus::Accepted;
        invitation.responded_at = Some(t0);

        for response in [InvitationResponse::Accepted, InvitationResponse::Declined] {
            assert_eq!(
                evaluate_response(&invitation, "bob@example.com", true, response, t0),
                Err(Denial::AlreadyResponded)
            );
        }
    }

    #[test]
    fn test_response_after_ttl_expires() {
        let t0 = Utc::now();
        let invitation = pending_invitation(t0);

        assert_eq!(
            evaluate_response(
                &invitation,
                "bob@example.com",
                false,
                InvitationResponse::Accepted,
                t0 + Duration::days(8)
            ),
            Ok(ResponsePlan::Expire)
        );
    }

    #[test]
    fn test_response_at_exact_expiry_still_pending() {
        let t0 = Utc::now();
        let invitation = pending_invitation(t0);

        assert_eq!(
            evaluate_response(
                &invitation,
                "bob@example.com",
                false,
                InvitationResponse::Accepted,
                invitation.expires_at
            ),
            Ok(ResponsePlan::Accept)
        );
    }

    #[test]
    fn test_written_expiry_rejects() {
        let t0 = Utc::now();
        let mut invitation = pending_invitation(t0);
        invitation.status = InvitationStatus::Expired;

        assert_eq!(
            evaluate_response(&invitation, "bob@example.com", false, InvitationResponse::Declined, t0),
            Err(Denial::InvitationExpired)
        );
    }

    #[test]
    fn test_other_address_sees_not_found() {
        let t0 = Utc::now();
        let invitation = pending_invitation(t0);

        assert_eq!(
            evaluate_response(&invitation, "mallory@example.com", false, InvitationResponse::Accepted, t0),
            Err(Denial::NotFound)
        );
    }

    #[test]
    fn test_existing_member_cannot_accept() {
        let t0 = Utc::now();
        let invitation = pending_invitation(t0);

        assert_eq!(
            evaluate_response(&invitation, "bob@example.com", true, InvitationResponse::Accepted, t0),
            Err(Denial::InvalidTransition)
        );
        assert_eq!(
            evaluate_response(&invitation, "bob@example.com", true, InvitationResponse::Declined, t0),
            Ok(ResponsePlan::Decline)
        );
    }

    #[test]
    fn test_inviter_rules() {
        assert_eq!(check_inviter(Some(GroupRole::Owner), GroupRole::Admin), Ok(()));
        assert_eq!(check_inviter(Some(GroupRole::Admin), GroupRole::Admin), Ok(()));
        assert_eq!(check_inviter(Some(GroupRole::Admin), GroupRole::Member), Ok(()));
        assert_eq!(
            check_inviter(Some(GroupRole::Admin), GroupRole::Owner),
            Err(Denial::Forbidden)
        );
        assert_eq!(
            check_inviter(Some(GroupRole::Member), GroupRole::Member),
            Err(Denial::Forbidden)
        );
        assert_eq!(check_inviter(None, GroupRole::Member), Err(Denial::NotFound));
    }

    #[test]
    fn test_invitation_input_validation() {
        let input = NewInvitation {
            group_id: Uuid::new_v4(),
            email: "  Bob@Example.COM ".to_string(),
            role: GroupRole::Member,
            message: None,
        }
        .normalized();
        assert_eq!(input.email, "bob@example.com");
        assert!(validate_invitation(&input).is_ok());

        let bad_email = NewInvitation {
            email: "not-an-address".to_string(),
            ..input.clone()
        };
        assert!(matches!(validate_invitation(&bad_email), Err(Error::Invalid(_))));

        let owner = NewInvitation {
            role: GroupRole::Owner,
            ..input
        };
        assert!(matches!(validate_invitation(&owner), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_response_wire_format() {
        let response: InvitationResponse = serde_json::from_str("\"accepted\"").unwrap();
        assert_eq!(response, InvitationResponse::Accepted);
    }
}
