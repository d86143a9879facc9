/// Membership store
///
/// Owns groups and their memberships. Every mutation of a group's membership
/// set locks the `groups` row first (`SELECT ... FOR UPDATE`), so role
/// changes, removals and invitation acceptances on one group are serialized.
///
/// # Role Rules
///
/// - Only owners and admins manage members.
/// - Promoting someone to owner is an ownership transfer: only the owner may do
///   it, and the previous owner becomes admin in the same transaction.
/// - Nobody else may demote or remove the owner; the owner can't demote or
///   remove themselves without transferring first (`LastOwnerProtected`).
/// - Any non-owner may leave a group.

use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::audit::AuditTarget;
use crate::auth::authorization::{Operation, ResourceRef};
use crate::auth::identity::Identity;
use crate::db::retry::with_retry;
use crate::engine::Engine;
use crate::error::{Denial, Error, Result};
use crate::models::group::{Group, GroupSummary, OWNER_NAME_CONSTRAINT};
use crate::models::membership::{GroupMembership, GroupRole, MemberInfo};

const DUPLICATE_NAME: &str = "You already own an active group with this name";

/// Input for a new group
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewGroup {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(max = 500, message = "description must be at most 500 characters"))]
    pub description: Option<String>,
}

/// Partial group update; `None` keeps the current value
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct GroupChanges {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 500, message = "description must be at most 500 characters"))]
    pub description: Option<String>,
}

impl NewGroup {
    fn normalized(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            description: self.description.as_deref().map(|d| d.trim().to_string()),
        }
    }
}

impl GroupChanges {
    fn normalized(&self) -> Self {
        Self {
            name: self.name.as_deref().map(|n| n.trim().to_string()),
            description: self.description.as_deref().map(|d| d.trim().to_string()),
        }
    }
}

/// A group with its member list
#[derive(Debug, Clone, Serialize)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub group: Group,

    /// Caller's role
    pub role: GroupRole,

    pub members: Vec<MemberInfo>,
}

/// What a permitted role change writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolePlan {
    /// Update the target's role only
    Change,

    /// Promote the target to owner and demote `previous_owner` to admin
    Transfer { previous_owner: Uuid },
}

/// Decides whether `actor` may give `target` the role `new_role`
///
/// Roles are `None` when the user has no membership in the group.
pub fn plan_role_change(
    actor_id: Uuid,
    actor_role: Option<GroupRole>,
    target_id: Uuid,
    target_role: Option<GroupRole>,
    new_role: GroupRole,
) -> std::result::Result<RolePlan, Denial> {
    let actor_role = actor_role.ok_or(Denial::NotFound)?;
    if !actor_role.can_manage_members() {
        return Err(Denial::Forbidden);
    }

    let target_role = target_role.ok_or(Denial::NotFound)?;
    if target_role == new_role {
        return Err(Denial::InvalidTransition);
    }

    if new_role == GroupRole::Owner {
        return match actor_role {
            GroupRole::Owner => Ok(RolePlan::Transfer {
                previous_owner: actor_id,
            }),
            _ => Err(Denial::Forbidden),
        };
    }

    if target_role == GroupRole::Owner {
        return if target_id == actor_id {
            Err(Denial::LastOwnerProtected)
        } else {
            Err(Denial::Forbidden)
        };
    }

    Ok(RolePlan::Change)
}

/// Decides whether `actor` may remove `target` from the group
pub fn plan_removal(
    actor_id: Uuid,
    actor_role: Option<GroupRole>,
    target_id: Uuid,
    target_role: Option<GroupRole>,
) -> std::result::Result<(), Denial> {
    let actor_role = actor_role.ok_or(Denial::NotFound)?;
    let target_role = target_role.ok_or(Denial::NotFound)?;

    if actor_id == target_id {
        return match target_role {
            GroupRole::Owner => Err(Denial::LastOwnerProtected),
            _ => Ok(()),
        };
    }

    if !actor_role.can_manage_members() || target_role == GroupRole::Owner {
        return Err(Denial::Forbidden);
    }

    Ok(())
}

/// Locks an active group, `NotFound` otherwise
pub(crate) async fn lock_active_group(conn: &mut PgConnection, group_id: Uuid) -> Result<Group> {
    match Group::lock(conn, group_id).await? {
        Some(group) if group.is_active => Ok(group),
        _ => Err(Denial::NotFound.into()),
    }
}

/// Group and membership operations
#[derive(Clone, Copy)]
pub struct MembershipStore<'a> {
    engine: &'a Engine,
}

impl<'a> MembershipStore<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Role of `user_id` in `group_id`, None when not a member
    pub async fn role_of(&self, group_id: Uuid, user_id: Uuid) -> Result<Option<GroupRole>> {
        Ok(GroupMembership::role_of(self.engine.db(), group_id, user_id).await?)
    }

    /// Creates a group and its owner membership in one transaction
    ///
    /// # Errors
    ///
    /// - `Invalid` if the name or description fails validation
    /// - `Conflict` if the actor already owns an active group with this name
    pub async fn create_group(&self, actor: &Identity, new_group: NewGroup) -> Result<Group> {
        let new_group = new_group.normalized();

        let result = match new_group.validate() {
            Ok(()) => {
                with_retry(self.engine.retry_policy(), "create_group", || {
                    self.try_create_group(actor, &new_group)
                })
                .await
            }
            Err(errors) => Err(errors.into()),
        };

        self.engine
            .decisions()
            .observe(actor, "create_group", AuditTarget::new("group", None), result)
            .await
    }

    async fn try_create_group(&self, actor: &Identity, new_group: &NewGroup) -> Result<Group> {
        actor.require_active()?;

        let mut tx = self.engine.db().begin().await?;

        if Group::active_name_taken(&mut *tx, actor.user_id, &new_group.name, None).await? {
            return Err(Error::Conflict(DUPLICATE_NAME.to_string()));
        }

        let group = Group::insert(
            &mut *tx,
            actor.user_id,
            &new_group.name,
            new_group.description.as_deref(),
        )
        .await
        .map_err(|e| Error::conflict_on(e, OWNER_NAME_CONSTRAINT, DUPLICATE_NAME))?;

        GroupMembership::insert(&mut *tx, group.id, actor.user_id, GroupRole::Owner).await?;

        tx.commit().await?;

        info!(group_id = %group.id, owner_id = %actor.user_id, "Group created");
        Ok(group)
    }

    /// Active groups the actor belongs to, with role and counts
    pub async fn list_groups(&self, actor: &Identity) -> Result<Vec<GroupSummary>> {
        actor.require_active()?;
        Ok(Group::list_for_member(self.engine.db(), actor.user_id).await?)
    }

    /// Group with its members; requires membership
    pub async fn group_detail(&self, actor: &Identity, group_id: Uuid) -> Result<GroupDetail> {
        let resource = ResourceRef::Group(group_id);

        let result = self.try_group_detail(actor, group_id, &resource).await;

        self.engine
            .decisions()
            .observe(actor, "get_group", AuditTarget::from(&resource), result)
            .await
    }

    async fn try_group_detail(
        &self,
        actor: &Identity,
        group_id: Uuid,
        resource: &ResourceRef,
    ) -> Result<GroupDetail> {
        let mut conn = self.engine.db().acquire().await?;
        self.engine
            .guard()
            .authorize(&mut conn, actor, Operation::Read, resource)
            .await?;

        let group = Group::find_by_id(&mut *conn, group_id)
            .await?
            .ok_or(Denial::NotFound)?;
        let role = GroupMembership::role_of(&mut *conn, group_id, actor.user_id)
            .await?
            .ok_or(Denial::NotFound)?;
        let members = GroupMembership::list_members(&mut *conn, group_id).await?;

        Ok(GroupDetail {
            group,
            role,
            members,
        })
    }

    /// Renames or re-describes a group; requires admin
    pub async fn update_group(
        &self,
        actor: &Identity,
        group_id: Uuid,
        changes: GroupChanges,
    ) -> Result<Group> {
        let changes = changes.normalized();

        let result = match changes.validate() {
            Ok(()) => {
                with_retry(self.engine.retry_policy(), "update_group", || {
                    self.try_update_group(actor, group_id, &changes)
                })
                .await
            }
            Err(errors) => Err(errors.into()),
        };

        self.engine
            .decisions()
            .observe(
                actor,
                "update_group",
                AuditTarget::new("group", Some(group_id)),
                result,
            )
            .await
    }

    async fn try_update_group(
        &self,
        actor: &Identity,
        group_id: Uuid,
        changes: &GroupChanges,
    ) -> Result<Group> {
        let mut tx = self.engine.db().begin().await?;

        self.engine
            .guard()
            .authorize(&mut tx, actor, Operation::Update, &ResourceRef::Group(group_id))
            .await?;
        let group = lock_active_group(&mut tx, group_id).await?;

        if let Some(name) = changes.name.as_deref() {
            if Group::active_name_taken(&mut *tx, group.owner_user_id, name, Some(group_id)).await?
            {
                return Err(Error::Conflict(DUPLICATE_NAME.to_string()));
            }
        }

        let group = Group::update_details(
            &mut *tx,
            group_id,
            changes.name.as_deref(),
            changes.description.as_deref(),
        )
        .await
        .map_err(|e| Error::conflict_on(e, OWNER_NAME_CONSTRAINT, DUPLICATE_NAME))?;

        tx.commit().await?;
        Ok(group)
    }

    /// Soft-deactivates a group; owner only
    ///
    /// Memberships are kept. The group and its projects become invisible to
    /// everyone except platform admins.
    pub async fn deactivate_group(&self, actor: &Identity, group_id: Uuid) -> Result<Group> {
        let result = with_retry(self.engine.retry_policy(), "deactivate_group", || {
            self.try_deactivate_group(actor, group_id)
        })
        .await;

        self.engine
            .decisions()
            .observe(
                actor,
                "deactivate_group",
                AuditTarget::new("group", Some(group_id)),
                result,
            )
            .await
    }

    async fn try_deactivate_group(&self, actor: &Identity, group_id: Uuid) -> Result<Group> {
        let mut tx = self.engine.db().begin().await?;

        self.engine
            .guard()
            .authorize(&mut tx, actor, Operation::Delete, &ResourceRef::Group(group_id))
            .await?;
        let group = lock_active_group(&mut tx, group_id).await?;

        if group.owner_user_id != actor.user_id {
            return Err(Denial::Forbidden.into());
        }

        let group = Group::set_active(&mut *tx, group_id, false)
            .await?
            .ok_or(Denial::NotFound)?;

        tx.commit().await?;

        info!(%group_id, owner_id = %actor.user_id, "Group deactivated");
        Ok(group)
    }

    /// Changes the role of `target_user_id`
    ///
    /// Setting `GroupRole::Owner` transfers ownership: the previous owner is
    /// demoted to admin in the same transaction. Returns the target's new
    /// membership.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the group is missing or inactive, or either user isn't a member
    /// - `Forbidden` if the actor may not make this change
    /// - `LastOwnerProtected` if the owner tries to demote themselves
    /// - `InvalidTransition` if the target already holds `new_role`
    pub async fn set_role(
        &self,
        actor: &Identity,
        group_id: Uuid,
        target_user_id: Uuid,
        new_role: GroupRole,
    ) -> Result<GroupMembership> {
        let result = with_retry(self.engine.retry_policy(), "set_role", || {
            self.try_set_role(actor, group_id, target_user_id, new_role)
        })
        .await;

        self.engine
            .decisions()
            .observe(
                actor,
                "set_role",
                AuditTarget::new("group", Some(group_id)),
                result,
            )
            .await
    }

    async fn try_set_role(
        &self,
        actor: &Identity,
        group_id: Uuid,
        target_user_id: Uuid,
        new_role: GroupRole,
    ) -> Result<GroupMembership> {
        actor.require_active()?;

        let mut tx = self.engine.db().begin().await?;
        lock_active_group(&mut tx, group_id).await?;

        let actor_role = GroupMembership::role_of(&mut *tx, group_id, actor.user_id).await?;
        let target_role = GroupMembership::role_of(&mut *tx, group_id, target_user_id).await?;

        let plan = plan_role_change(
            actor.user_id,
            actor_role,
            target_user_id,
            target_role,
            new_role,
        )?;

        if let RolePlan::Transfer { previous_owner } = plan {
            GroupMembership::update_role(&mut *tx, group_id, previous_owner, GroupRole::Admin)
                .await?
                .ok_or(Denial::NotFound)?;
            Group::set_owner(&mut *tx, group_id, target_user_id).await?;
        }

        let membership = GroupMembership::update_role(&mut *tx, group_id, target_user_id, new_role)
            .await?
            .ok_or(Denial::NotFound)?;

        tx.commit().await?;

        info!(
            %group_id,
            actor_id = %actor.user_id,
            target_id = %target_user_id,
            role = new_role.as_str(),
            transfer = matches!(plan, RolePlan::Transfer { .. }),
            "Group role changed"
        );
        Ok(membership)
    }

    /// Removes `target_user_id` from the group, or lets a member leave
    pub async fn remove_member(
        &self,
        actor: &Identity,
        group_id: Uuid,
        target_user_id: Uuid,
    ) -> Result<()> {
        let result = with_retry(self.engine.retry_policy(), "remove_member", || {
            self.try_remove_member(actor, group_id, target_user_id)
        })
        .await;

        self.engine
            .decisions()
            .observe(
                actor,
                "remove_member",
                AuditTarget::new("group", Some(group_id)),
                result,
            )
            .await
    }

    async fn try_remove_member(
        &self,
        actor: &Identity,
        group_id: Uuid,
        target_user_id: Uuid,
    ) -> Result<()> {
        actor.require_active()?;

        let mut tx = self.engine.db().begin().await?;
        lock_active_group(&mut tx, group_id).await?;

        let actor_role = GroupMembership::role_of(&mut *tx, group_id, actor.user_id).await?;
        let target_role = GroupMembership::role_of(&mut *tx, group_id, target_user_id).await?;

        plan_removal(actor.user_id, actor_role, target_user_id, target_role)?;

        if !GroupMembership::delete(&mut *tx, group_id, target_user_id).await? {
            return Err(Denial::NotFound.into());
        }

        tx.commit().await?;

        info!(
            %group_id,
            actor_id = %actor.user_id,
            target_id = %target_user_id,
            "Member removed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use GroupRole::{Admin, Member, Owner};

    #[test]
    fn test_owner_transfers_ownership() {
        let owner = Uuid::new_v4();
        let carol = Uuid::new_v4();

        assert_eq!(
            plan_role_change(owner, Some(Owner), carol, Some(Member), Owner),
            Ok(RolePlan::Transfer {
                previous_owner: owner
            })
        );
    }

    #[test]
    fn test_admin_cannot_demote_owner() {
        let admin = Uuid::new_v4();
        let owner = Uuid::new_v4();

        assert_eq!(
            plan_role_change(admin, Some(Admin), owner, Some(Owner), Member),
            Err(Denial::Forbidden)
        );
    }

    #[test]
    fn test_admin_cannot_create_owner() {
        assert_eq!(
            plan_role_change(Uuid::new_v4(), Some(Admin), Uuid::new_v4(), Some(Member), Owner),
            Err(Denial::Forbidden)
        );
    }

    #[test]
    fn test_owner_cannot_demote_self_without_transfer() {
        let owner = Uuid::new_v4();
        assert_eq!(
            plan_role_change(owner, Some(Owner), owner, Some(Owner), Admin),
            Err(Denial::LastOwnerProtected)
        );
    }

    #[test]
    fn test_admin_manages_members() {
        assert_eq!(
            plan_role_change(Uuid::new_v4(), Some(Admin), Uuid::new_v4(), Some(Member), Admin),
            Ok(RolePlan::Change)
        );
        assert_eq!(
            plan_role_change(Uuid::new_v4(), Some(Admin), Uuid::new_v4(), Some(Admin), Member),
            Ok(RolePlan::Change)
        );
    }

    #[test]
    fn test_member_cannot_change_roles() {
        assert_eq!(
            plan_role_change(Uuid::new_v4(), Some(Member), Uuid::new_v4(), Some(Member), Admin),
            Err(Denial::Forbidden)
        );
    }

    #[test]
    fn test_role_change_requires_memberships() {
        assert_eq!(
            plan_role_change(Uuid::new_v4(), None, Uuid::new_v4(), Some(Member), Admin),
            Err(Denial::NotFound)
        );
        assert_eq!(
            plan_role_change(Uuid::new_v4(), Some(Owner), Uuid::new_v4(), None, Admin),
            Err(Denial::NotFound)
        );
    }

    #[test]
    fn test_same_role_is_invalid_transition() {
        assert_eq!(
            plan_role_change(Uuid::new_v4(), Some(Owner), Uuid::new_v4(), Some(Admin), Admin),
            Err(Denial::InvalidTransition)
        );
    }

    #[test]
    fn test_member_may_leave() {
        let member = Uuid::new_v4();
        assert_eq!(plan_removal(member, Some(Member), member, Some(Member)), Ok(()));
    }

    #[test]
    fn test_owner_may_not_leave() {
        let owner = Uuid::new_v4();
        assert_eq!(
            plan_removal(owner, Some(Owner), owner, Some(Owner)),
            Err(Denial::LastOwnerProtected)
        );
    }

    #[test]
    fn test_removal_rules() {
        let actor = Uuid::new_v4();
        let target = Uuid::new_v4();

        assert_eq!(plan_removal(actor, Some(Admin), target, Some(Member)), Ok(()));
        assert_eq!(plan_removal(actor, Some(Owner), target, Some(Admin)), Ok(()));
        assert_eq!(
            plan_removal(actor, Some(Member), target, Some(Member)),
            Err(Denial::Forbidden)
        );
        assert_eq!(
            plan_removal(actor, Some(Admin), target, Some(Owner)),
            Err(Denial::Forbidden)
        );
        assert_eq!(
            plan_removal(actor, Some(Admin), target, None),
            Err(Denial::NotFound)
        );
        assert_eq!(plan_removal(actor, None, target, Some(Member)), Err(Denial::NotFound));
    }

    #[test]
    fn test_new_group_validation() {
        let valid = NewGroup {
            name: "  Platform Team  ".to_string(),
            description: None,
        }
        .normalized();
        assert_eq!(valid.name, "Platform Team");
        assert!(valid.validate().is_ok());

        let blank = NewGroup {
            name: "   ".to_string(),
            description: None,
        }
        .normalized();
        assert!(blank.validate().is_err());

        let long_description = NewGroup {
            name: "Ops".to_string(),
            description: Some("x".repeat(501)),
        };
        assert!(long_description.validate().is_err());
    }

    #[test]
    fn test_group_changes_validation() {
        assert!(GroupChanges::default().validate().is_ok());

        let too_long = GroupChanges {
            name: Some("n".repeat(101)),
            description: None,
        };
        assert!(too_long.validate().is_err());
    }
}
