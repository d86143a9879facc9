//! Integration tests for groups, roles and invitations
//!
//! Run with: cargo test --test membership_tests

mod common;

use chrono::{Duration, Utc};
use statusguard_shared::auth::identity::Identity;
use statusguard_shared::engine::Engine;
use statusguard_shared::error::{Denial, Error};
use statusguard_shared::groups::{GroupChanges, NewGroup};
use statusguard_shared::invitations::{InvitationResponse, NewInvitation};
use statusguard_shared::models::group::Group;
use statusguard_shared::models::invitation::{Invitation, InvitationStatus};
use statusguard_shared::models::membership::{GroupMembership, GroupRole};
use statusguard_shared::projects::NewProject;
use uuid::Uuid;

fn new_group(name: &str) -> NewGroup {
    NewGroup {
        name: name.to_string(),
        description: None,
    }
}

fn invite(group_id: Uuid, email: &str, role: GroupRole) -> NewInvitation {
    NewInvitation {
        group_id,
        email: email.to_string(),
        role,
        message: None,
    }
}

/// Invites `invitee` and accepts on their behalf
async fn join(engine: &Engine, inviter: &Identity, group: &Group, invitee: &Identity, role: GroupRole) {
    let invitation = engine
        .invitations()
        .create(inviter, invite(group.id, &invitee.email, role))
        .await
        .unwrap();
    engine
        .invitations()
        .respond(invitee, invitation.id, InvitationResponse::Accepted)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_group_makes_single_owner() {
    let Some(ctx) = common::setup().await else { return };
    let owner = common::user(&ctx.pool, "owner").await;

    let group = ctx.engine.memberships().create_group(&owner, new_group("Ops")).await.unwrap();

    assert_eq!(group.owner_user_id, owner.user_id);
    assert_eq!(
        ctx.engine.memberships().role_of(group.id, owner.user_id).await.unwrap(),
        Some(GroupRole::Owner)
    );
    assert_eq!(GroupMembership::count_owners(&ctx.pool, group.id).await.unwrap(), 1);

    let duplicate = ctx.engine.memberships().create_group(&owner, new_group("Ops")).await;
    assert!(matches!(duplicate, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn test_invite_accept_then_respond_again() {
    let Some(ctx) = common::setup().await else { return };
    let owner = common::user(&ctx.pool, "owner").await;
    let bob_email = common::unique_email("bob");
    let group = ctx.engine.memberships().create_group(&owner, new_group("Team")).await.unwrap();

    // Address case is ignored
    let invitation = ctx
        .engine
        .invitations()
        .create(&owner, invite(group.id, &bob_email.to_uppercase(), GroupRole::Member))
        .await
        .unwrap();
    assert_eq!(invitation.invited_email, bob_email);
    assert_eq!(invitation.expires_at - invitation.created_at, Duration::days(7));

    let bob = common::user_with_email(&ctx.pool, &bob_email).await;
    let inbox = ctx.engine.invitations().inbox(&bob).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].group_name, "Team");

    let accepted = ctx
        .engine
        .invitations()
        .respond(&bob, invitation.id, InvitationResponse::Accepted)
        .await
        .unwrap();
    assert_eq!(accepted.status, InvitationStatus::Accepted);
    assert!(accepted.responded_at.is_some());
    assert_eq!(
        ctx.engine.memberships().role_of(group.id, bob.user_id).await.unwrap(),
        Some(GroupRole::Member)
    );

    for response in [InvitationResponse::Accepted, InvitationResponse::Declined] {
        let again = ctx.engine.invitations().respond(&bob, invitation.id, response).await;
        assert_eq!(again.unwrap_err().denial(), Some(&Denial::AlreadyResponded));
    }

    assert_eq!(common::decision_count(&ctx.pool, bob.user_id, "already_responded").await, 2);
    assert!(ctx.engine.invitations().inbox(&bob).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_response_after_ttl_expires_invitation() {
    let Some(ctx) = common::setup().await else { return };
    let owner = common::user(&ctx.pool, "owner").await;
    let bob = common::user(&ctx.pool, "bob").await;
    let group = ctx.engine.memberships().create_group(&owner, new_group("Team")).await.unwrap();

    let t0 = Utc::now();
    let invitation = ctx
        .engine
        .invitations()
        .create_at(&owner, invite(group.id, &bob.email, GroupRole::Member), t0)
        .await
        .unwrap();
    assert_eq!(invitation.expires_at - invitation.created_at, Duration::days(7));

    let inbox = ctx.engine.invitations().inbox_at(&bob, t0 + Duration::days(8)).await.unwrap();
    assert_eq!(inbox[0].invitation.status, InvitationStatus::Expired);

    let result = ctx
        .engine
        .invitations()
        .respond_at(&bob, invitation.id, InvitationResponse::Accepted, t0 + Duration::days(8))
        .await;
    assert_eq!(result.unwrap_err().denial(), Some(&Denial::InvitationExpired));

    let stored = Invitation::find_by_id(&ctx.pool, invitation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvitationStatus::Expired);
    assert_eq!(
        ctx.engine.memberships().role_of(group.id, bob.user_id).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_invitation_rules() {
    let Some(ctx) = common::setup().await else { return };
    let owner = common::user(&ctx.pool, "owner").await;
    let admin = common::user(&ctx.pool, "admin").await;
    let member = common::user(&ctx.pool, "member").await;
    let group = ctx.engine.memberships().create_group(&owner, new_group("Team")).await.unwrap();
    join(&ctx.engine, &owner, &group, &admin, GroupRole::Admin).await;
    join(&ctx.engine, &owner, &group, &member, GroupRole::Member).await;

    let invitations = ctx.engine.invitations();
    let carol = common::unique_email("carol");

    let by_member = invitations.create(&member, invite(group.id, &carol, GroupRole::Member)).await;
    assert_eq!(by_member.unwrap_err().denial(), Some(&Denial::Forbidden));

    let owner_invite = invitations.create(&owner, invite(group.id, &carol, GroupRole::Owner)).await;
    assert!(matches!(owner_invite, Err(Error::Invalid(_))));

    let existing_member = invitations.create(&admin, invite(group.id, &member.email, GroupRole::Member)).await;
    assert!(matches!(existing_member, Err(Error::Conflict(_))));

    invitations.create(&admin, invite(group.id, &carol, GroupRole::Admin)).await.unwrap();
    let duplicate = invitations.create(&owner, invite(group.id, &carol, GroupRole::Member)).await;
    assert!(matches!(duplicate, Err(Error::Conflict(_))));

    let outsider = common::user(&ctx.pool, "outsider").await;
    let hidden = invitations.create(&outsider, invite(group.id, &carol, GroupRole::Member)).await;
    assert_eq!(hidden.unwrap_err().denial(), Some(&Denial::NotFound));
}

#[tokio::test]
async fn test_stale_pending_invitation_replaced() {
    let Some(ctx) = common::setup().await else { return };
    let owner = common::user(&ctx.pool, "owner").await;
    let group = ctx.engine.memberships().create_group(&owner, new_group("Team")).await.unwrap();
    let dave = common::unique_email("dave");

    let t0 = Utc::now() - Duration::days(10);
    let stale = ctx
        .engine
        .invitations()
        .create_at(&owner, invite(group.id, &dave, GroupRole::Member), t0)
        .await
        .unwrap();

    let fresh = ctx
        .engine
        .invitations()
        .create(&owner, invite(group.id, &dave, GroupRole::Member))
        .await
        .unwrap();
    assert_ne!(fresh.id, stale.id);

    let stale = Invitation::find_by_id(&ctx.pool, stale.id).await.unwrap().unwrap();
    assert_eq!(stale.status, InvitationStatus::Expired);
}

#[tokio::test]
async fn test_owner_protection_and_transfer() {
    let Some(ctx) = common::setup().await else { return };
    let owner = common::user(&ctx.pool, "owner").await;
    let admin = common::user(&ctx.pool, "admin").await;
    let carol = common::user(&ctx.pool, "carol").await;
    let group = ctx.engine.memberships().create_group(&owner, new_group("Team")).await.unwrap();
    join(&ctx.engine, &owner, &group, &admin, GroupRole::Admin).await;
    join(&ctx.engine, &owner, &group, &carol, GroupRole::Member).await;

    let store = ctx.engine.memberships();

    let demote_owner = store.set_role(&admin, group.id, owner.user_id, GroupRole::Member).await;
    assert_eq!(demote_owner.unwrap_err().denial(), Some(&Denial::Forbidden));

    let demote_self = store.set_role(&owner, group.id, owner.user_id, GroupRole::Member).await;
    assert_eq!(demote_self.unwrap_err().denial(), Some(&Denial::LastOwnerProtected));

    let leave = store.remove_member(&owner, group.id, owner.user_id).await;
    assert_eq!(leave.unwrap_err().denial(), Some(&Denial::LastOwnerProtected));

    let transferred = store.set_role(&owner, group.id, carol.user_id, GroupRole::Owner).await.unwrap();
    assert_eq!(transferred.role, GroupRole::Owner);
    assert_eq!(store.role_of(group.id, owner.user_id).await.unwrap(), Some(GroupRole::Admin));
    assert_eq!(GroupMembership::count_owners(&ctx.pool, group.id).await.unwrap(), 1);

    let group = Group::find_by_id(&ctx.pool, group.id).await.unwrap().unwrap();
    assert_eq!(group.owner_user_id, carol.user_id);

    // The former owner may now leave
    store.remove_member(&owner, group.id, owner.user_id).await.unwrap();
    assert_eq!(store.role_of(group.id, owner.user_id).await.unwrap(), None);
}

#[tokio::test]
async fn test_concurrent_transfers_keep_single_owner() {
    let Some(ctx) = common::setup().await else { return };
    let owner = common::user(&ctx.pool, "owner").await;
    let a = common::user(&ctx.pool, "a").await;
    let b = common::user(&ctx.pool, "b").await;
    let group = ctx.engine.memberships().create_group(&owner, new_group("Team")).await.unwrap();
    join(&ctx.engine, &owner, &group, &a, GroupRole::Member).await;
    join(&ctx.engine, &owner, &group, &b, GroupRole::Member).await;

    let store = ctx.engine.memberships();
    let (to_a, to_b) = tokio::join!(
        store.set_role(&owner, group.id, a.user_id, GroupRole::Owner),
        store.set_role(&owner, group.id, b.user_id, GroupRole::Owner),
    );

    // The loser sees the owner already demoted to admin
    assert_eq!([to_a.is_ok(), to_b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(GroupMembership::count_owners(&ctx.pool, group.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_member_removal_and_self_leave() {
    let Some(ctx) = common::setup().await else { return };
    let owner = common::user(&ctx.pool, "owner").await;
    let admin = common::user(&ctx.pool, "admin").await;
    let m1 = common::user(&ctx.pool, "m1").await;
    let m2 = common::user(&ctx.pool, "m2").await;
    let group = ctx.engine.memberships().create_group(&owner, new_group("Team")).await.unwrap();
    for (user, role) in [(&admin, GroupRole::Admin), (&m1, GroupRole::Member), (&m2, GroupRole::Member)] {
        join(&ctx.engine, &owner, &group, user, role).await;
    }

    let store = ctx.engine.memberships();

    let by_member = store.remove_member(&m1, group.id, m2.user_id).await;
    assert_eq!(by_member.unwrap_err().denial(), Some(&Denial::Forbidden));

    let owner_by_admin = store.remove_member(&admin, group.id, owner.user_id).await;
    assert_eq!(owner_by_admin.unwrap_err().denial(), Some(&Denial::Forbidden));

    store.remove_member(&admin, group.id, m2.user_id).await.unwrap();
    store.remove_member(&m1, group.id, m1.user_id).await.unwrap();

    let detail = store.group_detail(&owner, group.id).await.unwrap();
    assert_eq!(detail.members.len(), 2);
}

#[tokio::test]
async fn test_group_update_and_deactivation() {
    let Some(ctx) = common::setup().await else { return };
    let owner = common::user(&ctx.pool, "owner").await;
    let admin = common::user(&ctx.pool, "admin").await;
    let group = ctx.engine.memberships().create_group(&owner, new_group("Team")).await.unwrap();
    join(&ctx.engine, &owner, &group, &admin, GroupRole::Admin).await;

    let store = ctx.engine.memberships();
    let renamed = store
        .update_group(
            &admin,
            group.id,
            GroupChanges {
                name: Some("  Platform ".to_string()),
                description: Some("On-call".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "Platform");

    let project = ctx
        .engine
        .projects()
        .create_project(
            &admin,
            NewProject {
                name: "Group status".to_string(),
                group_id: Some(group.id),
                is_public: false,
            },
        )
        .await
        .unwrap();

    let by_admin = store.deactivate_group(&admin, group.id).await;
    assert_eq!(by_admin.unwrap_err().denial(), Some(&Denial::Forbidden));

    store.deactivate_group(&owner, group.id).await.unwrap();
    assert_eq!(GroupMembership::count_owners(&ctx.pool, group.id).await.unwrap(), 1);

    let detail = store.group_detail(&owner, group.id).await;
    assert_eq!(detail.unwrap_err().denial(), Some(&Denial::NotFound));

    let read = ctx.engine.projects().get_project(&admin, project.id).await;
    assert_eq!(read.unwrap_err().denial(), Some(&Denial::NotFound));
}

#[tokio::test]
async fn test_group_projects_count_against_creator_quota() {
    let Some(ctx) = common::setup().await else { return };
    let alice = common::user(&ctx.pool, "alice").await;
    let bob = common::user(&ctx.pool, "bob").await;
    let projects = ctx.engine.projects();

    projects
        .create_project(
            &alice,
            NewProject {
                name: "Personal".to_string(),
                group_id: None,
                is_public: false,
            },
        )
        .await
        .unwrap();

    let group_project = |group_id, name: &str| NewProject {
        name: name.to_string(),
        group_id: Some(group_id),
        is_public: false,
    };

    for name in ["Team A", "Team B"] {
        let group = ctx.engine.memberships().create_group(&alice, new_group(name)).await.unwrap();
        let denied = projects.create_project(&alice, group_project(group.id, name)).await;
        assert!(matches!(
            denied.unwrap_err().denial(),
            Some(Denial::QuotaExceeded { limit: 1, .. })
        ));

        // Another member still has their own allowance
        if name == "Team A" {
            join(&ctx.engine, &alice, &group, &bob, GroupRole::Member).await;
            projects.create_project(&bob, group_project(group.id, "Bob's")).await.unwrap();
        }
    }

    let owned: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE owner_user_id = $1")
        .bind(alice.user_id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(owned, 1);

    let usage = ctx.engine.subscription_overview(&alice).await.unwrap().usage;
    assert_eq!(usage.projects, 1);
}

#[tokio::test]
async fn test_expire_stale_sweeps_only_pending() {
    let Some(ctx) = common::setup().await else { return };
    let owner = common::user(&ctx.pool, "owner").await;
    let bob = common::user(&ctx.pool, "bob").await;
    let group = ctx.engine.memberships().create_group(&owner, new_group("Team")).await.unwrap();

    let t0 = Utc::now() - Duration::days(30);
    let stale = ctx
        .engine
        .invitations()
        .create_at(&owner, invite(group.id, &common::unique_email("x"), GroupRole::Member), t0)
        .await
        .unwrap();
    let declined = ctx
        .engine
        .invitations()
        .create_at(&owner, invite(group.id, &bob.email, GroupRole::Member), t0)
        .await
        .unwrap();
    ctx.engine
        .invitations()
        .respond_at(&bob, declined.id, InvitationResponse::Declined, t0 + Duration::days(1))
        .await
        .unwrap();

    while ctx.engine.invitations().expire_stale(Utc::now(), 500).await.unwrap() == 500 {}

    let stale = Invitation::find_by_id(&ctx.pool, stale.id).await.unwrap().unwrap();
    let declined = Invitation::find_by_id(&ctx.pool, declined.id).await.unwrap().unwrap();
    assert_eq!(stale.status, InvitationStatus::Expired);
    assert_eq!(declined.status, InvitationStatus::Declined);
}
