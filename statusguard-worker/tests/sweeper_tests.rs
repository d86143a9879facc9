//! Integration tests for the invitation sweeper
//!
//! These tests need PostgreSQL. Set DATABASE_URL to run them; without it
//! every test returns early.
//!
//! Run with: cargo test -p statusguard-worker --test sweeper_tests

use chrono::{Duration, Utc};
use statusguard_shared::auth::identity::Identity;
use statusguard_shared::db::migrations::run_migrations;
use statusguard_shared::db::pool::{create_pool, DatabaseConfig};
use statusguard_shared::engine::{Engine, EngineConfig};
use statusguard_shared::groups::NewGroup;
use statusguard_shared::invitations::{InvitationResponse, NewInvitation};
use statusguard_shared::models::invitation::{Invitation, InvitationStatus};
use statusguard_shared::models::membership::GroupRole;
use statusguard_worker::sweeper::{InvitationSweeper, SweeperConfig};
use uuid::Uuid;

async fn engine() -> Option<Engine> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };

    let pool = create_pool(DatabaseConfig {
        url,
        ..Default::default()
    })
    .await
    .expect("Failed to create pool");
    run_migrations(&pool).await.expect("Failed to run migrations");

    Some(Engine::new(pool, EngineConfig::default()))
}

fn email(name: &str) -> String {
    format!("{}-{}@example.com", name, Uuid::new_v4().simple())
}

fn invite(group_id: Uuid, email: &str) -> NewInvitation {
    NewInvitation {
        group_id,
        email: email.to_string(),
        role: GroupRole::Member,
        message: None,
    }
}

#[tokio::test]
async fn test_sweep_expires_only_stale_pending() {
    let Some(engine) = engine().await else { return };
    let owner = Identity::resolve(engine.db(), &email("owner")).await.unwrap();
    let group = engine
        .memberships()
        .create_group(
            &owner,
            NewGroup {
                name: "Sweep".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();

    let long_ago = Utc::now() - Duration::days(8);
    let stale = engine
        .invitations()
        .create_at(&owner, invite(group.id, &email("stale")), long_ago)
        .await
        .unwrap();

    let declined_email = email("declined");
    let declined = engine
        .invitations()
        .create_at(&owner, invite(group.id, &declined_email), long_ago)
        .await
        .unwrap();
    let invitee = Identity::resolve(engine.db(), &declined_email).await.unwrap();
    engine
        .invitations()
        .respond_at(&invitee, declined.id, InvitationResponse::Declined, long_ago + Duration::days(1))
        .await
        .unwrap();

    let fresh = engine
        .invitations()
        .create(&owner, invite(group.id, &email("fresh")))
        .await
        .unwrap();

    let sweeper = InvitationSweeper::new(
        engine.clone(),
        SweeperConfig {
            interval_secs: 1,
            batch_size: 1,
        },
    );
    let expired = sweeper.sweep_once(Utc::now()).await.unwrap();
    assert!(expired >= 1);

    let status = |id| {
        let engine = engine.clone();
        async move {
            Invitation::find_by_id(engine.db(), id)
                .await
                .unwrap()
                .unwrap()
                .status
        }
    };
    assert_eq!(status(stale.id).await, InvitationStatus::Expired);
    assert_eq!(status(declined.id).await, InvitationStatus::Declined);
    assert_eq!(status(fresh.id).await, InvitationStatus::Pending);
}

#[tokio::test]
async fn test_run_stops_on_cancel() {
    let Some(engine) = engine().await else { return };
    let sweeper = InvitationSweeper::new(engine, SweeperConfig::default());

    let shutdown = sweeper.shutdown_token();
    shutdown.cancel();

    tokio::time::timeout(std::time::Duration::from_secs(5), sweeper.run())
        .await
        .expect("Sweeper should stop once cancelled");
}
