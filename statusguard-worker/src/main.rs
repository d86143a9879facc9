//! # StatusGuard Worker
//!
//! Runs the invitation expiry sweeper until Ctrl-C.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p statusguard-worker
//! ```

use statusguard_shared::db::{
    migrations::run_migrations,
    pool::{close_pool, create_pool, DatabaseConfig},
};
use statusguard_shared::engine::{Engine, EngineConfig};
use statusguard_worker::sweeper::{InvitationSweeper, SweeperConfig};
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statusguard_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "StatusGuard Worker v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let database_url = env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;
    let sweeper_config = SweeperConfig::from_env()?;

    let pool = create_pool(DatabaseConfig {
        url: database_url,
        max_connections: 2,
        ..Default::default()
    })
    .await?;
    run_migrations(&pool).await?;

    let sweeper = InvitationSweeper::new(
        Engine::new(pool.clone(), EngineConfig::default()),
        sweeper_config,
    );

    let shutdown = sweeper.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        shutdown.cancel();
    });

    sweeper.run().await;
    close_pool(pool).await;
    Ok(())
}
