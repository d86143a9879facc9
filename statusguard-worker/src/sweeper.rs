/// Invitation expiry sweeper
///
/// Expiry is evaluated lazily on every read and response, so the sweeper is
/// not needed for correctness. It persists the `pending -> expired`
/// transition for invitations nobody touches, keeping inbox and admin
/// listings cheap.
///
/// Each tick drains stale invitations in batches until a batch comes back
/// short. The update is the same conditional transition a response uses, so
/// the sweeper never overwrites an accepted or declined invitation.
///
/// # Example
///
/// ```no_run
/// use statusguard_worker::sweeper::{InvitationSweeper, SweeperConfig};
/// use statusguard_shared::engine::{Engine, EngineConfig};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> anyhow::Result<()> {
/// let engine = Engine::new(pool, EngineConfig::default());
/// let sweeper = InvitationSweeper::new(engine, SweeperConfig::default());
///
/// let shutdown = sweeper.shutdown_token();
/// tokio::spawn(async move {
///     tokio::signal::ctrl_c().await.ok();
///     shutdown.cancel();
/// });
///
/// sweeper.run().await;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use statusguard_shared::engine::Engine;
use statusguard_shared::error::Result;
use std::env;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Sweeper configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Seconds between sweeps
    pub interval_secs: u64,

    /// Invitations expired per statement
    pub batch_size: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        SweeperConfig {
            interval_secs: 60,
            batch_size: 500,
        }
    }
}

impl SweeperConfig {
    /// Reads `SWEEP_INTERVAL_SECS` and `SWEEP_BATCH_SIZE`
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but not a positive integer
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_values(
            env::var("SWEEP_INTERVAL_SECS").ok().as_deref(),
            env::var("SWEEP_BATCH_SIZE").ok().as_deref(),
        )
    }

    fn from_values(interval_secs: Option<&str>, batch_size: Option<&str>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let interval_secs = match interval_secs {
            Some(value) => value.trim().parse::<u64>()?,
            None => defaults.interval_secs,
        };
        let batch_size = match batch_size {
            Some(value) => value.trim().parse::<i64>()?,
            None => defaults.batch_size,
        };

        if interval_secs == 0 {
            anyhow::bail!("SWEEP_INTERVAL_SECS must be at least 1");
        }
        if batch_size <= 0 {
            anyhow::bail!("SWEEP_BATCH_SIZE must be at least 1");
        }

        Ok(Self {
            interval_secs,
            batch_size,
        })
    }
}

pub struct InvitationSweeper {
    engine: Engine,
    config: SweeperConfig,
    shutdown_token: CancellationToken,
}

impl InvitationSweeper {
    pub fn new(engine: Engine, config: SweeperConfig) -> Self {
        InvitationSweeper {
            engine,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Token that stops [`Self::run`] when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Expires every invitation stale as of `now`
    ///
    /// # Returns
    ///
    /// Total number of invitations expired
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<u64> {
        let invitations = self.engine.invitations();
        let mut total = 0;

        loop {
            if self.shutdown_token.is_cancelled() {
                break;
            }

            let expired = invitations.expire_stale(now, self.config.batch_size).await?;
            total += expired;

            if (expired as i64) < self.config.batch_size {
                break;
            }
        }

        Ok(total)
    }

    /// Sweeps on every tick until the shutdown token is cancelled
    ///
    /// Storage errors are logged and the next tick tries again.
    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.config.interval_secs,
            batch_size = self.config.batch_size,
            "Invitation sweeper starting"
        );

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.sweep_once(Utc::now()).await {
                Ok(0) => tracing::debug!("No stale invitations"),
                Ok(expired) => tracing::info!(expired, "Expired stale invitations"),
                Err(e) if e.is_transient() => {
                    tracing::warn!(error = %e, "Transient error during sweep, retrying next tick");
                }
                Err(e) => tracing::error!(error = %e, "Invitation sweep failed"),
            }
        }

        tracing::info!("Invitation sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert_eq!(SweeperConfig::from_values(None, None).unwrap(), SweeperConfig::default());
    }

    #[test]
    fn test_config_overrides() {
        let config = SweeperConfig::from_values(Some("5"), Some(" 100 ")).unwrap();
        assert_eq!(config.interval_secs, 5);
        assert_eq!(config.batch_size, 100);
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        assert!(SweeperConfig::from_values(Some("0"), None).is_err());
        assert!(SweeperConfig::from_values(None, Some("-1")).is_err());
        assert!(SweeperConfig::from_values(Some("soon"), None).is_err());
    }
}
