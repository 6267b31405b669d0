//! Restart policy for the top-level bridge routine
//!
//! A failed run is restarted from scratch after an exponential backoff, up to
//! a fixed number of restarts. A run that stayed up longer than the maximum
//! backoff counts as healthy, so its failure starts a fresh budget.

use crate::bridge::lifecycle::wait_for_shutdown;
use crate::config::SupervisorSection;
use crate::error::BridgeResult;
use crate::observability::metrics;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Giving up after {restarts} restarts, last error: {last_error}")]
    RestartsExhausted { restarts: u32, last_error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestartPolicy {
    pub max_restarts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl From<&SupervisorSection> for RestartPolicy {
    fn from(section: &SupervisorSection) -> Self {
        Self {
            max_restarts: section.max_restarts,
            initial_backoff: Duration::from_millis(section.initial_backoff_ms),
            max_backoff: Duration::from_millis(section.max_backoff_ms),
        }
    }
}

impl RestartPolicy {
    /// Delay before the given restart (1-based), doubling up to the cap
    pub fn backoff_for(&self, restart: u32) -> Duration {
        let exponent = restart.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Run `routine` until it succeeds, shutdown is signalled or restarts run out
///
/// `routine` receives the restart count of the attempt (0 for the first).
pub async fn run_with_restarts<F, Fut>(
    policy: &RestartPolicy,
    mut shutdown: watch::Receiver<bool>,
    mut routine: F,
) -> Result<(), SupervisorError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = BridgeResult<()>>,
{
    let mut restarts = 0u32;
    loop {
        let started = Instant::now();
        let error = match routine(restarts).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if *shutdown.borrow() {
            info!(error = %error.sanitized(), "Bridge stopped during shutdown");
            return Ok(());
        }

        if started.elapsed() > policy.max_backoff {
            restarts = 0;
        }
        if restarts >= policy.max_restarts {
            error!(restarts, error = %error.sanitized(), "Restart budget exhausted");
            return Err(SupervisorError::RestartsExhausted {
                restarts,
                last_error: error.sanitized(),
            });
        }

        restarts += 1;
        let delay = policy.backoff_for(restarts);
        metrics().bridge_restarted();
        warn!(
            restart = restarts,
            max_restarts = policy.max_restarts,
            delay_ms = delay.as_millis() as u64,
            error = %error.sanitized(),
            "Bridge failed, restarting"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wait_for_shutdown(&mut shutdown) => {
                info!("Shutdown requested during restart backoff");
                return Ok(());
            }
        }
    }
}
