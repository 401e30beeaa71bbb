//! # Periodic Runner
//!
//! Drives a job on a fixed period until cancelled. Ticks never overlap:
//! the loop awaits each run before waiting for the next tick, missed ticks
//! are dropped rather than queued, and jobs additionally guard themselves
//! with [`TickGuard`] so a manual `tick()` cannot run alongside the loop.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A job run by [`spawn_periodic`].
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn run_once(&self) -> Result<()>;
}

/// Held for the duration of a tick; released on drop.
pub struct TickGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> TickGuard<'a> {
    /// `None` when a tick is already running.
    pub fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Run `job` immediately and then every `period` until `shutdown` fires.
///
/// A run in progress is allowed to finish before the loop exits.
pub fn spawn_periodic(
    job: Arc<dyn PeriodicJob>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(job = job.name(), period_secs = period.as_secs(), "Periodic job started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    debug!(job = job.name(), "Tick");
                    if let Err(e) = job.run_once().await {
                        error!(job = job.name(), error = %e, "Tick failed");
                    }
                }
            }
        }

        info!(job = job.name(), "Periodic job stopped");
    })
}
