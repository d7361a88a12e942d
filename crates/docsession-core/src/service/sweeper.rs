use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SweeperConfig;
use crate::error::Result;
use crate::handler::{DocumentSessionHandler, SessionHandler};

/// Shortest accepted sweep interval.
pub const MIN_INTERVAL_S: u64 = 1;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// `gc` calls made.
    pub passes: u32,
    /// Sessions deleted across all passes.
    pub deleted: usize,
    /// False when the pass limit was hit while batches were still full.
    pub drained: bool,
}

/// Calls `gc` on a schedule.
///
/// `gc` deletes a single bounded batch, so each tick keeps calling it while
/// batches come back full, up to `max_passes`. "Full" is judged against the
/// handler's own batch size.
pub struct GcSweeper {
    handler: Arc<DocumentSessionHandler>,
    lifetime_secs: u64,
    interval: Duration,
    max_passes: u32,
}

impl GcSweeper {
    /// Collects sessions idle longer than the handler's configured lifetime.
    pub fn new(handler: Arc<DocumentSessionHandler>, config: &SweeperConfig) -> Self {
        Self {
            lifetime_secs: handler.lifetime_secs(),
            handler,
            interval: Duration::from_secs(config.interval_secs.max(MIN_INTERVAL_S)),
            max_passes: config.max_passes.max(1),
        }
    }

    pub fn with_lifetime_secs(mut self, lifetime_secs: u64) -> Self {
        self.lifetime_secs = lifetime_secs;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `gc` until a batch comes back short or `max_passes` is reached.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let batch_size = self.handler.gc_batch_size();
        let mut report = SweepReport::default();
        while report.passes < self.max_passes {
            let deleted = self.handler.gc(self.lifetime_secs).await?;
            report.passes += 1;
            report.deleted += deleted;
            if deleted == 0 || deleted < batch_size {
                report.drained = true;
                break;
            }
        }
        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` resolves. The first sweep runs
    /// immediately. A failed sweep is logged and retried on the next tick.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            "GC sweeper started (every {}s, lifetime {}s)",
            self.interval.as_secs(),
            self.lifetime_secs
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("GC sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report.deleted > 0 || !report.drained => {
                            info!(
                                "Swept {} session(s) in {} pass(es){}",
                                report.deleted,
                                report.passes,
                                if report.drained { "" } else { ", backlog remains" }
                            );
                        }
                        Ok(_) => debug!("Sweep found nothing to remove"),
                        Err(e) => warn!("Sweep failed: {}", e),
                    }
                }
            }
        }
    }
}
