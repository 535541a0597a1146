//! Periodic heartbeat probing and reaping of unresponsive connections.
//!
//! Every period each connection is advanced one step:
//!
//! ```text
//! Alive --probe--> AwaitingPong --pong--> Alive
//!                  AwaitingPong --next period--> Dead --> evicted
//! ```
//!
//! A pong may arrive at any time and always resets the connection to
//! `Alive`, so a silent peer is evicted on the second sweep after its last
//! response, i.e. after more than one and at most two periods.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::domain::{CloseReason, ConnectionRegistry, Liveness, Outbound};

/// Counts from one [`LivenessMonitor::sweep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections sent a probe this period.
    pub probed: usize,
    /// Connections evicted for missing the previous probe.
    pub evicted: usize,
}

/// Drives the per-connection probe state machine on a fixed period.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    registry: Arc<ConnectionRegistry>,
    period: Duration,
}

impl LivenessMonitor {
    /// Creates a monitor sweeping `registry` every `period`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, period: Duration) -> Self {
        Self { registry, period }
    }

    /// Sweep period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Runs one period: probes `Alive` connections and evicts the ones
    /// still `AwaitingPong` from the previous sweep.
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for connection in self.registry.snapshot() {
            let id = connection.id();
            match self.registry.mark_probe(id) {
                Some(Liveness::AwaitingPong) => {
                    connection.outbound().push(Outbound::Probe);
                    report.probed += 1;
                }
                Some(Liveness::Dead) => {
                    tracing::warn!(
                        connection_id = %id,
                        last_activity = %connection.last_activity(),
                        "connection unresponsive"
                    );
                    if self.registry.evict_with(id, CloseReason::UNRESPONSIVE) {
                        report.evicted += 1;
                    }
                }
                Some(Liveness::Alive) | None => {}
            }
        }
        report
    }

    /// Spawns the periodic sweep. The first sweep runs one full period
    /// after the call; the task ends when `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = self.sweep();
                        if report.evicted > 0 {
                            tracing::info!(
                                probed = report.probed,
                                evicted = report.evicted,
                                remaining = self.registry.len(),
                                "liveness sweep"
                            );
                        }
                    }
                }
            }
            tracing::debug!("liveness monitor stopped");
        })
    }
}
