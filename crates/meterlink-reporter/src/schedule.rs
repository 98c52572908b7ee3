//! Periodic driver: calls `MetricsReporter::run` on a tokio interval.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::reporter::MetricsReporter;

/// Poll period used while the configured interval is 0, so a later config
/// update can turn collection on.
const DISABLED_POLL: Duration = Duration::from_secs(1);

/// Wall-clock epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

pub struct ReporterHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl ReporterHandle {
    /// Stop ticking. One final tick flushes what accumulated since the last
    /// one before this returns.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "reporter task ended abnormally");
        }
    }
}

/// Tick period for a configured interval in milliseconds.
fn period_for(interval_ms: u64) -> Duration {
    if interval_ms == 0 {
        DISABLED_POLL
    } else {
        Duration::from_millis(interval_ms)
    }
}

fn ticker(period: Duration) -> Interval {
    let mut t = tokio::time::interval_at(Instant::now() + period, period);
    t.set_missed_tick_behavior(MissedTickBehavior::Skip);
    t
}

/// Spawn the periodic driver on the current tokio runtime.
///
/// The period follows the reporter's settings: after `update_config`
/// changes the interval, the new period applies from the next wakeup.
pub fn spawn_periodic(reporter: Arc<MetricsReporter>) -> ReporterHandle {
    let (shutdown, mut stop_rx) = oneshot::channel::<()>();

    let join = tokio::spawn(async move {
        let interval_ms = reporter.settings().interval_ms;
        let mut enabled = interval_ms != 0;
        let mut period = period_for(interval_ms);
        let mut ticks = ticker(period);
        reporter.reset_now(now_millis());
        tracing::info!(period_ms = period.as_millis() as u64, "metrics reporter started");

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    // collection switched on since the last wakeup waits one full period
                    if enabled {
                        reporter.run(now_millis());
                    }
                }
                _ = &mut stop_rx => {
                    let summary = reporter.run(now_millis());
                    tracing::info!(sets = summary.sets, "metrics reporter stopped after final flush");
                    break;
                }
            }

            let interval_ms = reporter.settings().interval_ms;
            let next = period_for(interval_ms);
            if !enabled && interval_ms != 0 {
                reporter.reset_now(now_millis());
            }
            enabled = interval_ms != 0;
            if next != period {
                tracing::info!(
                    from_ms = period.as_millis() as u64,
                    to_ms = next.as_millis() as u64,
                    "metrics reporter period changed"
                );
                period = next;
                ticks = ticker(period);
            }
        }
    });

    ReporterHandle { shutdown, join }
}
