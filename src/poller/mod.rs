use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use crate::backend::MetricsBackend;

mod coordinator;

pub use coordinator::{PollOutcome, RefreshCoordinator};

pub const REFRESH_LOOP: &str = "refresh";

/// Spawn the periodic refresh loop. It stops on the first change to `shutdown` or when its
/// sender is dropped.
pub fn spawn_refresh_loop(
    coordinator: Arc<RefreshCoordinator>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(loop_name = REFRESH_LOOP, interval = ?interval, "starting refresh loop");

        // First tick completes immediately so the fleet view is populated at startup.
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Failures are already logged and recorded by the coordinator.
                    let _ = coordinator.poll().await;
                }
                _ = shutdown.changed() => {
                    info!(loop_name = REFRESH_LOOP, "refresh loop stopping");
                    break;
                }
            }
        }
    })
}

const MIN_INTERVAL: Duration = Duration::from_secs(1);
const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Poll cadence advertised by the metrics API, or `fallback` when it is unavailable or
/// outside one second to one day.
pub async fn resolve_interval(backend: &dyn MetricsBackend, fallback: Duration) -> Duration {
    match backend.fetch_config().await {
        Ok(config) => match config.prometheus_query_interval_seconds {
            Some(seconds) => match Duration::try_from_secs_f64(seconds) {
                Ok(interval) if (MIN_INTERVAL..=MAX_INTERVAL).contains(&interval) => interval,
                _ => {
                    warn!(seconds, fallback = ?fallback, "metrics API query interval out of range");
                    fallback
                }
            },
            None => {
                info!(fallback = ?fallback, "metrics API advertises no query interval");
                fallback
            }
        },
        Err(err) => {
            warn!(error = ?err, fallback = ?fallback, "failed to load metrics API config");
            fallback
        }
    }
}
