use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::REFRESH_LOOP;
use crate::backend::{BackendError, MetricsBackend};
use crate::classify::{ThresholdResolver, assess};
use crate::config::ScalingConfig;
use crate::metrics::AppMetrics;
use crate::model::{AutoscaleRegistry, MetricsPayload};
use crate::session::Session;
use crate::state::{FleetView, SharedState};

const POLL_BUDGET: Duration = Duration::from_secs(10);

/// Result of a [`RefreshCoordinator::poll`] call that did not hit a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Completed { generation: u64, databases: usize },
    /// Another poll was still fetching; nothing was requested.
    Skipped,
}

/// Drives one refresh at a time: fetch, classify, publish.
pub struct RefreshCoordinator {
    backend: Arc<dyn MetricsBackend>,
    session: Session,
    state: SharedState,
    metrics: AppMetrics,
    scaling: ScalingConfig,
    busy: AtomicBool,
    generation: AtomicU64,
}

struct Fetched {
    registry: AutoscaleRegistry,
    /// Session registry revision observed before the registry was requested.
    registry_revision: u64,
    autoscaling_status: serde_json::Value,
    payload: MetricsPayload,
}

/// Holds the busy flag; releasing happens on drop so an early return cannot leave it set.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl RefreshCoordinator {
    pub fn new(
        backend: Arc<dyn MetricsBackend>,
        session: Session,
        state: SharedState,
        metrics: AppMetrics,
        scaling: ScalingConfig,
    ) -> Self {
        Self {
            backend,
            session,
            state,
            metrics,
            scaling,
            busy: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Fetch the registry, autoscaling status and metrics, then reclassify and publish.
    ///
    /// Returns [`PollOutcome::Skipped`] without touching the network when a fetch is already in
    /// flight. On error the previously published view stays in place.
    pub async fn poll(&self) -> Result<PollOutcome, BackendError> {
        let Some(guard) = BusyGuard::acquire(&self.busy) else {
            debug!(loop_name = REFRESH_LOOP, "refresh already in flight; skipping");
            self.metrics.inc_skipped(REFRESH_LOOP);
            return Ok(PollOutcome::Skipped);
        };

        let start = Instant::now();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let fetched = self.fetch().await;
        drop(guard);

        match fetched {
            Ok(fetched) => {
                let databases = self.publish(generation, fetched).await;
                let elapsed = start.elapsed();
                self.metrics.observe_duration(REFRESH_LOOP, elapsed);
                if elapsed > POLL_BUDGET {
                    warn!(
                        loop_name = REFRESH_LOOP,
                        elapsed = ?elapsed,
                        budget = ?POLL_BUDGET,
                        "refresh exceeded budget"
                    );
                } else {
                    info!(
                        loop_name = REFRESH_LOOP,
                        generation,
                        databases,
                        elapsed = ?elapsed,
                        "refresh completed"
                    );
                }
                self.metrics.record_success(REFRESH_LOOP, true);
                self.state.record_loop_success(REFRESH_LOOP).await;
                Ok(PollOutcome::Completed {
                    generation,
                    databases,
                })
            }
            Err(err) => {
                error!(
                    loop_name = REFRESH_LOOP,
                    endpoint = err.endpoint(),
                    error = ?err,
                    "refresh failed; keeping last published view"
                );
                self.metrics.record_success(REFRESH_LOOP, false);
                self.metrics.inc_error(REFRESH_LOOP);
                self.state
                    .record_loop_failure(REFRESH_LOOP, err.to_string())
                    .await;
                Err(err)
            }
        }
    }

    async fn fetch(&self) -> Result<Fetched, BackendError> {
        let range = self.session.time_range().await;
        let registry_revision = self.session.registry_revision().await;
        let pairs = self.backend.fetch_autoscale_enabled().await?;
        let registry = AutoscaleRegistry::from_pairs(pairs);
        let autoscaling_status = self.backend.fetch_autoscaling_status().await?;
        let payload = self.backend.fetch_metrics(&range).await?;
        Ok(Fetched {
            registry,
            registry_revision,
            autoscaling_status,
            payload,
        })
    }

    async fn publish(&self, generation: u64, fetched: Fetched) -> usize {
        let registry = self
            .session
            .with_toggles_since(fetched.registry, fetched.registry_revision)
            .await;
        let override_policy = self.session.override_policy().await;
        let resolver = ThresholdResolver::new(override_policy.as_ref());
        let (records, prometheus_available) = fetched.payload.into_parts();
        if !prometheus_available {
            warn!("metrics API reports live metrics unavailable");
        }

        let assessment = assess(records, &resolver, &registry, &self.scaling);
        let databases = assessment.databases.len();
        let categories = assessment.category_counts();
        let summary = assessment.summary;

        let view = FleetView {
            generated_at: Some(Utc::now()),
            generation,
            prometheus_available,
            override_active: resolver.override_active(),
            summary,
            databases: assessment.databases,
            autoscaling_status: fetched.autoscaling_status,
        };

        if self.state.publish(view).await {
            self.session
                .replace_registry(registry, fetched.registry_revision)
                .await;
            self.metrics.set_fleet_metrics(&summary, &categories);
        } else {
            debug!(generation, "newer view already published; discarding");
        }
        databases
    }
}
