use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::classify::{DatabaseHealth, FleetSummary};

/// Last published classification of the fleet, backing the REST API.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetView {
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub generated_at: Option<DateTime<Utc>>,
    pub generation: u64,
    pub prometheus_available: bool,
    pub override_active: bool,
    pub summary: FleetSummary,
    pub databases: Vec<DatabaseHealth>,
    pub autoscaling_status: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoopHealth {
    pub name: String,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl LoopHealth {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            last_success_at: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

#[derive(Default)]
struct SharedStateInner {
    fleet: RwLock<FleetView>,
    loop_health: RwLock<HashMap<String, LoopHealth>>,
}

/// Shared state container for the HTTP layer and the refresh loop.
#[derive(Clone, Default)]
pub struct SharedState {
    inner: Arc<SharedStateInner>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SharedStateInner::default()),
        }
    }

    pub async fn fleet_view(&self) -> FleetView {
        self.inner.fleet.read().await.clone()
    }

    pub async fn summary(&self) -> FleetSummary {
        self.inner.fleet.read().await.summary
    }

    pub async fn autoscaling_status(&self) -> serde_json::Value {
        self.inner.fleet.read().await.autoscaling_status.clone()
    }

    /// Replace the fleet view unless a newer generation is already published.
    pub async fn publish(&self, view: FleetView) -> bool {
        let mut guard = self.inner.fleet.write().await;
        if guard.generated_at.is_some() && view.generation < guard.generation {
            return false;
        }
        *guard = view;
        true
    }

    pub async fn record_loop_success(&self, loop_name: &str) {
        let mut guard = self.inner.loop_health.write().await;
        let entry = guard
            .entry(loop_name.to_string())
            .or_insert_with(|| LoopHealth::new(loop_name));
        entry.last_success_at = Some(Utc::now());
        entry.consecutive_failures = 0;
        entry.last_error = None;
    }

    pub async fn record_loop_failure(&self, loop_name: &str, error: String) {
        let mut guard = self.inner.loop_health.write().await;
        let entry = guard
            .entry(loop_name.to_string())
            .or_insert_with(|| LoopHealth::new(loop_name));
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.last_error = Some(error);
    }

    pub async fn loop_health(&self, loop_name: &str) -> Option<LoopHealth> {
        self.inner.loop_health.read().await.get(loop_name).cloned()
    }

    pub async fn is_ready(&self, loop_names: &[&str], max_staleness: Duration) -> bool {
        let health = self.inner.loop_health.read().await;
        let now = Utc::now();
        let staleness = chrono::Duration::from_std(max_staleness)
            .unwrap_or_else(|_| chrono::Duration::seconds(90));

        loop_names.iter().all(|name| match health.get(*name) {
            Some(entry) if entry.consecutive_failures == 0 => entry
                .last_success_at
                .is_some_and(|last| now.signed_duration_since(last) <= staleness),
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(generation: u64, total: usize) -> FleetView {
        FleetView {
            generated_at: Some(Utc::now()),
            generation,
            summary: FleetSummary {
                total,
                ..FleetSummary::default()
            },
            ..FleetView::default()
        }
    }

    #[tokio::test]
    async fn older_generation_is_not_published() {
        let state = SharedState::new();
        assert!(state.publish(view(2, 5)).await);
        assert!(!state.publish(view(1, 9)).await);
        assert_eq!(state.summary().await.total, 5);
        assert!(state.publish(view(3, 7)).await);
        assert_eq!(state.fleet_view().await.generation, 3);
    }

    #[tokio::test]
    async fn readiness_follows_loop_health() {
        let state = SharedState::new();
        let window = Duration::from_secs(90);
        assert!(!state.is_ready(&["refresh"], window).await);

        state.record_loop_success("refresh").await;
        assert!(state.is_ready(&["refresh"], window).await);

        state
            .record_loop_failure("refresh", "connection refused".into())
            .await;
        assert!(!state.is_ready(&["refresh"], window).await);
        let health = state.loop_health("refresh").await.expect("health");
        assert_eq!(health.consecutive_failures, 1);
        assert!(health.last_success_at.is_some());
    }
}
