#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use scalewatch::backend::{BackendConfig, BackendError, MetricsBackend};
use scalewatch::model::{AutoscaleTarget, MetricsPayload, ResourceId, TimeRange};
use serde_json::json;
use tokio::sync::Notify;

/// Three databases: one comfortably within limits, one over its memory threshold, one with no
/// capacity data at all.
pub fn fleet_payload() -> MetricsPayload {
    serde_json::from_value(json!({
        "prometheus_available": true,
        "databases": [
            {
                "database_id": 101,
                "database_name": "sessions",
                "subscription_id": 1,
                "subscription_name": "prod",
                "metrics": {
                    "throughput": 500.0,
                    "throughput_limit": 1000.0,
                    "memory": 100.0,
                    "memory_limit_bytes": 1000.0,
                    "cpu": 30.0,
                    "latency_ms": 0.001,
                    "payload_size_bytes": 1000.0
                },
                "thresholds": {
                    "throughput_threshold": 0.8,
                    "memory_threshold": 0.8,
                    "cpu_threshold": 0.6,
                    "latency_threshold_ms": 3.0,
                    "payload_size_threshold_kb": 1024.0
                }
            },
            {
                "database_id": "102",
                "database_name": "cache",
                "subscription_id": "1",
                "subscription_name": "prod",
                "metrics": {
                    "throughput": 500.0,
                    "throughput_limit": 1000.0,
                    "memory": 950.0,
                    "memory_limit_bytes": 1000.0,
                    "cpu": 30.0,
                    "latency_ms": 0.001
                },
                "thresholds": {
                    "throughput_threshold": 0.8,
                    "memory_threshold": 0.8,
                    "cpu_threshold": 0.6,
                    "latency_threshold_ms": 3.0
                }
            },
            {
                "database_id": 103,
                "database_name": "staging",
                "subscription_id": 2,
                "subscription_name": "dev",
                "metrics": {},
                "thresholds": {}
            }
        ]
    }))
    .expect("fleet fixture")
}

/// In-memory metrics API. When gated, `fetch_metrics` announces itself on `entered` and waits
/// for `release` before answering.
pub struct FakeBackend {
    payload: MetricsPayload,
    registry: Mutex<Vec<(ResourceId, ResourceId)>>,
    query_interval: Option<f64>,
    gated: bool,
    pub entered: Notify,
    pub release: Notify,
    fail_metrics: AtomicBool,
    metrics_calls: AtomicUsize,
    cloud_refreshes: AtomicUsize,
    ranges: Mutex<Vec<TimeRange>>,
    toggles: Mutex<Vec<(AutoscaleTarget, bool)>>,
}

impl FakeBackend {
    pub fn new(payload: MetricsPayload) -> Self {
        Self {
            payload,
            registry: Mutex::new(vec![("1".into(), "102".into())]),
            query_interval: Some(15.0),
            gated: false,
            entered: Notify::new(),
            release: Notify::new(),
            fail_metrics: AtomicBool::new(false),
            metrics_calls: AtomicUsize::new(0),
            cloud_refreshes: AtomicUsize::new(0),
            ranges: Mutex::new(Vec::new()),
            toggles: Mutex::new(Vec::new()),
        }
    }

    pub fn gated(payload: MetricsPayload) -> Self {
        Self {
            gated: true,
            ..Self::new(payload)
        }
    }

    pub fn with_query_interval(payload: MetricsPayload, seconds: Option<f64>) -> Self {
        Self {
            query_interval: seconds,
            ..Self::new(payload)
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_metrics.store(failing, Ordering::SeqCst);
    }

    pub fn metrics_calls(&self) -> usize {
        self.metrics_calls.load(Ordering::SeqCst)
    }

    pub fn cloud_refreshes(&self) -> usize {
        self.cloud_refreshes.load(Ordering::SeqCst)
    }

    /// Most recent window passed to `fetch_metrics`.
    pub fn last_range(&self) -> Option<TimeRange> {
        self.ranges.lock().expect("ranges").last().cloned()
    }

    pub fn toggles(&self) -> Vec<(AutoscaleTarget, bool)> {
        self.toggles.lock().expect("toggles").clone()
    }
}

#[async_trait]
impl MetricsBackend for FakeBackend {
    async fn fetch_metrics(&self, range: &TimeRange) -> Result<MetricsPayload, BackendError> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        self.ranges.lock().expect("ranges").push(range.clone());
        if self.gated {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if self.fail_metrics.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                endpoint: "/api/metrics",
                status: 503,
            });
        }
        Ok(self.payload.clone())
    }

    async fn fetch_autoscale_enabled(
        &self,
    ) -> Result<Vec<(ResourceId, ResourceId)>, BackendError> {
        Ok(self.registry.lock().expect("registry").clone())
    }

    async fn fetch_autoscaling_status(&self) -> Result<serde_json::Value, BackendError> {
        Ok(json!({"1:102": {"state": "idle"}}))
    }

    async fn set_autoscale(
        &self,
        target: &AutoscaleTarget,
        enabled: bool,
    ) -> Result<(), BackendError> {
        self.toggles
            .lock()
            .expect("toggles")
            .push((target.clone(), enabled));
        let pair = (target.subscription_id.clone(), target.database_id.clone());
        let mut registry = self.registry.lock().expect("registry");
        registry.retain(|existing| *existing != pair);
        if enabled {
            registry.push(pair);
        }
        Ok(())
    }

    async fn refresh_cloud(&self) -> Result<(), BackendError> {
        self.cloud_refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_config(&self) -> Result<BackendConfig, BackendError> {
        Ok(BackendConfig {
            prometheus_query_interval_seconds: self.query_interval,
        })
    }
}
