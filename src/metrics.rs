use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

use crate::classify::{FleetSummary, HealthCategory};

/// Metrics registry for the agent scraped by Prometheus.
#[derive(Clone)]
pub struct AppMetrics {
    registry: Arc<Registry>,
    loops: LoopMetrics,
    fleet: FleetMetrics,
}

impl AppMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new_custom(Some("scalewatch".into()), None)?);

        let loops = LoopMetrics::register(&registry)?;
        let fleet = FleetMetrics::register(&registry)?;

        Ok(Self {
            registry,
            loops,
            fleet,
        })
    }

    /// Observe the execution duration for a loop.
    pub fn observe_duration(&self, loop_name: &str, duration: Duration) {
        self.loops
            .poll_duration
            .with_label_values(&[loop_name])
            .observe(duration.as_secs_f64());
    }

    /// Record a success flag for a loop iteration (1=success, 0=failed).
    pub fn record_success(&self, loop_name: &str, success: bool) {
        self.loops
            .last_success
            .with_label_values(&[loop_name])
            .set(if success { 1 } else { 0 });
    }

    pub fn inc_error(&self, loop_name: &str) {
        self.loops
            .errors_total
            .with_label_values(&[loop_name])
            .inc();
    }

    /// Count a poll that was dropped because another was still fetching.
    pub fn inc_skipped(&self, loop_name: &str) {
        self.loops
            .skipped_total
            .with_label_values(&[loop_name])
            .inc();
    }

    pub fn set_fleet_metrics(&self, summary: &FleetSummary, categories: &[(HealthCategory, usize)]) {
        self.fleet.total.set(summary.total as i64);
        self.fleet.healthy.set(summary.healthy as i64);
        self.fleet.attention.set(summary.attention as i64);
        self.fleet
            .autoscale_enabled
            .set(summary.autoscale_enabled as i64);

        self.fleet.by_category.reset();
        for (category, count) in categories {
            self.fleet
                .by_category
                .with_label_values(&[category.as_str()])
                .set(*count as i64);
        }
    }

    /// Encode metrics into Prometheus exposition format.
    pub fn encode(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[derive(Clone)]
struct LoopMetrics {
    poll_duration: HistogramVec,
    last_success: IntGaugeVec,
    errors_total: IntCounterVec,
    skipped_total: IntCounterVec,
}

impl LoopMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let poll_duration = HistogramVec::new(
            HistogramOpts::new("poll_duration_seconds", "Refresh poll duration"),
            &["loop"],
        )?;
        registry.register(Box::new(poll_duration.clone()))?;

        let last_success = IntGaugeVec::new(
            Opts::new("last_poll_success", "Poll success flag (1=success, 0=failure)"),
            &["loop"],
        )?;
        registry.register(Box::new(last_success.clone()))?;

        let errors_total =
            IntCounterVec::new(Opts::new("errors_total", "Total poll errors"), &["loop"])?;
        registry.register(Box::new(errors_total.clone()))?;

        let skipped_total = IntCounterVec::new(
            Opts::new(
                "polls_skipped_total",
                "Polls dropped because a fetch was already in flight",
            ),
            &["loop"],
        )?;
        registry.register(Box::new(skipped_total.clone()))?;

        Ok(Self {
            poll_duration,
            last_success,
            errors_total,
            skipped_total,
        })
    }
}

#[derive(Clone)]
struct FleetMetrics {
    total: IntGauge,
    healthy: IntGauge,
    attention: IntGauge,
    autoscale_enabled: IntGauge,
    by_category: IntGaugeVec,
}

impl FleetMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let total = IntGauge::new("fleet_databases", "Databases in the last published view")?;
        registry.register(Box::new(total.clone()))?;

        let healthy = IntGauge::new(
            "fleet_healthy_databases",
            "Databases with evaluated capacity metrics and no failures",
        )?;
        registry.register(Box::new(healthy.clone()))?;

        let attention = IntGauge::new(
            "fleet_attention_databases",
            "Databases failing throughput, memory, CPU or latency",
        )?;
        registry.register(Box::new(attention.clone()))?;

        let autoscale_enabled = IntGauge::new(
            "fleet_autoscale_enabled_databases",
            "Databases with autoscaling switched on",
        )?;
        registry.register(Box::new(autoscale_enabled.clone()))?;

        let by_category = IntGaugeVec::new(
            Opts::new("fleet_category_databases", "Databases per health category"),
            &["category"],
        )?;
        registry.register(Box::new(by_category.clone()))?;

        Ok(Self {
            total,
            healthy,
            attention,
            autoscale_enabled,
            by_category,
        })
    }
}
