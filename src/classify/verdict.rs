use serde::Serialize;

use crate::model::{MetricSample, ThresholdPolicy};

/// Payload size threshold applied when a policy leaves it unset (or zero).
pub const DEFAULT_PAYLOAD_SIZE_THRESHOLD_KB: f64 = 1024.0;

/// Outcome of comparing one metric against its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    /// The metric could not be evaluated: no reading, or nothing to compare it against.
    Unknown,
}

impl Verdict {
    pub fn is_pass(self) -> bool {
        self == Verdict::Pass
    }

    pub fn is_fail(self) -> bool {
        self == Verdict::Fail
    }

    pub fn is_unknown(self) -> bool {
        self == Verdict::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Throughput,
    Memory,
    Cpu,
    Latency,
    PayloadSize,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Throughput,
        Metric::Memory,
        Metric::Cpu,
        Metric::Latency,
        Metric::PayloadSize,
    ];
}

/// One verdict per metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerdictSet {
    pub throughput: Verdict,
    pub memory: Verdict,
    pub cpu: Verdict,
    pub latency: Verdict,
    pub payload_size: Verdict,
}

impl VerdictSet {
    pub fn uniform(verdict: Verdict) -> Self {
        Self {
            throughput: verdict,
            memory: verdict,
            cpu: verdict,
            latency: verdict,
            payload_size: verdict,
        }
    }

    pub fn get(&self, metric: Metric) -> Verdict {
        match metric {
            Metric::Throughput => self.throughput,
            Metric::Memory => self.memory,
            Metric::Cpu => self.cpu,
            Metric::Latency => self.latency,
            Metric::PayloadSize => self.payload_size,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, Verdict)> + '_ {
        Metric::ALL.into_iter().map(|metric| (metric, self.get(metric)))
    }

    pub fn all(&self, verdict: Verdict) -> bool {
        self.iter().all(|(_, v)| v == verdict)
    }

    pub fn any(&self, verdict: Verdict) -> bool {
        self.iter().any(|(_, v)| v == verdict)
    }
}

/// Judge every metric of `sample` against `policy`.
///
/// A present reading whose limit or threshold is missing yields `Unknown` rather than an
/// implicit failure.
pub fn classify(sample: &MetricSample, policy: &ThresholdPolicy) -> VerdictSet {
    VerdictSet {
        throughput: below(
            sample.throughput,
            scaled(policy.throughput_threshold, sample.throughput_limit),
        ),
        memory: below(
            sample.memory,
            scaled(policy.memory_threshold, sample.memory_limit_bytes),
        ),
        cpu: below(sample.cpu, scaled(policy.cpu_threshold, Some(100.0))),
        latency: below(
            sample.latency_ms.map(|seconds| seconds * 1_000.0),
            policy.latency_threshold_ms,
        ),
        payload_size: below(
            sample.payload_size_bytes,
            Some(payload_threshold_kb(policy) * 1024.0),
        ),
    }
}

fn payload_threshold_kb(policy: &ThresholdPolicy) -> f64 {
    policy
        .payload_size_threshold_kb
        .filter(|kb| kb.is_finite() && *kb != 0.0)
        .unwrap_or(DEFAULT_PAYLOAD_SIZE_THRESHOLD_KB)
}

fn scaled(ratio: Option<f64>, limit: Option<f64>) -> Option<f64> {
    match (finite(ratio), finite(limit)) {
        (Some(ratio), Some(limit)) => Some(ratio * limit),
        _ => None,
    }
}

fn below(value: Option<f64>, bound: Option<f64>) -> Verdict {
    match (finite(value), finite(bound)) {
        (Some(value), Some(bound)) if value < bound => Verdict::Pass,
        (Some(_), Some(_)) => Verdict::Fail,
        _ => Verdict::Unknown,
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}
