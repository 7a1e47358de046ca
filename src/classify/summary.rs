use serde::Serialize;

use super::verdict::{Verdict, VerdictSet};

/// Classification label shown for one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCategory {
    NoData,
    ScaleUp,
    Healthy,
    Review,
    /// Not enough evaluated metrics to commit to a label.
    Indeterminate,
}

impl HealthCategory {
    pub const ALL: [HealthCategory; 5] = [
        HealthCategory::NoData,
        HealthCategory::ScaleUp,
        HealthCategory::Healthy,
        HealthCategory::Review,
        HealthCategory::Indeterminate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HealthCategory::NoData => "no_data",
            HealthCategory::ScaleUp => "scale_up",
            HealthCategory::Healthy => "healthy",
            HealthCategory::Review => "review",
            HealthCategory::Indeterminate => "indeterminate",
        }
    }
}

/// Reduce per-metric verdicts to a single category. Rules are applied in order and the
/// first match wins.
///
/// Throughput and memory are capacity limits: a concrete failure on either means scale up
/// no matter what the other metrics say. CPU, latency and payload size only ask for review.
pub fn summarize(verdicts: &VerdictSet) -> HealthCategory {
    let capacity = [verdicts.throughput, verdicts.memory];

    if capacity.iter().all(|v| v.is_unknown()) {
        return HealthCategory::NoData;
    }
    if capacity.iter().any(|v| v.is_fail()) {
        return HealthCategory::ScaleUp;
    }
    if verdicts.all(Verdict::Unknown) {
        return HealthCategory::NoData;
    }
    if verdicts.any(Verdict::Unknown) {
        return HealthCategory::Indeterminate;
    }
    if verdicts.all(Verdict::Pass) {
        return HealthCategory::Healthy;
    }
    if verdicts.all(Verdict::Fail) {
        return HealthCategory::ScaleUp;
    }

    let soft = [verdicts.cpu, verdicts.latency, verdicts.payload_size];
    if capacity.iter().all(|v| v.is_pass()) && soft.iter().any(|v| v.is_fail()) {
        return HealthCategory::Review;
    }

    HealthCategory::Indeterminate
}
