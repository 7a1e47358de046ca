use serde::Serialize;

use crate::config::ScalingConfig;
use crate::model::{DatabaseRecord, MaxScaling, MetricSample, ThresholdPolicy};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Which capacity dimensions are over threshold and still below their scaling ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScalingNeeds {
    pub memory: bool,
    pub throughput: bool,
}

impl ScalingNeeds {
    pub fn any(&self) -> bool {
        self.memory || self.throughput
    }
}

/// Recommended scale-up for one database. Only the dimensions that need scaling carry a
/// target value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleRecommendation {
    pub needs: ScalingNeeds,
    /// New dataset size in GB, already halved for replicated databases.
    pub dataset_size_gb: Option<f64>,
    /// New throughput limit in operations per second.
    pub throughput_ops: Option<u64>,
}

/// Check whether memory or throughput usage has crossed its threshold while the database is
/// still below the scaling ceiling.
pub fn scaling_needs(
    sample: &MetricSample,
    policy: &ThresholdPolicy,
    max: &MaxScaling,
) -> ScalingNeeds {
    let throughput = match (
        sample.throughput,
        sample.throughput_limit,
        policy.throughput_threshold,
    ) {
        (Some(used), Some(limit), Some(ratio)) if limit > 0.0 => {
            used >= ratio * limit && limit < max.throughput_ops
        }
        _ => false,
    };

    let memory = match (
        sample.memory,
        sample.memory_limit_bytes,
        policy.memory_threshold,
    ) {
        (Some(used), Some(limit), Some(ratio)) if limit > 0.0 => {
            used >= ratio * limit && limit / BYTES_PER_GB < max.memory_gb
        }
        _ => false,
    };

    ScalingNeeds { memory, throughput }
}

/// Build a scale-up recommendation, or `None` when the database has no scaling ceiling or
/// nothing needs scaling.
pub fn plan_scale_up(
    record: &DatabaseRecord,
    policy: &ThresholdPolicy,
    scaling: &ScalingConfig,
) -> Option<ScaleRecommendation> {
    let max = record.max_scaling.as_ref()?;
    let needs = scaling_needs(&record.metrics, policy, max);
    if !needs.any() {
        return None;
    }

    let dataset_size_gb = needs
        .memory
        .then(|| {
            record.metrics.memory_limit_bytes.map(|limit| {
                next_dataset_size_gb(
                    limit / BYTES_PER_GB,
                    max.memory_gb,
                    scaling.memory_scaling_percentage,
                    record.replication.unwrap_or(false),
                )
            })
        })
        .flatten();

    let throughput_ops = needs
        .throughput
        .then(|| {
            record.metrics.throughput_limit.map(|limit| {
                next_throughput_ops(
                    record.metrics.throughput.unwrap_or(0.0),
                    limit,
                    max.throughput_ops,
                    scaling.throughput_scaling_percentage,
                )
            })
        })
        .flatten();

    Some(ScaleRecommendation {
        needs,
        dataset_size_gb,
        throughput_ops,
    })
}

/// Grow total memory by `percentage`, capped at `max_gb`, in 100MB steps. Replicated databases
/// split the total across two copies.
fn next_dataset_size_gb(current_gb: f64, max_gb: f64, percentage: f64, replicated: bool) -> f64 {
    let grown = current_gb * (1.0 + percentage / 100.0);
    let total_gb = round_tenth(grown.min(max_gb)).max(0.1);
    let dataset_gb = if replicated { total_gb / 2.0 } else { total_gb };
    round_tenth(dataset_gb).max(0.1)
}

/// Grow throughput by `percentage` of whichever is higher, current usage or the configured
/// limit, capped at `max_ops` and rounded to the nearest 100 ops.
fn next_throughput_ops(used: f64, limit: f64, max_ops: f64, percentage: f64) -> u64 {
    let factor = 1.0 + percentage / 100.0;
    let usage_based = (used * factor).trunc();
    let config_based = (limit * factor).trunc();
    let capped = usage_based.max(config_based).min(max_ops);
    ((capped / 100.0).round() * 100.0).max(0.0) as u64
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
