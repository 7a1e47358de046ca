//! Health classification engine.
//!
//! Resolves the effective thresholds for each database, judges every metric, reduces the
//! verdicts to a [`HealthCategory`] and folds the fleet into a [`FleetSummary`]. Everything
//! here is synchronous and pure; the refresh loop feeds it and publishes the result.

mod aggregate;
mod summary;
mod thresholds;
mod verdict;

pub use aggregate::{FleetSummary, aggregate};
pub use summary::{HealthCategory, summarize};
pub use thresholds::ThresholdResolver;
pub use verdict::{DEFAULT_PAYLOAD_SIZE_THRESHOLD_KB, Metric, Verdict, VerdictSet, classify};

use serde::Serialize;

use crate::config::ScalingConfig;
use crate::model::{AutoscaleRegistry, DatabaseRecord, ThresholdPolicy};
use crate::recommendations::{ScaleRecommendation, plan_scale_up};

/// One classified database, as handed to consumers of the fleet view.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHealth {
    #[serde(flatten)]
    pub record: DatabaseRecord,
    pub effective_thresholds: ThresholdPolicy,
    pub verdicts: VerdictSet,
    pub category: HealthCategory,
    pub autoscale_enabled: bool,
    pub recommendation: Option<ScaleRecommendation>,
}

#[derive(Debug, Clone, Default)]
pub struct FleetAssessment {
    pub databases: Vec<DatabaseHealth>,
    pub summary: FleetSummary,
}

impl FleetAssessment {
    pub fn category_counts(&self) -> Vec<(HealthCategory, usize)> {
        HealthCategory::ALL
            .into_iter()
            .map(|category| {
                let count = self
                    .databases
                    .iter()
                    .filter(|db| db.category == category)
                    .count();
                (category, count)
            })
            .collect()
    }
}

/// Classify every database in a fetch and compute the fleet totals.
pub fn assess(
    records: Vec<DatabaseRecord>,
    resolver: &ThresholdResolver<'_>,
    registry: &AutoscaleRegistry,
    scaling: &ScalingConfig,
) -> FleetAssessment {
    let summary = aggregate(&records, resolver, registry);

    let databases = records
        .into_iter()
        .map(|record| {
            let effective_thresholds = resolver.resolve(&record);
            let verdicts = classify(&record.metrics, &effective_thresholds);
            let category = summarize(&verdicts);
            let autoscale_enabled =
                registry.is_enabled(&record.subscription_id, &record.database_id);
            let recommendation = plan_scale_up(&record, &effective_thresholds, scaling);
            DatabaseHealth {
                record,
                effective_thresholds,
                verdicts,
                category,
                autoscale_enabled,
                recommendation,
            }
        })
        .collect();

    FleetAssessment { databases, summary }
}
