use serde::Serialize;

use super::thresholds::ThresholdResolver;
use super::verdict::{VerdictSet, classify};
use crate::model::{AutoscaleRegistry, DatabaseRecord};

/// Fleet-wide headline counts.
///
/// `healthy` and `attention` are not complementary: a database with unknown capacity metrics
/// and no concrete failure counts towards neither.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    pub total: usize,
    pub healthy: usize,
    pub attention: usize,
    pub autoscale_enabled: usize,
}

impl FleetSummary {
    /// Fold one database into the counts.
    ///
    /// Deliberately independent of the health category: payload size is ignored here, and a
    /// concrete failure on any of the other four metrics needs attention.
    pub fn record(&mut self, verdicts: &VerdictSet, autoscale_enabled: bool) {
        self.total += 1;
        if autoscale_enabled {
            self.autoscale_enabled += 1;
        }

        let watched = [
            verdicts.throughput,
            verdicts.memory,
            verdicts.cpu,
            verdicts.latency,
        ];
        if watched.iter().any(|v| v.is_fail()) {
            self.attention += 1;
        } else if !verdicts.throughput.is_unknown() && !verdicts.memory.is_unknown() {
            self.healthy += 1;
        }
    }
}

pub fn aggregate(
    databases: &[DatabaseRecord],
    resolver: &ThresholdResolver<'_>,
    registry: &AutoscaleRegistry,
) -> FleetSummary {
    let mut summary = FleetSummary::default();
    for database in databases {
        let verdicts = classify(&database.metrics, &resolver.resolve(database));
        let enabled = registry.is_enabled(&database.subscription_id, &database.database_id);
        summary.record(&verdicts, enabled);
    }
    summary
}
