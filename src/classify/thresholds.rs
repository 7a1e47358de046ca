use crate::model::{DatabaseRecord, ThresholdPolicy};

/// Picks the effective threshold policy for a database.
///
/// An operator override replaces the database's own policy wholesale. Fields the override
/// leaves unset stay unset in the result; they are never back-filled from the defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdResolver<'a> {
    override_policy: Option<&'a ThresholdPolicy>,
}

impl<'a> ThresholdResolver<'a> {
    pub fn new(override_policy: Option<&'a ThresholdPolicy>) -> Self {
        Self { override_policy }
    }

    pub fn override_active(&self) -> bool {
        self.override_policy.is_some()
    }

    pub fn resolve(&self, database: &DatabaseRecord) -> ThresholdPolicy {
        match self.override_policy {
            Some(policy) => policy.clone(),
            None => database.thresholds.clone(),
        }
    }
}
