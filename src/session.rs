use std::sync::Arc;

use tokio::sync::RwLock;

use crate::model::{AutoscaleRegistry, AutoscaleTarget, ThresholdPolicy, TimeRange};

#[derive(Default)]
struct RegistryState {
    registry: AutoscaleRegistry,
    /// Bumped by every operator toggle.
    revision: u64,
    /// Toggles a registry fetch may predate, tagged with the revision they produced.
    journal: Vec<(u64, AutoscaleTarget, bool)>,
}

impl RegistryState {
    fn replay_since(&self, registry: &mut AutoscaleRegistry, revision: u64) {
        for (_, target, enabled) in self.journal.iter().filter(|(rev, ..)| *rev > revision) {
            registry.set(target, *enabled);
        }
    }
}

#[derive(Default)]
struct SessionInner {
    override_policy: RwLock<Option<ThresholdPolicy>>,
    registry: RwLock<RegistryState>,
    time_range: RwLock<TimeRange>,
}

/// Operator-controlled state: the global threshold override, the selected time window and the
/// cached autoscale registry. Shared by the refresh loop and the HTTP handlers.
#[derive(Clone, Default)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(time_range: TimeRange) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                time_range: RwLock::new(time_range),
                ..SessionInner::default()
            }),
        }
    }

    /// Install a global override. Returns `false` when it matches the active one.
    pub async fn apply_override(&self, policy: ThresholdPolicy) -> bool {
        let mut guard = self.inner.override_policy.write().await;
        if guard.as_ref() == Some(&policy) {
            return false;
        }
        *guard = Some(policy);
        true
    }

    /// Drop the override. Returns `false` when none was active.
    pub async fn reset_override(&self) -> bool {
        self.inner.override_policy.write().await.take().is_some()
    }

    pub async fn override_policy(&self) -> Option<ThresholdPolicy> {
        self.inner.override_policy.read().await.clone()
    }

    pub async fn set_time_range(&self, range: TimeRange) {
        *self.inner.time_range.write().await = range;
    }

    pub async fn time_range(&self) -> TimeRange {
        self.inner.time_range.read().await.clone()
    }

    pub async fn registry_revision(&self) -> u64 {
        self.inner.registry.read().await.revision
    }

    /// Apply operator toggles newer than `revision` on top of a fetched registry.
    pub async fn with_toggles_since(
        &self,
        mut registry: AutoscaleRegistry,
        revision: u64,
    ) -> AutoscaleRegistry {
        self.inner
            .registry
            .read()
            .await
            .replay_since(&mut registry, revision);
        registry
    }

    /// Install a registry fetched from the metrics API while `revision` was current. Toggles
    /// made since then are replayed onto it.
    pub async fn replace_registry(&self, mut registry: AutoscaleRegistry, revision: u64) {
        let mut guard = self.inner.registry.write().await;
        guard.replay_since(&mut registry, revision);
        guard.journal.retain(|(rev, ..)| *rev > revision);
        guard.registry = registry;
    }

    pub async fn set_autoscale(&self, target: &AutoscaleTarget, enabled: bool) {
        let mut guard = self.inner.registry.write().await;
        guard.registry.set(target, enabled);
        guard.revision += 1;
        let revision = guard.revision;
        guard.journal.push((revision, target.clone(), enabled));
    }

    pub async fn registry(&self) -> AutoscaleRegistry {
        self.inner.registry.read().await.registry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(cpu: f64) -> ThresholdPolicy {
        ThresholdPolicy {
            cpu_threshold: Some(cpu),
            ..ThresholdPolicy::default()
        }
    }

    #[tokio::test]
    async fn override_reports_changes() {
        let session = Session::default();
        assert!(!session.reset_override().await);
        assert!(session.apply_override(policy(0.6)).await);
        assert!(!session.apply_override(policy(0.6)).await);
        assert!(session.apply_override(policy(0.7)).await);
        assert_eq!(session.override_policy().await, Some(policy(0.7)));
        assert!(session.reset_override().await);
        assert!(session.override_policy().await.is_none());
    }

    #[tokio::test]
    async fn autoscale_toggle_updates_registry() {
        let session = Session::default();
        let fetched = AutoscaleRegistry::from_pairs(vec![("1".into(), "10".into())]);
        session.replace_registry(fetched, 0).await;

        let other = AutoscaleTarget {
            subscription_id: "1".into(),
            database_id: "11".into(),
        };
        let enabled = |registry: AutoscaleRegistry| {
            registry.is_enabled(&other.subscription_id, &other.database_id)
        };
        assert!(!enabled(session.registry().await));
        session.set_autoscale(&other, true).await;
        assert!(enabled(session.registry().await));
        assert_eq!(session.registry().await.len(), 2);

        session.set_autoscale(&other, false).await;
        assert_eq!(session.registry().await.len(), 1);
    }

    #[tokio::test]
    async fn toggles_survive_a_registry_fetched_before_them() {
        let session = Session::default();
        let revision = session.registry_revision().await;

        let target = AutoscaleTarget {
            subscription_id: "1".into(),
            database_id: "11".into(),
        };
        session.set_autoscale(&target, true).await;
        assert_eq!(session.registry_revision().await, revision + 1);

        let fetched = AutoscaleRegistry::from_pairs(vec![("1".into(), "10".into())]);
        let merged = session.with_toggles_since(fetched.clone(), revision).await;
        assert_eq!(merged.len(), 2);

        session.replace_registry(fetched, revision).await;
        let registry = session.registry().await;
        assert!(registry.is_enabled(&"1".into(), &"10".into()));
        assert!(registry.is_enabled(&"1".into(), &"11".into()));

        // A fetch taken after the toggle is authoritative.
        let current = session.registry_revision().await;
        session
            .replace_registry(AutoscaleRegistry::default(), current)
            .await;
        assert!(session.registry().await.is_empty());
    }

    #[tokio::test]
    async fn time_range_starts_from_configured_period() {
        let session = Session::new(TimeRange::relative("1h"));
        assert_eq!(session.time_range().await, TimeRange::relative("1h"));
        let absolute = TimeRange::Absolute {
            from: "2024-05-01T00:00".into(),
            to: "2024-05-02T00:00".into(),
        };
        session.set_time_range(absolute.clone()).await;
        assert_eq!(session.time_range().await, absolute);
    }
}
