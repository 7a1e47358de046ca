mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use scalewatch::config::ScalingConfig;
use scalewatch::metrics::AppMetrics;
use scalewatch::model::{AutoscaleTarget, ThresholdPolicy};
use scalewatch::poller::{
    PollOutcome, REFRESH_LOOP, RefreshCoordinator, resolve_interval, spawn_refresh_loop,
};
use scalewatch::session::Session;
use scalewatch::state::{FleetView, SharedState};
use support::{FakeBackend, fleet_payload};
use tokio::sync::watch;

fn coordinator(
    backend: Arc<FakeBackend>,
    session: Session,
    state: SharedState,
) -> Arc<RefreshCoordinator> {
    Arc::new(RefreshCoordinator::new(
        backend,
        session,
        state,
        AppMetrics::new().expect("metrics"),
        ScalingConfig::default(),
    ))
}

#[tokio::test]
async fn poll_publishes_classified_fleet() {
    let backend = Arc::new(FakeBackend::new(fleet_payload()));
    let state = SharedState::new();
    let session = Session::default();
    let refresh = coordinator(backend, session.clone(), state.clone());

    let outcome = refresh.poll().await.expect("poll");
    assert_eq!(
        outcome,
        PollOutcome::Completed {
            generation: 1,
            databases: 3
        }
    );

    let view = state.fleet_view().await;
    assert_eq!(view.generation, 1);
    assert_eq!(view.summary.total, 3);
    assert_eq!(view.summary.autoscale_enabled, 1);
    assert!(!view.override_active);
    assert_eq!(view.autoscaling_status["1:102"]["state"], "idle");
    assert_eq!(session.registry().await.len(), 1);
}

#[tokio::test]
async fn poll_while_in_flight_is_skipped() {
    let backend = Arc::new(FakeBackend::gated(fleet_payload()));
    let refresh = coordinator(backend.clone(), Session::default(), SharedState::new());

    let first = tokio::spawn({
        let refresh = refresh.clone();
        async move { refresh.poll().await }
    });

    backend.entered.notified().await;
    assert!(refresh.is_busy());
    assert_eq!(refresh.poll().await.expect("poll"), PollOutcome::Skipped);
    assert_eq!(backend.metrics_calls(), 1);

    backend.release.notify_one();
    let outcome = first.await.expect("join").expect("poll");
    assert!(matches!(outcome, PollOutcome::Completed { .. }));
    assert!(!refresh.is_busy());
}

#[tokio::test]
async fn failure_clears_busy_flag_and_keeps_last_view() {
    let backend = Arc::new(FakeBackend::new(fleet_payload()));
    let state = SharedState::new();
    let refresh = coordinator(backend.clone(), Session::default(), state.clone());

    refresh.poll().await.expect("first poll");

    backend.set_failing(true);
    let err = refresh.poll().await.expect_err("metrics unavailable");
    assert_eq!(err.endpoint(), "/api/metrics");
    assert!(!refresh.is_busy());

    let view = state.fleet_view().await;
    assert_eq!(view.generation, 1);
    assert_eq!(view.summary.total, 3);

    let health = state.loop_health(REFRESH_LOOP).await.expect("health");
    assert_eq!(health.consecutive_failures, 1);
    assert!(health.last_error.is_some());

    backend.set_failing(false);
    let outcome = refresh.poll().await.expect("recovered");
    assert!(matches!(outcome, PollOutcome::Completed { generation: 3, .. }));
    let health = state.loop_health(REFRESH_LOOP).await.expect("health");
    assert_eq!(health.consecutive_failures, 0);
}

#[tokio::test]
async fn superseded_poll_leaves_view_and_registry_alone() {
    let backend = Arc::new(FakeBackend::new(fleet_payload()));
    let state = SharedState::new();
    let session = Session::default();
    let refresh = coordinator(backend, session.clone(), state.clone());

    // A newer view is already live when this coordinator's first generation lands.
    assert!(
        state
            .publish(FleetView {
                generated_at: Some(Utc::now()),
                generation: 5,
                ..FleetView::default()
            })
            .await
    );

    let outcome = refresh.poll().await.expect("poll");
    assert!(matches!(outcome, PollOutcome::Completed { generation: 1, .. }));

    let view = state.fleet_view().await;
    assert_eq!(view.generation, 5);
    assert_eq!(view.summary.total, 0);
    assert!(session.registry().await.is_empty());
}

#[tokio::test]
async fn toggle_during_refresh_is_not_reverted() {
    let backend = Arc::new(FakeBackend::gated(fleet_payload()));
    let state = SharedState::new();
    let session = Session::default();
    let refresh = coordinator(backend.clone(), session.clone(), state.clone());

    let polling = tokio::spawn({
        let refresh = refresh.clone();
        async move { refresh.poll().await }
    });

    // The registry has been fetched by the time metrics are requested.
    backend.entered.notified().await;
    let target = AutoscaleTarget {
        subscription_id: "2".into(),
        database_id: "103".into(),
    };
    session.set_autoscale(&target, true).await;

    backend.release.notify_one();
    polling.await.expect("join").expect("poll");

    let registry = session.registry().await;
    assert!(registry.is_enabled(&"1".into(), &"102".into()));
    assert!(registry.is_enabled(&"2".into(), &"103".into()));
    assert_eq!(state.fleet_view().await.summary.autoscale_enabled, 2);
}

#[tokio::test]
async fn override_applies_to_next_poll() {
    let backend = Arc::new(FakeBackend::new(fleet_payload()));
    let state = SharedState::new();
    let session = Session::default();
    let refresh = coordinator(backend, session.clone(), state.clone());

    // Only CPU is judged; capacity metrics lose their thresholds and become unknown.
    session
        .apply_override(ThresholdPolicy {
            cpu_threshold: Some(0.6),
            ..ThresholdPolicy::default()
        })
        .await;
    refresh.poll().await.expect("poll");

    let view = state.fleet_view().await;
    assert!(view.override_active);
    assert_eq!(view.summary.healthy, 0);
    assert_eq!(view.summary.attention, 0);
    assert!(
        view.databases
            .iter()
            .all(|db| db.effective_thresholds.throughput_threshold.is_none())
    );
}

#[tokio::test]
async fn interval_comes_from_backend_config() {
    let backend = FakeBackend::new(fleet_payload());
    let interval = resolve_interval(&backend, Duration::from_secs(30)).await;
    assert_eq!(interval, Duration::from_secs(15));
}

#[tokio::test]
async fn unusable_advertised_interval_falls_back() {
    let fallback = Duration::from_secs(30);
    for seconds in [Some(1e-12), Some(1e20), Some(-5.0), Some(0.0), Some(f64::NAN), None] {
        let backend = FakeBackend::with_query_interval(fleet_payload(), seconds);
        let interval = resolve_interval(&backend, fallback).await;
        assert_eq!(interval, fallback, "advertised {seconds:?}");
    }

    let backend = FakeBackend::with_query_interval(fleet_payload(), Some(2.5));
    let interval = resolve_interval(&backend, fallback).await;
    assert_eq!(interval, Duration::from_millis(2500));
}

#[tokio::test]
async fn refresh_loop_polls_at_startup_and_stops_on_shutdown() {
    let backend = Arc::new(FakeBackend::new(fleet_payload()));
    let state = SharedState::new();
    let refresh = coordinator(backend.clone(), Session::default(), state.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_refresh_loop(refresh, Duration::from_secs(3600), shutdown_rx);

    let published = tokio::time::timeout(Duration::from_secs(5), async {
        while state.fleet_view().await.generation == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(published.is_ok(), "first tick should poll immediately");
    assert_eq!(backend.metrics_calls(), 1);

    shutdown_tx.send(true).expect("send");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stopped")
        .expect("join");
}
