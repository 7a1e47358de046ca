use std::sync::Arc;
use std::time::Duration;

use crate::backend::MetricsBackend;
use crate::config::AppConfig;
use crate::metrics::AppMetrics;
use crate::model::TimeRange;
use crate::poller::RefreshCoordinator;
use crate::session::Session;
use crate::state::SharedState;

/// Shared application context passed to HTTP handlers and the refresh loop.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub backend: Arc<dyn MetricsBackend>,
    pub metrics: AppMetrics,
    pub state: SharedState,
    pub session: Session,
    pub refresh: Arc<RefreshCoordinator>,
    /// Refresh cadence, fixed for the lifetime of the process.
    pub poll_interval: Duration,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn MetricsBackend>,
        metrics: AppMetrics,
        state: SharedState,
        poll_interval: Duration,
    ) -> Self {
        let session = Session::new(TimeRange::relative(config.polling.default_period.clone()));
        let refresh = Arc::new(RefreshCoordinator::new(
            backend.clone(),
            session.clone(),
            state.clone(),
            metrics.clone(),
            config.scaling.clone(),
        ));

        Self {
            config: Arc::new(config),
            backend,
            metrics,
            state,
            session,
            refresh,
            poll_interval,
        }
    }
}
