//! Client side of the metrics API.
//!
//! [`MetricsBackend`] is the seam the refresh loop and the HTTP layer talk through;
//! [`HttpBackend`] is the production implementation over `reqwest`.

mod error;
mod http;

pub use error::BackendError;
pub use http::HttpBackend;

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{AutoscaleTarget, MetricsPayload, ResourceId, TimeRange};

/// Dashboard settings advertised by `GET /api/config`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub prometheus_query_interval_seconds: Option<f64>,
}

#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// `GET /api/metrics` for the given window.
    async fn fetch_metrics(&self, range: &TimeRange) -> Result<MetricsPayload, BackendError>;

    /// `GET /api/autoscale/enabled` as (subscription, database) pairs.
    async fn fetch_autoscale_enabled(&self)
    -> Result<Vec<(ResourceId, ResourceId)>, BackendError>;

    /// `GET /api/autoscaling-status`, passed through uninterpreted.
    async fn fetch_autoscaling_status(&self) -> Result<serde_json::Value, BackendError>;

    /// `POST /api/autoscale/enable` or `/disable`.
    async fn set_autoscale(
        &self,
        target: &AutoscaleTarget,
        enabled: bool,
    ) -> Result<(), BackendError>;

    /// `POST /api/refresh-cloud`.
    async fn refresh_cloud(&self) -> Result<(), BackendError>;

    /// `GET /api/config`.
    async fn fetch_config(&self) -> Result<BackendConfig, BackendError>;
}
