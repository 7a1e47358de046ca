use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{BackendConfig, BackendError, MetricsBackend};
use crate::model::{AutoscaleTarget, MetricsPayload, ResourceId, TimeRange};

const METRICS: &str = "/api/metrics";
const AUTOSCALE_ENABLED: &str = "/api/autoscale/enabled";
const AUTOSCALING_STATUS: &str = "/api/autoscaling-status";
const AUTOSCALE_ENABLE: &str = "/api/autoscale/enable";
const AUTOSCALE_DISABLE: &str = "/api/autoscale/disable";
const REFRESH_CLOUD: &str = "/api/refresh-cloud";
const CONFIG: &str = "/api/config";

/// Metrics API client over HTTP. No request timeout is set; the transport defaults apply.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|source| BackendError::Transport { endpoint, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }
        debug!(endpoint, status = status.as_u16(), "metrics API responded");
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        self.send(endpoint, request)
            .await?
            .json()
            .await
            .map_err(|source| BackendError::Decode { endpoint, source })
    }
}

#[async_trait]
impl MetricsBackend for HttpBackend {
    async fn fetch_metrics(&self, range: &TimeRange) -> Result<MetricsPayload, BackendError> {
        let request = self
            .client
            .get(self.url(METRICS))
            .query(&range.query_pairs());
        self.get_json(METRICS, request).await
    }

    async fn fetch_autoscale_enabled(
        &self,
    ) -> Result<Vec<(ResourceId, ResourceId)>, BackendError> {
        let request = self.client.get(self.url(AUTOSCALE_ENABLED));
        self.get_json(AUTOSCALE_ENABLED, request).await
    }

    async fn fetch_autoscaling_status(&self) -> Result<serde_json::Value, BackendError> {
        let request = self.client.get(self.url(AUTOSCALING_STATUS));
        self.get_json(AUTOSCALING_STATUS, request).await
    }

    async fn set_autoscale(
        &self,
        target: &AutoscaleTarget,
        enabled: bool,
    ) -> Result<(), BackendError> {
        let endpoint = if enabled {
            AUTOSCALE_ENABLE
        } else {
            AUTOSCALE_DISABLE
        };
        let request = self.client.post(self.url(endpoint)).json(target);
        self.send(endpoint, request).await.map(|_| ())
    }

    async fn refresh_cloud(&self) -> Result<(), BackendError> {
        let request = self.client.post(self.url(REFRESH_CLOUD));
        self.send(REFRESH_CLOUD, request).await.map(|_| ())
    }

    async fn fetch_config(&self) -> Result<BackendConfig, BackendError> {
        let request = self.client.get(self.url(CONFIG));
        self.get_json(CONFIG, request).await
    }
}
