use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, get_service, post, put};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::app::AppContext;
use crate::backend::BackendError;
use crate::classify::FleetSummary;
use crate::model::{AutoscaleTarget, ThresholdPolicy, TimeRange};
use crate::poller::{PollOutcome, REFRESH_LOOP};
use crate::state::FleetView;

/// A refresh is considered stale after this many missed intervals.
const STALE_INTERVALS: u32 = 3;

pub fn create_router(ctx: AppContext) -> Router {
    let static_dir = ctx.config.http.static_dir.clone();

    let asset_service = get_service(ServeDir::new(static_dir));

    let api = Router::new()
        .route("/fleet", get(get_fleet))
        .route("/summary", get(get_summary))
        .route(
            "/thresholds",
            get(get_thresholds)
                .put(put_thresholds)
                .delete(delete_thresholds),
        )
        .route("/time-range", put(put_time_range))
        .route("/refresh", post(post_refresh))
        .route("/refresh-cloud", post(post_refresh_cloud))
        .route("/autoscale/enable", post(post_autoscale_enable))
        .route("/autoscale/disable", post(post_autoscale_disable))
        .route("/autoscaling-status", get(get_autoscaling_status));

    Router::new()
        .route("/healthz", get(get_healthz))
        .route("/metrics", get(get_metrics))
        .nest("/api/v1", api)
        .fallback_service(asset_service)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (StatusCode::BAD_GATEWAY, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct FleetResponse {
    #[serde(flatten)]
    view: FleetView,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    last_success_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Serialize)]
struct ThresholdsResponse {
    override_active: bool,
    #[serde(rename = "override")]
    override_policy: Option<ThresholdPolicy>,
}

#[derive(Serialize)]
struct ChangedResponse {
    changed: bool,
}

#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum RefreshResponse {
    Completed { generation: u64, databases: usize },
    Skipped,
}

impl From<PollOutcome> for RefreshResponse {
    fn from(outcome: PollOutcome) -> Self {
        match outcome {
            PollOutcome::Completed {
                generation,
                databases,
            } => RefreshResponse::Completed {
                generation,
                databases,
            },
            PollOutcome::Skipped => RefreshResponse::Skipped,
        }
    }
}

#[derive(Serialize)]
struct AutoscaleResponse {
    #[serde(flatten)]
    target: AutoscaleTarget,
    enabled: bool,
}

async fn get_healthz(State(ctx): State<AppContext>) -> StatusCode {
    let is_ready = ctx
        .state
        .is_ready(&[REFRESH_LOOP], ctx.poll_interval.saturating_mul(STALE_INTERVALS))
        .await;

    if is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn get_metrics(State(ctx): State<AppContext>) -> Response {
    match ctx.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            warn!(error = ?err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn get_fleet(State(ctx): State<AppContext>) -> Json<FleetResponse> {
    let view = ctx.state.fleet_view().await;
    let health = ctx.state.loop_health(REFRESH_LOOP).await;
    Json(FleetResponse {
        view,
        last_success_at: health.as_ref().and_then(|h| h.last_success_at),
        last_error: health.and_then(|h| h.last_error),
    })
}

async fn get_summary(State(ctx): State<AppContext>) -> Json<FleetSummary> {
    Json(ctx.state.summary().await)
}

async fn get_thresholds(State(ctx): State<AppContext>) -> Json<ThresholdsResponse> {
    let override_policy = ctx.session.override_policy().await;
    Json(ThresholdsResponse {
        override_active: override_policy.is_some(),
        override_policy,
    })
}

async fn put_thresholds(
    State(ctx): State<AppContext>,
    Json(policy): Json<ThresholdPolicy>,
) -> Json<ChangedResponse> {
    let changed = ctx.session.apply_override(policy).await;
    if changed {
        info!("global threshold override applied");
        refresh_in_place(&ctx).await;
    }
    Json(ChangedResponse { changed })
}

async fn delete_thresholds(State(ctx): State<AppContext>) -> Json<ChangedResponse> {
    let changed = ctx.session.reset_override().await;
    if changed {
        info!("global threshold override cleared");
        refresh_in_place(&ctx).await;
    }
    Json(ChangedResponse { changed })
}

async fn put_time_range(
    State(ctx): State<AppContext>,
    Json(range): Json<TimeRange>,
) -> StatusCode {
    ctx.session.set_time_range(range).await;
    refresh_in_place(&ctx).await;
    StatusCode::NO_CONTENT
}

async fn post_refresh(
    State(ctx): State<AppContext>,
) -> Result<Json<RefreshResponse>, BackendError> {
    let outcome = ctx.refresh.poll().await?;
    Ok(Json(outcome.into()))
}

async fn post_refresh_cloud(
    State(ctx): State<AppContext>,
) -> Result<Json<RefreshResponse>, BackendError> {
    ctx.backend.refresh_cloud().await?;
    info!("cloud inventory refresh requested");
    let outcome = ctx.refresh.poll().await?;
    Ok(Json(outcome.into()))
}

async fn post_autoscale_enable(
    State(ctx): State<AppContext>,
    Json(target): Json<AutoscaleTarget>,
) -> Result<Json<AutoscaleResponse>, BackendError> {
    toggle_autoscale(&ctx, target, true).await
}

async fn post_autoscale_disable(
    State(ctx): State<AppContext>,
    Json(target): Json<AutoscaleTarget>,
) -> Result<Json<AutoscaleResponse>, BackendError> {
    toggle_autoscale(&ctx, target, false).await
}

async fn get_autoscaling_status(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(ctx.state.autoscaling_status().await)
}

async fn toggle_autoscale(
    ctx: &AppContext,
    target: AutoscaleTarget,
    enabled: bool,
) -> Result<Json<AutoscaleResponse>, BackendError> {
    ctx.backend.set_autoscale(&target, enabled).await?;
    ctx.session.set_autoscale(&target, enabled).await;
    info!(
        subscription_id = %target.subscription_id,
        database_id = %target.database_id,
        enabled,
        "autoscale toggled"
    );
    refresh_in_place(ctx).await;
    Ok(Json(AutoscaleResponse { target, enabled }))
}

/// Re-run the refresh after an operator change. Failures are recorded by the coordinator and
/// do not fail the request that caused them.
async fn refresh_in_place(ctx: &AppContext) {
    if let Ok(PollOutcome::Skipped) = ctx.refresh.poll().await {
        info!("refresh in flight; change applies on the next poll");
    }
}
