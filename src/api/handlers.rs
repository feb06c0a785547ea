use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::request::Parts,
    Json,
};
use utoipa::OpenApi;

use super::{
    dto::{ApiRequest, Envelope, SampleRequest},
    errors::AppError,
    AppState,
};
use crate::{
    aggregator::HistoryPoint,
    db::models::{
        Alert, AlertSeverity, AlertType, AlertWithDevice, ControlAction, ControlRecord,
        DashboardStats, Device, DeviceStatus, DeviceType, DeviceWithReading, LatestReading,
        Sample, ToggleOutcome,
    },
    error::ServiceError,
    facade::RequestContext,
    ingest::IngestOutcome,
};

pub const USER_ID_HEADER: &str = "x-user-id";

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// Acting user from the `x-user-id` header. A missing header is an anonymous
/// caller; a header that is not a positive integer is rejected.
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(USER_ID_HEADER) else {
            return Ok(Self::default());
        };

        let user_id = raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<i32>().ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| ServiceError::invalid(format!("{USER_ID_HEADER} must be a positive integer")))?;

        Ok(Self { user_id: Some(user_id) })
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ServiceError::invalid(e.body_text()).into())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Run one named operation.
///
/// Actions: `dashboard_stats`, `list_devices`, `toggle_device`,
/// `deactivate_device`, `power_history`, `latest_readings`, `list_alerts`,
/// `mark_alert_read`, `mark_all_alerts_read`, `control_history`.
#[utoipa::path(
    post,
    path = "/api",
    request_body = ApiRequest,
    params(
        ("x-user-id" = Option<i32>, Header, description = "Acting user, recorded on control history"),
    ),
    responses(
        (status = 200, description = "Operation succeeded", body = Envelope),
        (status = 400, description = "Unknown action or invalid params", body = Envelope),
        (status = 404, description = "Referenced device or alert does not exist", body = Envelope),
        (status = 500, description = "Storage failure", body = Envelope),
    ),
    tag = "api"
)]
pub async fn dispatch(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<ApiRequest>, JsonRejection>,
) -> Result<Json<Envelope>, AppError> {
    let req = body(payload)?;
    let reply = state.facade.handle(&ctx, &req.action, req.params).await?;
    Ok(Json(reply.into()))
}

/// Append one measurement and evaluate alert rules against it.
#[utoipa::path(
    post,
    path = "/samples",
    request_body = SampleRequest,
    responses(
        (status = 200, description = "Sample stored; `data` is the sample and any alerts raised", body = Envelope),
        (status = 400, description = "Malformed sample", body = Envelope),
        (status = 404, description = "Device does not exist or is inactive", body = Envelope),
        (status = 500, description = "Storage failure", body = Envelope),
    ),
    tag = "samples"
)]
pub async fn ingest_sample(
    State(state): State<AppState>,
    payload: Result<Json<SampleRequest>, JsonRejection>,
) -> Result<Json<Envelope>, AppError> {
    let sample = body(payload)?;
    let outcome = state.ingest.ingest(sample.into()).await?;
    let message = match outcome.alerts.len() {
        0 => "Sample recorded".to_owned(),
        n => format!("Sample recorded, {n} alert(s) raised"),
    };

    Ok(Json(Envelope {
        success: true,
        message,
        data: serde_json::to_value(outcome).map_err(anyhow::Error::from)?,
    }))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI document
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(dispatch, ingest_sample, health),
    components(schemas(
        ApiRequest, Envelope, SampleRequest, IngestOutcome, HistoryPoint,
        DashboardStats, Device, DeviceWithReading, DeviceType, DeviceStatus,
        Sample, LatestReading, Alert, AlertWithDevice, AlertType, AlertSeverity,
        ControlRecord, ControlAction, ToggleOutcome,
    )),
    tags(
        (name = "api",     description = "Dashboard, device, history and alert operations"),
        (name = "samples", description = "Measurement ingestion"),
        (name = "system",  description = "System endpoints"),
    ),
    info(
        title = "Energy Monitor API",
        version = "0.1.0",
        description = "Per-device electrical monitoring: readings, history and alerts"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
