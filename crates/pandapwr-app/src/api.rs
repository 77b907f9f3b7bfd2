//! HTTP surface through which a host reads entities and drives the devices.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use field_mapper::{ChannelKind, DeviceClass, EntityCategory, Unit};
use poller_actor::{DeviceChannels, DeviceSnapshot};
use types::{DeviceInfo, SwitchState};

use crate::config::{validate_ip_address, DeviceEntry};
use crate::flow::{validate_input, ENTRY_TITLE};
use crate::registry::{ChannelRegistry, SetupError};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ChannelRegistry>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/devices", get(list_devices))
        .route("/devices/refresh", post(refresh_all))
        .route("/devices/:entry_id/entities", get(list_entities))
        .route("/devices/:entry_id/refresh", post(refresh_device))
        .route("/devices/:entry_id/switches/:key/:action", post(set_switch))
        .route("/entries", post(create_entry))
        .route("/entries/:entry_id", delete(remove_entry))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Setup(SetupError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(what) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": format!("{what} not found") })))
                    .into_response()
            }
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::Setup(err) => {
                let status = match err {
                    SetupError::CannotConnect { .. } => StatusCode::BAD_REQUEST,
                    SetupError::AlreadyConfigured(_) => StatusCode::CONFLICT,
                    SetupError::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let body = json!({
                    "errors": { "base": err.code() },
                    "message": err.to_string(),
                });
                (status, Json(body)).into_response()
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct DeviceView {
    entry_id: String,
    title: &'static str,
    ip_address: String,
    device: DeviceInfo,
    available: bool,
    polled_at_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct EntityView {
    unique_id: String,
    platform: &'static str,
    name: &'static str,
    state: Value,
    available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<Unit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<DeviceClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity_category: Option<EntityCategory>,
}

fn device_view(entry: &DeviceEntry, snapshot: &DeviceSnapshot) -> DeviceView {
    DeviceView {
        entry_id: entry.entry_id.clone(),
        title: ENTRY_TITLE,
        ip_address: entry.ip_address.clone(),
        device: DeviceInfo::for_endpoint(&entry.endpoint()),
        available: snapshot.available,
        polled_at_ms: snapshot.polled_at_ms,
    }
}

fn entity_views(device_id: &str, snapshot: &DeviceSnapshot) -> Vec<EntityView> {
    let channels = snapshot.channels.iter().map(|value| EntityView {
        unique_id: format!("{device_id}_{}", value.spec.key),
        platform: match value.spec.kind {
            ChannelKind::Binary => "binary_sensor",
            ChannelKind::Passthrough | ChannelKind::Measurement => "sensor",
        },
        name: value.spec.name,
        state: value.state.to_json(),
        available: value.available,
        unit_of_measurement: value.spec.unit,
        device_class: value.spec.device_class,
        entity_category: value.spec.category,
    });
    let switches = snapshot.switches.iter().map(|value| EntityView {
        unique_id: format!("{device_id}_{}", value.spec.key),
        platform: "switch",
        name: value.spec.name,
        state: value.is_on.map(Value::Bool).unwrap_or(Value::Null),
        available: value.available,
        unit_of_measurement: None,
        device_class: None,
        entity_category: Some(value.spec.category),
    });
    channels.chain(switches).collect()
}

async fn lookup(state: &AppState, entry_id: &str) -> Result<DeviceChannels, ApiError> {
    state
        .registry
        .device(entry_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("device {entry_id}")))
}

async fn list_devices(State(state): State<AppState>) -> Json<Vec<DeviceView>> {
    let devices = state
        .registry
        .entries()
        .await
        .iter()
        .map(|(entry, channels)| device_view(entry, &channels.snapshot()))
        .collect();
    Json(devices)
}

async fn list_entities(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<Json<Vec<EntityView>>, ApiError> {
    let channels = lookup(&state, &entry_id).await?;
    let device_id = channels.endpoint().device_id();
    Ok(Json(entity_views(&device_id, &channels.snapshot())))
}

async fn refresh_all(State(state): State<AppState>) -> StatusCode {
    state.registry.refresh_all().await;
    StatusCode::ACCEPTED
}

async fn refresh_device(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    lookup(&state, &entry_id).await?.request_refresh();
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Serialize)]
struct CommandResult {
    accepted: bool,
    is_on: bool,
}

async fn set_switch(
    State(state): State<AppState>,
    Path((entry_id, key, action)): Path<(String, String, String)>,
) -> Result<Json<CommandResult>, ApiError> {
    let spec = field_mapper::switch(&key).ok_or_else(|| ApiError::NotFound(format!("switch {key}")))?;
    let target = match action.as_str() {
        "on" => SwitchState::On,
        "off" => SwitchState::Off,
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown switch action '{other}', expected 'on' or 'off'"
            )))
        }
    };
    let channels = lookup(&state, &entry_id).await?;

    let accepted = channels.set_switch(spec.outlet, target).await;
    Ok(Json(CommandResult {
        accepted,
        is_on: target.is_on(),
    }))
}

#[derive(Debug, Deserialize)]
struct NewEntry {
    ip_address: String,
}

async fn create_entry(
    State(state): State<AppState>,
    Json(input): Json<NewEntry>,
) -> Result<(StatusCode, Json<DeviceView>), ApiError> {
    validate_ip_address(input.ip_address.trim())
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let entry = validate_input(&input.ip_address, state.registry.client_config())
        .await
        .map_err(|err| {
            warn!(ip = %input.ip_address, error = %err, "device setup rejected");
            ApiError::Setup(err)
        })?;
    let channels = state
        .registry
        .setup_entry(entry.clone())
        .await
        .map_err(ApiError::Setup)?;

    info!(entry_id = %entry.entry_id, "entry created");
    Ok((StatusCode::CREATED, Json(device_view(&entry, &channels.snapshot()))))
}

async fn remove_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.registry.unload_entry(&entry_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("entry {entry_id}")))
    }
}

async fn render_metrics(State(state): State<AppState>) -> Result<String, ApiError> {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .ok_or_else(|| ApiError::NotFound("metrics".to_string()))
}
