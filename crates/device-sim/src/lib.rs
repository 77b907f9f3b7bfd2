//! In-process stand-in for a PandaPWR device.
//!
//! Serves `GET /update_ele_data` and `POST /set` on a loopback port, records
//! every `/set` body, and applies accepted commands to the served payload.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

/// One recorded `POST /set` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetRequest {
    pub body: String,
    pub content_type: Option<String>,
}

#[derive(Debug)]
struct SimInner {
    payload: Value,
    raw_body: Option<String>,
    data_status: StatusCode,
    set_status: StatusCode,
    delay: Duration,
    data_requests: usize,
    set_requests: Vec<SetRequest>,
}

type SimState = Arc<Mutex<SimInner>>;

pub struct DeviceSim {
    addr: SocketAddr,
    state: SimState,
    task: JoinHandle<()>,
}

impl DeviceSim {
    pub async fn start(payload: Value) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(SimInner {
            payload,
            raw_body: None,
            data_status: StatusCode::OK,
            set_status: StatusCode::OK,
            delay: Duration::ZERO,
            data_requests: 0,
            set_requests: Vec::new(),
        }));

        let app = Router::new()
            .route("/update_ele_data", get(update_ele_data))
            .route("/set", post(set))
            .with_state(state.clone());

        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                debug!(error = %err, "device sim stopped");
            }
        });

        Ok(Self { addr, state, task })
    }

    /// A typical reading from a device with power on and USB off.
    pub fn sample_payload() -> Value {
        json!({
            "countdown_state": 0,
            "auto_poweroff": 1,
            "countdown": 120,
            "voltage": 229.8,
            "current": 0.42,
            "power": 96.5,
            "ele": 12.7,
            "power_state": 1,
            "usb_state": 0
        })
    }

    /// Host and port, usable as a configured `ip_address`.
    pub fn ip_address(&self) -> String {
        self.addr.to_string()
    }

    pub async fn set_payload(&self, payload: Value) {
        let mut inner = self.state.lock().await;
        inner.payload = payload;
        inner.raw_body = None;
    }

    /// Serves `body` verbatim instead of the JSON payload.
    pub async fn set_raw_body(&self, body: impl Into<String>) {
        self.state.lock().await.raw_body = Some(body.into());
    }

    pub async fn set_data_status(&self, status: u16) {
        self.state.lock().await.data_status = to_status(status);
    }

    pub async fn set_set_status(&self, status: u16) {
        self.state.lock().await.set_status = to_status(status);
    }

    /// Delays every response by `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        self.state.lock().await.delay = delay;
    }

    pub async fn payload(&self) -> Value {
        self.state.lock().await.payload.clone()
    }

    pub async fn data_requests(&self) -> usize {
        self.state.lock().await.data_requests
    }

    pub async fn set_requests(&self) -> Vec<SetRequest> {
        self.state.lock().await.set_requests.clone()
    }
}

impl Drop for DeviceSim {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Address of a loopback port with nothing listening on it.
pub fn unreachable_ip_address() -> std::io::Result<String> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr.to_string())
}

async fn update_ele_data(State(state): State<SimState>) -> Response {
    let (status, body, delay) = {
        let mut inner = state.lock().await;
        inner.data_requests += 1;
        let body = inner
            .raw_body
            .clone()
            .unwrap_or_else(|| inner.payload.to_string());
        (inner.data_status, body, inner.delay)
    };

    if !delay.is_zero() {
        sleep(delay).await;
    }

    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn set(State(state): State<SimState>, headers: HeaderMap, body: String) -> StatusCode {
    let delay = {
        let mut inner = state.lock().await;
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        inner.set_requests.push(SetRequest {
            body: body.clone(),
            content_type,
        });

        if inner.set_status == StatusCode::OK {
            apply_command(&mut inner.payload, &body);
        }
        inner.delay
    };

    if !delay.is_zero() {
        sleep(delay).await;
    }

    state.lock().await.set_status
}

fn apply_command(payload: &mut Value, body: &str) {
    let Some((key, value)) = body.split_once('=') else {
        return;
    };
    let Ok(value) = value.parse::<u8>() else {
        return;
    };
    let field = match key {
        "power" => "power_state",
        "usb" => "usb_state",
        _ => return,
    };
    if let Some(fields) = payload.as_object_mut() {
        fields.insert(field.to_string(), Value::from(value));
    }
}

fn to_status(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
