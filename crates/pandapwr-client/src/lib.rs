use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use types::{DeviceEndpoint, DevicePayload, Outlet, SwitchState};

const DATA_PATH: &str = "/update_ele_data";
const SET_PATH: &str = "/set";

/// Options for talking to one PandaPWR device.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout in milliseconds, covering the send and the body read.
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build http client: {0}")]
    Build(reqwest::Error),
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("response body is not a json object: {0}")]
    Decode(#[from] serde_json::Error),
}

/// HTTP client bound to a single device.
///
/// The inner connection pool lives as long as the client; every call makes a
/// single attempt and collapses any failure into `false` or an empty payload.
#[derive(Debug)]
pub struct PandaPwrClient {
    endpoint: DeviceEndpoint,
    base_url: String,
    config: ClientConfig,
    http: Client,
}

impl PandaPwrClient {
    pub fn new(endpoint: DeviceEndpoint, config: ClientConfig) -> Result<Self, ClientError> {
        // Devices sit on the local network; never route them through a system proxy.
        let http = Client::builder()
            .no_proxy()
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self {
            base_url: endpoint.base_url(),
            endpoint,
            config,
            http,
        })
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    /// True iff `GET /update_ele_data` answers with status 200.
    pub async fn test_connection(&self) -> bool {
        let request = async {
            let response = self.http.get(self.url(DATA_PATH)).send().await?;
            Ok::<_, ClientError>(response.status())
        };

        match self.bounded(request).await {
            Ok(status) => {
                debug!(ip = %self.endpoint, status = status.as_u16(), "connection test answered");
                status == StatusCode::OK
            }
            Err(err) => {
                warn!(ip = %self.endpoint, error = %err, "connection test failed");
                false
            }
        }
    }

    /// Fetches the current telemetry; empty on any failure.
    pub async fn get_data(&self) -> DevicePayload {
        match self.bounded(self.fetch_payload()).await {
            Ok(payload) => {
                debug!(ip = %self.endpoint, fields = payload.len(), "device data fetched");
                payload
            }
            Err(err) => {
                warn!(ip = %self.endpoint, error = %err, "device data fetch failed");
                DevicePayload::default()
            }
        }
    }

    pub async fn set_power_state(&self, state: SwitchState) -> bool {
        self.set_outlet(Outlet::Power, state).await
    }

    pub async fn set_usb_state(&self, state: SwitchState) -> bool {
        self.set_outlet(Outlet::Usb, state).await
    }

    /// Sends `{outlet}={0|1}` as a form body to `POST /set`.
    pub async fn set_outlet(&self, outlet: Outlet, state: SwitchState) -> bool {
        let form = [(outlet.form_key(), state.as_u8())];
        let request = async {
            let response = self
                .http
                .post(self.url(SET_PATH))
                .form(&form)
                .send()
                .await?;
            Ok::<_, ClientError>(response.status())
        };

        match self.bounded(request).await {
            Ok(status) => {
                debug!(
                    ip = %self.endpoint,
                    %outlet,
                    value = state.as_u8(),
                    status = status.as_u16(),
                    "set command answered"
                );
                status == StatusCode::OK
            }
            Err(err) => {
                warn!(ip = %self.endpoint, %outlet, error = %err, "set command failed");
                false
            }
        }
    }

    async fn fetch_payload(&self) -> Result<DevicePayload, ClientError> {
        let response = self.http.get(self.url(DATA_PATH)).send().await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn bounded<T, F>(&self, request: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        timeout(Duration::from_millis(self.config.timeout_ms), request)
            .await
            .map_err(|_| ClientError::Timeout {
                timeout_ms: self.config.timeout_ms,
            })?
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
