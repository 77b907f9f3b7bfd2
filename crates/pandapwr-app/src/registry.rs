use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use pandapwr_client::{ClientConfig, ClientError, PandaPwrClient};
use poller_actor::{DeviceChannels, PollerActor, PollerConfig};

use crate::config::DeviceEntry;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("cannot connect to device at {ip_address}")]
    CannotConnect { ip_address: String },
    #[error("entry {0} is already configured")]
    AlreadyConfigured(String),
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl SetupError {
    /// Short code shown to users, as the host's setup forms report it.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CannotConnect { .. } => "cannot_connect",
            Self::AlreadyConfigured(_) => "already_configured",
            Self::Client(_) => "unknown",
        }
    }
}

struct RegisteredDevice {
    entry: DeviceEntry,
    channels: DeviceChannels,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns one client and poll loop per configured device.
///
/// The device map lock is never held across a network call.
pub struct ChannelRegistry {
    client_config: ClientConfig,
    poller_config: PollerConfig,
    devices: RwLock<HashMap<String, RegisteredDevice>>,
}

impl ChannelRegistry {
    pub fn new(client_config: ClientConfig, poller_config: PollerConfig) -> Self {
        Self {
            client_config,
            poller_config,
            devices: RwLock::new(HashMap::new()),
        }
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    /// Connects to the device, polls it once and starts its poll loop.
    ///
    /// Nothing is registered when the connection test fails.
    pub async fn setup_entry(&self, entry: DeviceEntry) -> Result<DeviceChannels, SetupError> {
        if self.devices.read().await.contains_key(&entry.entry_id) {
            return Err(SetupError::AlreadyConfigured(entry.entry_id));
        }

        let client = PandaPwrClient::new(entry.endpoint(), self.client_config.clone())?;
        if !client.test_connection().await {
            return Err(SetupError::CannotConnect {
                ip_address: entry.ip_address,
            });
        }

        let channels = DeviceChannels::new(client);
        channels.poll().await;

        let mut devices = self.devices.write().await;
        // Another setup for the same entry may have finished while this one polled.
        if devices.contains_key(&entry.entry_id) {
            return Err(SetupError::AlreadyConfigured(entry.entry_id));
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let actor = PollerActor::new(channels.clone(), shutdown_rx, self.poller_config.clone());
        let task = tokio::spawn(actor.run());

        info!(entry_id = %entry.entry_id, ip = %entry.ip_address, "device entry set up");
        devices.insert(
            entry.entry_id.clone(),
            RegisteredDevice {
                entry,
                channels: channels.clone(),
                shutdown,
                task,
            },
        );
        Ok(channels)
    }

    /// Stops the poll loop and releases the device's client. False if unknown.
    pub async fn unload_entry(&self, entry_id: &str) -> bool {
        let Some(device) = self.devices.write().await.remove(entry_id) else {
            return false;
        };
        stop_device(device).await;
        info!(entry_id, "device entry unloaded");
        true
    }

    pub async fn device(&self, entry_id: &str) -> Option<DeviceChannels> {
        self.devices
            .read()
            .await
            .get(entry_id)
            .map(|device| device.channels.clone())
    }

    /// Configured entries with their channel handles, ordered by entry id.
    pub async fn entries(&self) -> Vec<(DeviceEntry, DeviceChannels)> {
        let mut entries: Vec<_> = self
            .devices
            .read()
            .await
            .values()
            .map(|device| (device.entry.clone(), device.channels.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.entry_id.cmp(&b.0.entry_id));
        entries
    }

    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn refresh_all(&self) {
        for device in self.devices.read().await.values() {
            device.channels.request_refresh();
        }
    }

    pub async fn shutdown(&self) {
        let devices: Vec<_> = self.devices.write().await.drain().map(|(_, device)| device).collect();
        for device in devices {
            stop_device(device).await;
        }
        info!("all device entries unloaded");
    }
}

async fn stop_device(device: RegisteredDevice) {
    let _ = device.shutdown.send(true);
    if let Err(err) = device.task.await {
        warn!(entry_id = %device.entry.entry_id, error = %err, "poller task join failed");
    }
}
