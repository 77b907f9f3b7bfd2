use std::collections::HashSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use pandapwr_client::ClientConfig;
use poller_actor::PollerConfig;
use types::DeviceEndpoint;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9410";

/// One configured device, the equivalent of a host config entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceEntry {
    pub entry_id: String,
    pub ip_address: String,
}

impl DeviceEntry {
    /// Entry keyed by the device id derived from its address.
    pub fn new(ip_address: impl Into<String>) -> Self {
        let ip_address = ip_address.into();
        Self {
            entry_id: DeviceEndpoint::new(ip_address.clone()).device_id(),
            ip_address,
        }
    }

    pub fn endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint::new(self.ip_address.clone())
    }
}

#[derive(Clone, Debug)]
pub struct IntegrationConfig {
    pub devices: Vec<DeviceEntry>,
    pub client: ClientConfig,
    pub poller: PollerConfig,
    pub listen_addr: String,
    pub metrics_enabled: bool,
}

impl IntegrationConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    pub fn load_with_path(config_path: Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(file_config) = load_file_config(config_path.as_deref())? {
            apply_file_config(&mut config, file_config);
        }

        apply_env_overrides(&mut config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for device in &self.devices {
            validate_ip_address(&device.ip_address)?;
            if device.entry_id.trim().is_empty() {
                anyhow::bail!("devices.entry_id must be non-empty");
            }
            if !seen.insert(device.entry_id.as_str()) {
                anyhow::bail!("devices.entry_id '{}' is configured twice", device.entry_id);
            }
        }
        if self.client.timeout_ms == 0 {
            anyhow::bail!("client.timeout_ms must be >= 1");
        }
        if self.poller.poll_interval.as_millis() == 0 {
            anyhow::bail!("poller.poll_interval_ms must be >= 1");
        }
        self.listen_addr
            .parse::<SocketAddr>()
            .map_err(|_| anyhow::anyhow!("http.listen_addr must be a socket address (e.g. 127.0.0.1:9410)"))?;

        Ok(())
    }
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            client: ClientConfig::default(),
            poller: PollerConfig::default(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            metrics_enabled: true,
        }
    }
}

fn apply_env_overrides(config: &mut IntegrationConfig) {
    if let Ok(value) = env::var("PANDAPWR_DEVICES") {
        config.devices = parse_devices(&value);
    }

    if let Some(timeout_ms) = parse_env_u64("PANDAPWR_TIMEOUT_MS") {
        config.client.timeout_ms = timeout_ms;
    }

    if let Some(interval_ms) = parse_env_u64("PANDAPWR_POLL_INTERVAL_MS") {
        config.poller.poll_interval = Duration::from_millis(interval_ms);
    }

    if let Ok(value) = env::var("PANDAPWR_LISTEN_ADDR") {
        config.listen_addr = value;
    }

    config.metrics_enabled = parse_env_bool("PANDAPWR_METRICS").unwrap_or(config.metrics_enabled);
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    devices: Option<Vec<FileDeviceConfig>>,
    client: Option<FileClientConfig>,
    poller: Option<FilePollerConfig>,
    http: Option<FileHttpConfig>,
}

#[derive(Debug, Deserialize)]
struct FileDeviceConfig {
    ip_address: String,
    entry_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileClientConfig {
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FilePollerConfig {
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileHttpConfig {
    listen_addr: Option<String>,
    metrics_enabled: Option<bool>,
}

fn load_file_config(config_path: Option<&str>) -> Result<Option<FileConfig>> {
    let path = match config_path {
        Some(path) => path.to_string(),
        None => match env::var("PANDAPWR_CONFIG") {
            Ok(value) => value,
            Err(_) => return Ok(None),
        },
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("read config file {path}"))?;
    let ext = Path::new(&path).extension().and_then(|value| value.to_str());

    let config = match ext {
        Some("json") => serde_json::from_str(&content).context("parse json config")?,
        _ => toml::from_str(&content).context("parse toml config")?,
    };

    Ok(Some(config))
}

fn apply_file_config(config: &mut IntegrationConfig, file: FileConfig) {
    if let Some(devices) = file.devices {
        config.devices = devices
            .into_iter()
            .map(|device| match device.entry_id {
                Some(entry_id) => DeviceEntry {
                    entry_id,
                    ip_address: device.ip_address,
                },
                None => DeviceEntry::new(device.ip_address),
            })
            .collect();
    }

    if let Some(timeout_ms) = file.client.and_then(|client| client.timeout_ms) {
        config.client.timeout_ms = timeout_ms;
    }

    if let Some(interval_ms) = file.poller.and_then(|poller| poller.poll_interval_ms) {
        config.poller.poll_interval = Duration::from_millis(interval_ms);
    }

    if let Some(http) = file.http {
        if let Some(listen_addr) = http.listen_addr {
            config.listen_addr = listen_addr;
        }
        if let Some(enabled) = http.metrics_enabled {
            config.metrics_enabled = enabled;
        }
    }
}

fn parse_env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

/// Parses `ip[,ip...]`, where each item may be prefixed with `entry_id=`.
fn parse_devices(value: &str) -> Vec<DeviceEntry> {
    value
        .split(',')
        .filter_map(|entry| {
            let trimmed = entry.trim();
            if trimmed.is_empty() {
                return None;
            }
            Some(match trimmed.split_once('=') {
                Some((entry_id, ip)) => DeviceEntry {
                    entry_id: entry_id.trim().to_string(),
                    ip_address: ip.trim().to_string(),
                },
                None => DeviceEntry::new(trimmed),
            })
        })
        .collect()
}

/// Accepts a bare host with optional port; the `http://` prefix is added by the client.
pub fn validate_ip_address(value: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("devices.ip_address must be non-empty");
    }
    if value.contains("://") {
        anyhow::bail!("devices.ip_address '{value}' must not include a scheme");
    }
    if value.chars().any(|ch| ch == '/' || ch.is_whitespace()) {
        anyhow::bail!("devices.ip_address '{value}' must be a bare host or host:port");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_list_parses_ids_and_bare_addresses() {
        let devices = parse_devices("kitchen=192.168.1.20, 192.168.1.21 ,,");
        assert_eq!(
            devices,
            vec![
                DeviceEntry {
                    entry_id: "kitchen".to_string(),
                    ip_address: "192.168.1.20".to_string(),
                },
                DeviceEntry::new("192.168.1.21"),
            ]
        );
        assert_eq!(devices[1].entry_id, "pandapwr_192.168.1.21");
    }

    #[test]
    fn ip_address_rules() {
        assert!(validate_ip_address("10.0.0.7").is_ok());
        assert!(validate_ip_address("panda.local:8080").is_ok());
        assert!(validate_ip_address("").is_err());
        assert!(validate_ip_address("http://10.0.0.7").is_err());
        assert!(validate_ip_address("10.0.0.7/set").is_err());
        assert!(validate_ip_address("10.0.0 .7").is_err());
    }
}
