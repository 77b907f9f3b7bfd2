use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Network location of one PandaPWR device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceEndpoint {
    ip_address: String,
}

impl DeviceEndpoint {
    pub fn new(ip_address: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
        }
    }

    pub fn ip_address(&self) -> &str {
        &self.ip_address
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.ip_address)
    }

    /// Identifier shared by every entity of this device.
    pub fn device_id(&self) -> String {
        format!("pandapwr_{}", self.ip_address)
    }
}

impl fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ip_address)
    }
}

/// Fields decoded from one `/update_ele_data` response.
///
/// An empty payload means the poll produced no data, not that every field is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DevicePayload(Map<String, Value>);

impl DevicePayload {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Map<String, Value>> for DevicePayload {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Registry metadata reported for every device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifier: String,
    pub name: &'static str,
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub sw_version: &'static str,
}

impl DeviceInfo {
    pub fn for_endpoint(endpoint: &DeviceEndpoint) -> Self {
        Self {
            identifier: endpoint.device_id(),
            name: "Panda PWR",
            manufacturer: "Panda",
            model: "PWR Device",
            sw_version: "1.0",
        }
    }
}

/// A controllable output of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outlet {
    Power,
    Usb,
}

impl Outlet {
    /// Form field name used by `POST /set`.
    pub fn form_key(self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::Usb => "usb",
        }
    }
}

impl fmt::Display for Outlet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.form_key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    Off,
    On,
}

impl SwitchState {
    /// Wire value: 0 for off, 1 for on.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::On => 1,
        }
    }

    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

impl From<bool> for SwitchState {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}
