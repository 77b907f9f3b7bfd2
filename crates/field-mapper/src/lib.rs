use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use types::{DevicePayload, Outlet};

/// How a channel turns its payload field into a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Raw value, unknown when absent.
    Passthrough,
    /// Numeric reading, `0.0` whenever the raw value is falsy or absent.
    Measurement,
    /// On iff the raw value equals 1.
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Unit {
    #[serde(rename = "V")]
    Volt,
    #[serde(rename = "A")]
    Ampere,
    #[serde(rename = "W")]
    Watt,
    #[serde(rename = "kWh")]
    KilowattHour,
    #[serde(rename = "s")]
    Second,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Voltage,
    Current,
    Power,
    Energy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityCategory {
    Diagnostic,
    Config,
}

/// Static description of one derived value.
#[derive(Debug, PartialEq)]
pub struct ChannelSpec {
    /// Suffix of the entity unique id.
    pub key: &'static str,
    pub name: &'static str,
    /// Payload field the value is read from.
    pub field: &'static str,
    pub kind: ChannelKind,
    pub unit: Option<Unit>,
    pub device_class: Option<DeviceClass>,
    pub category: Option<EntityCategory>,
}

/// Static description of one controllable output.
#[derive(Debug, PartialEq)]
pub struct SwitchSpec {
    pub key: &'static str,
    pub name: &'static str,
    /// Payload field reporting the current output state.
    pub field: &'static str,
    pub outlet: Outlet,
    pub category: EntityCategory,
}

pub static CHANNELS: [ChannelSpec; 9] = [
    ChannelSpec {
        key: "countdown_state",
        name: "Countdown State",
        field: "countdown_state",
        kind: ChannelKind::Passthrough,
        unit: None,
        device_class: None,
        category: None,
    },
    ChannelSpec {
        key: "auto_poweroff",
        name: "Auto Poweroff",
        field: "auto_poweroff",
        kind: ChannelKind::Passthrough,
        unit: None,
        device_class: None,
        category: None,
    },
    ChannelSpec {
        key: "countdown",
        name: "Countdown",
        field: "countdown",
        kind: ChannelKind::Passthrough,
        unit: Some(Unit::Second),
        device_class: None,
        category: None,
    },
    ChannelSpec {
        key: "voltage",
        name: "Voltage",
        field: "voltage",
        kind: ChannelKind::Measurement,
        unit: Some(Unit::Volt),
        device_class: Some(DeviceClass::Voltage),
        category: None,
    },
    ChannelSpec {
        key: "current",
        name: "Current",
        field: "current",
        kind: ChannelKind::Measurement,
        unit: Some(Unit::Ampere),
        device_class: Some(DeviceClass::Current),
        category: None,
    },
    ChannelSpec {
        key: "power",
        name: "Power",
        field: "power",
        kind: ChannelKind::Measurement,
        unit: Some(Unit::Watt),
        device_class: Some(DeviceClass::Power),
        category: None,
    },
    ChannelSpec {
        key: "energy_usage",
        name: "Energy Usage",
        field: "ele",
        kind: ChannelKind::Measurement,
        unit: Some(Unit::KilowattHour),
        device_class: Some(DeviceClass::Energy),
        category: None,
    },
    ChannelSpec {
        key: "power_state",
        name: "Power State",
        field: "power_state",
        kind: ChannelKind::Binary,
        unit: None,
        device_class: Some(DeviceClass::Power),
        category: Some(EntityCategory::Diagnostic),
    },
    ChannelSpec {
        key: "usb_state",
        name: "USB State",
        field: "usb_state",
        kind: ChannelKind::Binary,
        unit: None,
        device_class: Some(DeviceClass::Power),
        category: Some(EntityCategory::Diagnostic),
    },
];

pub static SWITCHES: [SwitchSpec; 2] = [
    SwitchSpec {
        key: "power_switch",
        name: "Power Switch",
        field: "power_state",
        outlet: Outlet::Power,
        category: EntityCategory::Config,
    },
    SwitchSpec {
        key: "usb_switch",
        name: "USB Switch",
        field: "usb_state",
        outlet: Outlet::Usb,
        category: EntityCategory::Config,
    },
];

/// Current value of one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelState {
    Unknown,
    Raw(Value),
    Measurement(f64),
    Binary(bool),
}

impl ChannelState {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Measurement(value) => Some(*value),
            Self::Raw(value) => value.as_f64(),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Unknown => Value::Null,
            Self::Raw(value) => value.clone(),
            Self::Measurement(value) => Value::from(*value),
            Self::Binary(value) => Value::Bool(*value),
        }
    }
}

impl ChannelSpec {
    pub fn extract(&self, payload: &DevicePayload) -> ChannelState {
        let raw = payload.get(self.field);
        match self.kind {
            ChannelKind::Passthrough => match raw {
                None | Some(Value::Null) => ChannelState::Unknown,
                Some(value) => ChannelState::Raw(value.clone()),
            },
            ChannelKind::Measurement => match raw.filter(|value| is_truthy(value)) {
                None => ChannelState::Measurement(0.0),
                Some(value) => match value.as_f64() {
                    Some(number) => ChannelState::Measurement(number),
                    None => {
                        debug!(field = self.field, %value, "non-numeric measurement passed through");
                        ChannelState::Raw(value.clone())
                    }
                },
            },
            ChannelKind::Binary => ChannelState::Binary(raw.is_some_and(equals_one)),
        }
    }
}

impl SwitchSpec {
    pub fn is_on(&self, payload: &DevicePayload) -> bool {
        payload.get(self.field).is_some_and(equals_one)
    }
}

/// Maps a payload onto every channel, in table order.
pub fn map_payload(payload: &DevicePayload) -> Vec<(&'static ChannelSpec, ChannelState)> {
    CHANNELS
        .iter()
        .map(|spec| (spec, spec.extract(payload)))
        .collect()
}

pub fn channel(key: &str) -> Option<&'static ChannelSpec> {
    CHANNELS.iter().find(|spec| spec.key == key)
}

pub fn switch(key: &str) -> Option<&'static SwitchSpec> {
    SWITCHES.iter().find(|spec| spec.key == key)
}

pub fn switch_for_outlet(outlet: Outlet) -> &'static SwitchSpec {
    match outlet {
        Outlet::Power => &SWITCHES[0],
        Outlet::Usb => &SWITCHES[1],
    }
}

/// Python-style truthiness: null, false, zero and empty containers are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

// JSON `true` counts as 1; the string "1" does not.
fn equals_one(value: &Value) -> bool {
    match value {
        Value::Number(number) => number.as_f64() == Some(1.0),
        Value::Bool(flag) => *flag,
        _ => false,
    }
}
