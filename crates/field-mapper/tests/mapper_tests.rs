use field_mapper::{
    channel, is_truthy, map_payload, switch, switch_for_outlet, ChannelKind, ChannelState, Unit,
    CHANNELS, SWITCHES,
};
use serde_json::{json, Value};
use types::{DevicePayload, Outlet};

fn payload(value: Value) -> DevicePayload {
    serde_json::from_value(value).expect("payload object")
}

fn state(payload: &DevicePayload, key: &str) -> ChannelState {
    channel(key).expect("known channel").extract(payload)
}

#[test]
fn channel_table_is_complete() {
    assert_eq!(CHANNELS.len(), 9);
    let passthrough = CHANNELS
        .iter()
        .filter(|spec| spec.kind == ChannelKind::Passthrough)
        .count();
    let measurements = CHANNELS
        .iter()
        .filter(|spec| spec.kind == ChannelKind::Measurement)
        .count();
    let binary = CHANNELS
        .iter()
        .filter(|spec| spec.kind == ChannelKind::Binary)
        .count();
    assert_eq!((passthrough, measurements, binary), (3, 4, 2));

    let energy = channel("energy_usage").expect("energy channel");
    assert_eq!(energy.field, "ele");
    assert_eq!(energy.unit, Some(Unit::KilowattHour));
    assert_eq!(channel("countdown").and_then(|spec| spec.unit), Some(Unit::Second));
    assert!(channel("ele").is_none());
}

#[test]
fn full_reading_maps_every_channel() {
    let payload: DevicePayload =
        serde_json::from_str(include_str!("fixtures/full_reading.json")).expect("fixture");
    let mapped = map_payload(&payload);
    assert_eq!(mapped.len(), 9);

    assert_eq!(state(&payload, "countdown_state"), ChannelState::Raw(json!(1)));
    assert_eq!(state(&payload, "auto_poweroff"), ChannelState::Raw(json!(0)));
    assert_eq!(state(&payload, "countdown"), ChannelState::Raw(json!(3600)));
    assert_eq!(state(&payload, "voltage"), ChannelState::Measurement(231.4));
    assert_eq!(state(&payload, "current"), ChannelState::Measurement(1.25));
    assert_eq!(state(&payload, "power"), ChannelState::Measurement(287.0));
    assert_eq!(state(&payload, "energy_usage"), ChannelState::Measurement(42.81));
    assert_eq!(state(&payload, "power_state"), ChannelState::Binary(true));
    assert_eq!(state(&payload, "usb_state"), ChannelState::Binary(true));
}

#[test]
fn falsy_measurements_default_to_zero() {
    let payload: DevicePayload =
        serde_json::from_str(include_str!("fixtures/idle_reading.json")).expect("fixture");

    for key in ["voltage", "current", "power", "energy_usage"] {
        assert_eq!(state(&payload, key), ChannelState::Measurement(0.0), "{key}");
    }
    assert_eq!(state(&payload, "power_state"), ChannelState::Binary(false));
    assert_eq!(state(&payload, "usb_state"), ChannelState::Binary(false));
    // Passthrough keeps genuine zeros and reports absence as unknown.
    assert_eq!(state(&payload, "countdown"), ChannelState::Raw(json!(0)));
    assert_eq!(state(&payload, "auto_poweroff"), ChannelState::Unknown);
}

#[test]
fn every_falsy_value_defaults_measurements() {
    for raw in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
        let payload = payload(json!({ "voltage": raw.clone() }));
        assert_eq!(state(&payload, "voltage"), ChannelState::Measurement(0.0), "{raw}");
    }
}

#[test]
fn truthy_non_numeric_measurement_passes_through() {
    let payload = payload(json!({ "power": "n/a" }));
    assert_eq!(state(&payload, "power"), ChannelState::Raw(json!("n/a")));
}

#[test]
fn binary_channels_require_numeric_one() {
    let cases = [
        (json!(1), true),
        (json!(1.0), true),
        (json!(true), true),
        (json!(0), false),
        (json!(2), false),
        (json!("1"), false),
        (json!(null), false),
    ];
    for (raw, expected) in cases {
        let payload = payload(json!({ "power_state": raw.clone(), "usb_state": raw.clone() }));
        assert_eq!(state(&payload, "power_state"), ChannelState::Binary(expected), "{raw}");
        assert_eq!(state(&payload, "usb_state"), ChannelState::Binary(expected), "{raw}");
    }
}

#[test]
fn mixed_payload_scenario() {
    let payload = payload(json!({ "voltage": 0, "power_state": 1, "usb_state": 0 }));

    assert_eq!(state(&payload, "voltage"), ChannelState::Measurement(0.0));
    assert_eq!(state(&payload, "power_state"), ChannelState::Binary(true));
    assert_eq!(state(&payload, "usb_state"), ChannelState::Binary(false));
    assert_eq!(state(&payload, "countdown_state"), ChannelState::Unknown);
}

#[test]
fn empty_payload_scenario() {
    let payload = DevicePayload::default();
    for (spec, value) in map_payload(&payload) {
        let expected = match spec.kind {
            ChannelKind::Passthrough => ChannelState::Unknown,
            ChannelKind::Measurement => ChannelState::Measurement(0.0),
            ChannelKind::Binary => ChannelState::Binary(false),
        };
        assert_eq!(value, expected, "{}", spec.key);
    }
}

#[test]
fn switches_follow_their_state_fields() {
    assert_eq!(SWITCHES.len(), 2);
    let payload = payload(json!({ "power_state": 0, "usb_state": 1 }));

    let power = switch("power_switch").expect("power switch");
    assert_eq!(power.outlet, Outlet::Power);
    assert!(!power.is_on(&payload));
    assert!(switch_for_outlet(Outlet::Usb).is_on(&payload));
    assert!(switch("usb_state").is_none());
}

#[test]
fn state_json_rendering() {
    assert_eq!(ChannelState::Unknown.to_json(), Value::Null);
    assert_eq!(ChannelState::Measurement(0.0).to_json(), json!(0.0));
    assert_eq!(ChannelState::Binary(true).to_json(), json!(true));
    assert_eq!(ChannelState::Raw(json!(5)).as_f64(), Some(5.0));
    assert!(is_truthy(&json!("x")));
    assert!(!is_truthy(&json!(0)));
}
