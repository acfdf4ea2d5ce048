//! Test fixtures and utilities for consistent test setup
//!
//! Provides test credentials, configuration and `getCurrentState` bodies
//! using rstest fixtures.

use hmip_valve_switch::config::{AuthConfig, CloudConfig, SwitchConfig, SwitchSettings};
use rstest::*;
use serde_json::{json, Map, Value};
use std::time::Duration;
use url::Url;

pub const TEST_AUTHTOKEN: &str = "0123456789ABCDEF0123456789ABCDEF";
pub const TEST_ACCESSPOINT: &str = "3014-F711-A000-0000-0000-1234";
pub const TEST_ACCESSPOINT_ID: &str = "3014F711A000000000001234";

/// Common test device ids
pub struct TestDeviceIds;

impl TestDeviceIds {
    pub const PLUG: &'static str = "3014F711A0000000000000B2";
    pub const VALVES_GROUND_FLOOR: &'static str = "3014F711A0000000000000A1";
    pub const VALVES_FIRST_FLOOR: &'static str = "3014F711A0000000000000A2";
    pub const THERMOSTAT: &'static str = "3014F711A0000000000000C3";
}

pub const PLUG_LABEL: &str = "Schalt-Mess-Steckdose";

/// Configuration with the cloud lookup disabled (nothing listens on port 1)
#[fixture]
pub fn offline_config() -> SwitchConfig {
    test_config("http://127.0.0.1:1")
}

/// Configuration pointing at a mock cloud
pub fn test_config(lookup_url: &str) -> SwitchConfig {
    SwitchConfig {
        auth: AuthConfig {
            authtoken: TEST_AUTHTOKEN.to_string(),
            accesspoint: TEST_ACCESSPOINT.to_string(),
        },
        switch: SwitchSettings::default(),
        cloud: CloudConfig {
            lookup_url: Url::parse(lookup_url).expect("Valid URL"),
            timeout: Duration::from_secs(5),
        },
    }
}

fn channels(positions: &[f64]) -> Value {
    let mut channels = Map::new();
    channels.insert(
        "0".to_string(),
        json!({ "functionalChannelType": "DEVICE_BASE", "index": 0 }),
    );
    for (i, position) in positions.iter().enumerate() {
        let index = i + 1;
        channels.insert(
            index.to_string(),
            json!({
                "functionalChannelType": "FLOOR_TERMINAL_BLOCK_CHANNEL",
                "index": index,
                "valvePosition": position
            }),
        );
    }
    Value::Object(channels)
}

/// `getCurrentState` body with the plug, a thermostat and two valve blocks
pub fn current_state(ground_floor: &[f64], first_floor: &[f64]) -> Value {
    json!({
        "home": { "id": "home-1", "currentAPVersion": "2.2.18" },
        "groups": {},
        "devices": {
            (TestDeviceIds::PLUG): {
                "id": TestDeviceIds::PLUG,
                "label": PLUG_LABEL,
                "type": "PLUGABLE_SWITCH_MEASURING",
                "functionalChannels": {
                    "0": { "index": 0 },
                    "1": { "index": 1, "on": false, "currentPowerConsumption": 0.0 }
                }
            },
            (TestDeviceIds::THERMOSTAT): {
                "id": TestDeviceIds::THERMOSTAT,
                "label": "Wohnzimmer",
                "type": "WALL_MOUNTED_THERMOSTAT_PRO",
                "functionalChannels": { "1": { "index": 1, "valvePosition": 0.9 } }
            },
            (TestDeviceIds::VALVES_GROUND_FLOOR): {
                "id": TestDeviceIds::VALVES_GROUND_FLOOR,
                "label": "Fussbodenheizung EG",
                "type": "FLOOR_TERMINAL_BLOCK_12",
                "functionalChannels": channels(ground_floor)
            },
            (TestDeviceIds::VALVES_FIRST_FLOOR): {
                "id": TestDeviceIds::VALVES_FIRST_FLOOR,
                "label": "Fussbodenheizung OG",
                "type": "FLOOR_TERMINAL_BLOCK_12",
                "functionalChannels": channels(first_floor)
            }
        }
    })
}

/// Push frame with one `DEVICE_CHANGED` event for the ground floor valves
pub fn device_changed_frame(positions: &[f64]) -> Vec<u8> {
    json!({
        "events": {
            "0": {
                "pushEventType": "DEVICE_CHANGED",
                "device": {
                    "id": TestDeviceIds::VALVES_GROUND_FLOOR,
                    "type": "FLOOR_TERMINAL_BLOCK_12",
                    "functionalChannels": channels(positions)
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}
