//! Valve positions from push notifications
//!
//! A push frame carries an `events` collection; each `DEVICE_CHANGED` entry
//! holds the full device record. Only devices of the monitored valve type
//! contribute, one reading per channel that reports a numeric valve position.

use crate::client::{normalize_channels, NotificationEvent};
use crate::error::Result;
use serde_json::Value;
use tracing::{debug, warn};

/// Push event type carrying a changed device record
pub const DEVICE_CHANGED: &str = "DEVICE_CHANGED";

/// One valve position reported by one channel of one device
#[derive(Debug, Clone, PartialEq)]
pub struct ValveReading {
    pub device_id: String,
    pub channel_index: Option<u32>,
    pub position: f64,
}

impl ValveReading {
    pub fn is_open(&self) -> bool {
        self.position > 0.0
    }
}

/// Aggregate open state: true iff any reading is open
pub fn any_open(readings: &[ValveReading]) -> bool {
    readings.iter().any(ValveReading::is_open)
}

/// Extracts valve readings from notification payloads
#[derive(Debug, Clone)]
pub struct ValveSignalExtractor {
    valve_device_type: String,
}

impl ValveSignalExtractor {
    pub fn new(valve_device_type: impl Into<String>) -> Self {
        Self {
            valve_device_type: valve_device_type.into(),
        }
    }

    /// Decode the event and extract its readings.
    ///
    /// Only a payload that cannot be decoded at all is an error; the caller
    /// treats that as "no readings". Shape problems inside a decoded payload
    /// are logged and skip the affected device.
    pub fn extract(&self, event: &NotificationEvent) -> Result<Vec<ValveReading>> {
        let record = event.decode()?;
        Ok(self.extract_value(&record))
    }

    /// Extract readings from an already decoded payload
    pub fn extract_value(&self, record: &Value) -> Vec<ValveReading> {
        let events: Vec<&Value> = match record.get("events") {
            Some(Value::Object(map)) => map.values().collect(),
            Some(Value::Array(list)) => list.iter().collect(),
            Some(Value::Null) | None => return Vec::new(),
            Some(other) => {
                warn!("Ignoring event payload with scalar 'events': {}", other);
                return Vec::new();
            }
        };

        let mut readings = Vec::new();
        for event in events {
            if event.get("pushEventType").and_then(Value::as_str) != Some(DEVICE_CHANGED) {
                continue;
            }
            let Some(device) = event.get("device").filter(|d| d.is_object()) else {
                continue;
            };
            let device_type = device.get("type").and_then(Value::as_str).unwrap_or_default();
            if !device_type.contains(&self.valve_device_type) {
                continue;
            }

            let device_id = device
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let channels =
                match normalize_channels(device.get("functionalChannels").unwrap_or(&Value::Null)) {
                    Ok(channels) => channels,
                    Err(e) => {
                        warn!("⚠️ Skipping device {} in event: {}", device_id, e);
                        continue;
                    }
                };

            readings.extend(channels.into_iter().filter_map(|channel| {
                channel.valve_position.map(|position| ValveReading {
                    device_id: device_id.to_string(),
                    channel_index: channel.index,
                    position,
                })
            }));
        }

        debug!("Extracted {} valve readings", readings.len());
        readings
    }
}
