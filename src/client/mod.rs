//! Device-state client boundary and the data it hands to the core
//!
//! The reconciliation core never talks to the network directly. It reads
//! [`DeviceSnapshot`]s and [`NotificationEvent`]s produced by a
//! [`DeviceStateClient`] and drives the outlet through a [`SwitchActuator`].

pub mod channels;
pub mod hmip_client;

pub use channels::{normalize_channels, FunctionalChannel};
pub use hmip_client::{HmipClient, HmipSwitch};

use crate::error::{Result, ValveSwitchError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A device as known to the device-state client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Device id (SGTIN)
    pub id: String,
    /// Human-readable label
    pub label: String,
    /// Device type (e.g. "FLOOR_TERMINAL_BLOCK_12", "PLUGABLE_SWITCH_MEASURING")
    pub device_type: String,
    /// Functional channels in canonical order
    pub channels: Vec<FunctionalChannel>,
}

impl Device {
    /// Parse one device record of the `devices` collection.
    ///
    /// A record without an `id` is rejected. A channel field of unexpected
    /// shape leaves the device without channels, which reads as "closed".
    pub fn from_value(value: &Value) -> Result<Self> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ValveSwitchError::extraction("device record without id"))?
            .to_string();
        let label = value
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let device_type = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let channels = match normalize_channels(
            value.get("functionalChannels").unwrap_or(&Value::Null),
        ) {
            Ok(channels) => channels,
            Err(e) => {
                tracing::warn!("Device {} ({}): {}", label, id, e);
                Vec::new()
            }
        };

        Ok(Self {
            id,
            label,
            device_type,
            channels,
        })
    }

    /// Whether this device is of the monitored kind
    pub fn matches_type(&self, device_type: &str) -> bool {
        self.device_type.contains(device_type)
    }
}

/// Full set of known devices at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Devices ordered by id
    pub devices: Vec<Device>,

    /// When the snapshot was fetched
    pub fetched_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl DeviceSnapshot {
    /// Build a snapshot from already parsed devices
    pub fn new(mut devices: Vec<Device>) -> Self {
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            devices,
            fetched_at: Some(chrono::Utc::now()),
        }
    }

    /// Parse the body of a `getCurrentState` response.
    ///
    /// `devices` is a mapping keyed by device id on the wire; a list is
    /// accepted as well. Records that fail to parse are logged and skipped.
    pub fn from_current_state(state: &Value) -> Result<Self> {
        let records: Vec<&Value> = match state.get("devices") {
            Some(Value::Object(map)) => map.values().collect(),
            Some(Value::Array(list)) => list.iter().collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(ValveSwitchError::extraction(
                    "devices is neither a mapping nor a list",
                ))
            }
        };

        let devices = records
            .into_iter()
            .filter_map(|record| match Device::from_value(record) {
                Ok(device) => Some(device),
                Err(e) => {
                    tracing::warn!("Skipping device record: {}", e);
                    None
                }
            })
            .collect();

        Ok(Self::new(devices))
    }

    /// Look up a device by its human-readable label
    pub fn find_by_label(&self, label: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.label == label)
    }

    /// "label (type)" for every known device, for operator diagnostics
    pub fn labels(&self) -> Vec<String> {
        self.devices
            .iter()
            .map(|d| format!("{} ({})", d.label, d.device_type))
            .collect()
    }

    /// Number of known devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device is known
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// One push notification as delivered by the push channel
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    /// Raw frame bytes (binary websocket frame)
    Bytes(Vec<u8>),
    /// Text frame
    Text(String),
    /// Already decoded record
    Structured(Value),
}

impl NotificationEvent {
    /// Decode the payload into a structured record
    pub fn decode(&self) -> Result<Value> {
        match self {
            NotificationEvent::Bytes(bytes) => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| ValveSwitchError::decode(format!("payload is not UTF-8: {e}")))?;
                serde_json::from_str(text)
                    .map_err(|e| ValveSwitchError::decode(format!("payload is not JSON: {e}")))
            }
            NotificationEvent::Text(text) => serde_json::from_str(text)
                .map_err(|e| ValveSwitchError::decode(format!("payload is not JSON: {e}"))),
            NotificationEvent::Structured(value) => Ok(value.clone()),
        }
    }

    /// Raw payload size in bytes; `None` for an already decoded record
    pub fn payload_len(&self) -> Option<usize> {
        match self {
            NotificationEvent::Bytes(bytes) => Some(bytes.len()),
            NotificationEvent::Text(text) => Some(text.len()),
            NotificationEvent::Structured(_) => None,
        }
    }
}

/// Source of device state: full snapshots on demand plus a push channel
#[async_trait]
pub trait DeviceStateClient: Send + Sync {
    /// Fetch the full current state and replace the cached snapshot.
    ///
    /// Returns once the cache is updated; fails on transport or auth errors.
    async fn refresh_snapshot(&self) -> Result<()>;

    /// Currently cached snapshot
    async fn snapshot(&self) -> Arc<DeviceSnapshot>;

    /// Open the push channel and return the stream of notifications
    async fn enable_events(&self) -> Result<mpsc::UnboundedReceiver<NotificationEvent>>;

    /// Close the push channel and release the connection
    async fn close(&self) -> Result<()>;
}

/// The switched outlet driven by the reconciler
#[async_trait]
pub trait SwitchActuator: Send + Sync {
    /// Command the outlet on (`true`) or off (`false`)
    async fn set_switch_state(&self, on: bool) -> Result<()>;

    /// Label of the target device, for logging
    fn label(&self) -> &str;
}
