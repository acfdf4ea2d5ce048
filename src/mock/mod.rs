//! Mock implementations for testing
//!
//! This module provides a mock device-state client and a recording mock switch.

use crate::client::{
    Device, DeviceSnapshot, DeviceStateClient, FunctionalChannel, NotificationEvent,
    SwitchActuator,
};
use crate::error::{Result, ValveSwitchError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

/// Mock switch that records every command it receives
#[derive(Default)]
pub struct MockSwitch {
    commands: Mutex<Vec<bool>>,
    failing: AtomicBool,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSwitch {
    /// Create new mock switch
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every command take this long
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make subsequent commands fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successfully applied commands, in order
    pub fn commands(&self) -> Vec<bool> {
        self.commands.lock().unwrap().clone()
    }

    /// Highest number of commands that were in flight at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SwitchActuator for MockSwitch {
    async fn set_switch_state(&self, on: bool) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(ValveSwitchError::device_control("mock switch unreachable"));
        }
        self.commands.lock().unwrap().push(on);
        Ok(())
    }

    fn label(&self) -> &str {
        "Mock Plug"
    }
}

/// Mock device-state client with a settable snapshot and push channel
pub struct MockDeviceClient {
    /// Snapshot that the next refresh publishes
    remote: Mutex<DeviceSnapshot>,
    cached: RwLock<Arc<DeviceSnapshot>>,
    failing: AtomicBool,
    refreshes: AtomicUsize,
    events: Mutex<Option<mpsc::UnboundedReceiver<NotificationEvent>>>,
    sender: mpsc::UnboundedSender<NotificationEvent>,
    closed: AtomicBool,
}

impl MockDeviceClient {
    pub fn new(remote: DeviceSnapshot) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            remote: Mutex::new(remote),
            cached: RwLock::new(Arc::new(DeviceSnapshot::default())),
            failing: AtomicBool::new(false),
            refreshes: AtomicUsize::new(0),
            events: Mutex::new(Some(receiver)),
            sender,
            closed: AtomicBool::new(false),
        }
    }

    /// Replace the state the next refresh will see
    pub fn set_remote(&self, snapshot: DeviceSnapshot) {
        *self.remote.lock().unwrap() = snapshot;
    }

    /// Make subsequent refreshes fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of refresh attempts
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Sender side of the push channel
    pub fn push_sender(&self) -> mpsc::UnboundedSender<NotificationEvent> {
        self.sender.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceStateClient for MockDeviceClient {
    async fn refresh_snapshot(&self) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ValveSwitchError::connection("mock cloud unreachable"));
        }
        let remote = self.remote.lock().unwrap().clone();
        *self.cached.write().await = Arc::new(remote);
        Ok(())
    }

    async fn snapshot(&self) -> Arc<DeviceSnapshot> {
        self.cached.read().await.clone()
    }

    async fn enable_events(&self) -> Result<mpsc::UnboundedReceiver<NotificationEvent>> {
        self.events
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ValveSwitchError::websocket("events already enabled"))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Valve device with the given channel positions (channel 0 carries none)
pub fn valve_device(id: &str, positions: &[f64]) -> Device {
    let mut channels = vec![FunctionalChannel {
        index: Some(0),
        valve_position: None,
    }];
    channels.extend(positions.iter().enumerate().map(|(i, p)| FunctionalChannel {
        index: Some(i as u32 + 1),
        valve_position: Some(*p),
    }));

    Device {
        id: id.to_string(),
        label: format!("Heizkreis {id}"),
        device_type: "FLOOR_TERMINAL_BLOCK_12".to_string(),
        channels,
    }
}

/// Push payload with one `DEVICE_CHANGED` event for a valve device
pub fn valve_event(positions: &[f64]) -> Value {
    let channels: serde_json::Map<String, Value> = positions
        .iter()
        .enumerate()
        .map(|(i, p)| ((i + 1).to_string(), json!({ "valvePosition": p })))
        .collect();

    json!({
        "events": {
            "0": {
                "pushEventType": "DEVICE_CHANGED",
                "device": {
                    "id": "3014F711A0000000000000A1",
                    "type": "FLOOR_TERMINAL_BLOCK_12",
                    "functionalChannels": channels
                }
            }
        }
    })
}
