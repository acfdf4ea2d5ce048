//! Valve state from a full device snapshot

use crate::client::DeviceSnapshot;
use serde::Serialize;

/// What a snapshot scan saw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Devices of the monitored type
    pub valve_devices: usize,
    /// Channels of those devices that report a valve position
    pub reporting_channels: usize,
    /// Channels with a position strictly above zero
    pub open_channels: usize,
}

impl ScanSummary {
    pub fn any_open(&self) -> bool {
        self.open_channels > 0
    }
}

/// Scans snapshots for open valves of the monitored type
#[derive(Debug, Clone)]
pub struct SnapshotValveScanner {
    valve_device_type: String,
}

impl SnapshotValveScanner {
    pub fn new(valve_device_type: impl Into<String>) -> Self {
        Self {
            valve_device_type: valve_device_type.into(),
        }
    }

    /// Count monitored devices and open channels. Absent positions read as closed.
    pub fn scan(&self, snapshot: &DeviceSnapshot) -> ScanSummary {
        snapshot
            .devices
            .iter()
            .filter(|device| device.matches_type(&self.valve_device_type))
            .fold(ScanSummary::default(), |mut summary, device| {
                summary.valve_devices += 1;
                for position in device.channels.iter().filter_map(|c| c.valve_position) {
                    summary.reporting_channels += 1;
                    if position > 0.0 {
                        summary.open_channels += 1;
                    }
                }
                summary
            })
    }

    /// True iff at least one monitored valve reports a position above zero
    pub fn any_valve_open(&self, snapshot: &DeviceSnapshot) -> bool {
        self.scan(snapshot).any_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Device, FunctionalChannel};

    fn device(id: &str, device_type: &str, positions: &[Option<f64>]) -> Device {
        Device {
            id: id.to_string(),
            label: format!("Device {id}"),
            device_type: device_type.to_string(),
            channels: positions
                .iter()
                .enumerate()
                .map(|(i, p)| FunctionalChannel {
                    index: Some(i as u32),
                    valve_position: *p,
                })
                .collect(),
        }
    }

    fn scanner() -> SnapshotValveScanner {
        SnapshotValveScanner::new("FLOOR_TERMINAL_BLOCK_12")
    }

    #[test]
    fn test_open_valve_is_detected() {
        let snapshot = DeviceSnapshot::new(vec![
            device("a", "FLOOR_TERMINAL_BLOCK_12", &[None, Some(0.0), Some(0.25)]),
            device("b", "FLOOR_TERMINAL_BLOCK_12", &[None, Some(0.0)]),
        ]);

        let summary = scanner().scan(&snapshot);
        assert_eq!(
            summary,
            ScanSummary {
                valve_devices: 2,
                reporting_channels: 3,
                open_channels: 1,
            }
        );
        assert!(scanner().any_valve_open(&snapshot));
    }

    #[test]
    fn test_all_closed_or_absent_is_closed() {
        let snapshot = DeviceSnapshot::new(vec![device(
            "a",
            "FLOOR_TERMINAL_BLOCK_12",
            &[None, Some(0.0), None],
        )]);
        assert!(!scanner().any_valve_open(&snapshot));
    }

    #[test]
    fn test_other_device_types_do_not_count() {
        let snapshot = DeviceSnapshot::new(vec![device(
            "t",
            "HEATING_THERMOSTAT",
            &[Some(0.9)],
        )]);
        assert_eq!(scanner().scan(&snapshot).valve_devices, 0);
        assert!(!scanner().any_valve_open(&snapshot));
    }

    #[test]
    fn test_empty_snapshot_is_closed() {
        assert!(!scanner().any_valve_open(&DeviceSnapshot::default()));
    }
}
