//! Valve-driven switching services
//!
//! Extraction and scanning turn device data into an aggregate "any valve open"
//! observation; the reconciler turns observations into switch commands; the
//! dispatcher wires push events and periodic syncs into the reconciler.

pub mod dispatcher;
pub mod reconciler;
pub mod valve_extractor;
pub mod valve_scanner;

pub use dispatcher::{DispatchStats, Dispatcher};
pub use reconciler::{Reconciler, ReconcilerStats, SwitchState, Transition, TriggerSource};
pub use valve_extractor::{any_open, ValveReading, ValveSignalExtractor};
pub use valve_scanner::{ScanSummary, SnapshotValveScanner};
