//! Valve-driven heating switch for HomematicIP installations
//!
//! Watches the valve positions reported by floor-heating terminal blocks and
//! keeps one switchable outlet (typically powering a circulation pump) on
//! while at least one valve is open, and off once all valves are closed.
//!
//! # Features
//!
//! - Push notifications over the HomematicIP cloud websocket
//! - Periodic full-state sync as a backstop for missed events
//! - Single serialized state machine, commands sent only on change
//! - INI configuration compatible with the access point pairing tools

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod services;

// Test support modules - available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

// Re-export main types for convenience
pub use client::{DeviceSnapshot, DeviceStateClient, HmipClient, HmipSwitch, SwitchActuator};
pub use config::SwitchConfig;
pub use error::{Result, ValveSwitchError};
pub use services::{Dispatcher, Reconciler, SwitchState, TriggerSource};
