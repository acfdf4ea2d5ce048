//! Common test utilities

#![allow(dead_code)]

pub mod hmip_mock;
pub mod test_fixtures;

pub use hmip_mock::MockHmipCloud;
pub use test_fixtures::*;
