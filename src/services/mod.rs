//! Connectivity business logic
//!
//! This module contains the connectivity state machine and the components
//! acting on it, separated from HTTP concerns.

pub mod access_point;
pub mod indicator;
pub mod monitor;
pub mod probe;
pub mod provisioning;
pub mod radio;
pub mod registry;
pub mod state;
pub mod uplink;

#[cfg(test)]
pub(crate) mod fake_driver;
