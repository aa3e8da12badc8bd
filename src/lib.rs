//! BLE central gateway.
//!
//! Drivers register the peripherals they care about (advertised name
//! prefix, service UUID, characteristic UUID, ready hook).  The gateway
//! scans for them, connects to the first matching advertiser, resolves the
//! characteristic and then lets the driver write raw bytes to it.
//!
//! The protocol host is abstracted by [`ble::BleHost`]; its completions
//! are fed back as [`ble::HostEvent`]s through [`Gateway::post`] and
//! processed by [`Gateway::run`].
//!
//! Logging goes through `defmt` or `log`, selected by the crate feature
//! of the same name.

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible in every module.
#[macro_use]
mod fmt;

pub mod accessory;
pub mod ble;
pub mod config;
pub mod error;
pub mod gateway;

pub use ble::{BleHost, DeviceConfig, DeviceHandle, HostEvent, LinkState};
pub use config::GatewayConfig;
pub use error::{Error, HostError, LinkFailure, RegistrationError, WriteError};
pub use gateway::Gateway;
