#![no_std]

//! nRF52840 S140 Temperature Peripheral Library
//!
//! Firmware core, organized into:
//!
//! - `sensor`: bus client and the acquisition loop
//! - `ble`: advertising, connection state machine, GATT attribute publication
//! - `config`: compile-time defaults
//! - `error`: error taxonomy

pub mod ble;
pub mod config;
pub mod error;
pub mod sensor;
