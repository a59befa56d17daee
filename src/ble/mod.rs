//! BLE Peripheral
//!
//! Advertising, the connection state machine, the GATT server and the
//! attribute the acquisition loop publishes into.

pub mod advertising;
pub mod attribute;
pub mod events;
pub mod link;
pub mod radio;
pub mod server;
