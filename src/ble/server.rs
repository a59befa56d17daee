//! GATT Server
//!
//! Registers the Environmental Sensing service with its single Temperature
//! characteristic (read + indicate) and tracks whether the connected peer has
//! enabled indications.

use core::sync::atomic::{AtomicBool, Ordering};

use defmt::{debug, info, Format};
use nrf_softdevice::ble::gatt_server::builder::ServiceBuilder;
use nrf_softdevice::ble::gatt_server::characteristic::{Attribute, Metadata, Properties};
use nrf_softdevice::ble::gatt_server::{self, RegisterError, WriteOp};
use nrf_softdevice::ble::{Connection, Uuid};
use nrf_softdevice::Softdevice;

use crate::ble::attribute::{AttributeHandle, AttributeStore, FRESH_VALUE, INITIAL_VALUE, VALUE_LEN};
use crate::config::{ENVIRONMENTAL_SENSING_SERVICE, TEMPERATURE_CHARACTERISTIC};
use crate::error::{AttributeWriteError, InitializationError};

/// CCCD bit enabling indications
const CCCD_INDICATE: u8 = 0x02;

/// GATT server events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum ServerEvent {
    /// Peer changed its indication subscription
    IndicationsChanged { enabled: bool },
}

pub struct TemperatureServer {
    value_handle: AttributeHandle,
    cccd_handle: u16,
    indications: AtomicBool,
}

impl TemperatureServer {
    /// Register the service. Must run before the SoftDevice task is spawned.
    pub fn new(sd: &mut Softdevice) -> Result<Self, InitializationError> {
        let mut sb = ServiceBuilder::new(sd, Uuid::new_16(ENVIRONMENTAL_SENSING_SERVICE)).map_err(registration)?;

        let attr = Attribute::new(INITIAL_VALUE);
        let metadata = Metadata::new(Properties::new().read().indicate());
        let handles = sb
            .add_characteristic(Uuid::new_16(TEMPERATURE_CHARACTERISTIC), attr, metadata)
            .map_err(registration)?
            .build();
        sb.build();

        let value_handle = AttributeHandle::new(handles.value_handle).ok_or(InitializationError::InvalidHandle)?;
        info!(
            "GATT: temperature characteristic registered, value {=u16}, cccd {=u16}",
            handles.value_handle, handles.cccd_handle
        );

        Ok(Self {
            value_handle,
            cccd_handle: handles.cccd_handle,
            indications: AtomicBool::new(false),
        })
    }

    pub fn value_handle(&self) -> AttributeHandle {
        self.value_handle
    }

    pub fn indications_enabled(&self) -> bool {
        self.indications.load(Ordering::Relaxed)
    }

    /// Forget the previous peer's subscription
    pub fn reset_subscription(&self) {
        self.indications.store(false, Ordering::Relaxed);
    }
}

fn registration(_: RegisterError) -> InitializationError {
    InitializationError::ServiceRegistration
}

impl gatt_server::Server for TemperatureServer {
    type Event = ServerEvent;

    fn on_write(&self, _conn: &Connection, handle: u16, _op: WriteOp, _offset: usize, data: &[u8]) -> Option<Self::Event> {
        if handle != self.cccd_handle || data.is_empty() {
            debug!("GATT: ignoring write to handle {=u16}", handle);
            return None;
        }

        let enabled = data[0] & CCCD_INDICATE != 0;
        self.indications.store(enabled, Ordering::Relaxed);
        Some(ServerEvent::IndicationsChanged { enabled })
    }
}

/// Attribute storage in the SoftDevice's attribute table
pub struct SoftdeviceStore {
    sd: &'static Softdevice,
}

impl SoftdeviceStore {
    pub fn new(sd: &'static Softdevice) -> Self {
        Self { sd }
    }
}

impl AttributeStore for SoftdeviceStore {
    fn write(&mut self, handle: AttributeHandle, value: &[u8; VALUE_LEN]) -> Result<(), AttributeWriteError> {
        gatt_server::set_value(self.sd, handle.raw(), value).map_err(|_| AttributeWriteError::Rejected)?;
        FRESH_VALUE.signal(*value);
        Ok(())
    }
}
