//! Attribute Publication Channel
//!
//! The temperature attribute is a single update-in-place slot. Its handle is
//! assigned exactly once by the event context after service registration and
//! never changes afterwards, so the acquisition loop can read it without a
//! lock. The value itself lives in the link stack's attribute table.

use defmt::Format;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::once_lock::OnceLock;
use embassy_sync::signal::Signal;

use crate::error::AttributeWriteError;

/// Size of the published value
pub const VALUE_LEN: usize = 2;

/// Placeholder value registered before the first sample
pub const INITIAL_VALUE: [u8; VALUE_LEN] = [0, 0];

/// GATT value handle of a registered characteristic (never zero)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct AttributeHandle(u16);

impl AttributeHandle {
    /// Returns `None` for the invalid handle 0
    pub const fn new(raw: u16) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub const fn raw(self) -> u16 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum AttributeError {
    /// The slot already has a handle
    AlreadyAssigned { current: AttributeHandle },
}

/// Write-once holder for the temperature attribute's handle
pub struct TemperatureAttribute {
    handle: OnceLock<AttributeHandle>,
}

impl TemperatureAttribute {
    pub const fn new() -> Self {
        Self { handle: OnceLock::new() }
    }

    /// Hand the registered handle over to readers. Only the first call wins.
    pub fn assign(&self, handle: AttributeHandle) -> Result<(), AttributeError> {
        self.handle.init(handle).map_err(|_| AttributeError::AlreadyAssigned {
            current: self.handle.try_get().copied().unwrap_or(handle),
        })
    }

    /// The handle, once service registration has completed
    pub fn handle(&self) -> Option<AttributeHandle> {
        self.handle.try_get().copied()
    }

    pub fn is_valid(&self) -> bool {
        self.handle().is_some()
    }
}

impl Default for TemperatureAttribute {
    fn default() -> Self {
        Self::new()
    }
}

/// The firmware's temperature attribute
pub static TEMPERATURE: TemperatureAttribute = TemperatureAttribute::new();

/// Latest published value, picked up by the radio task for indications
pub static FRESH_VALUE: Signal<CriticalSectionRawMutex, [u8; VALUE_LEN]> = Signal::new();

/// Storage behind attribute handles
pub trait AttributeStore {
    /// Replace the value stored under `handle`
    fn write(&mut self, handle: AttributeHandle, value: &[u8; VALUE_LEN]) -> Result<(), AttributeWriteError>;
}
