//! Error Taxonomy
//!
//! Every failure the firmware can observe after bring-up. None of these are
//! escalated to a panic: acquisition errors are logged and counted, advertising
//! configuration errors end the advertising attempt, initialization errors skip
//! the rest of the start-up sequence.

use defmt::Format;
use embedded_hal_async::i2c::{ErrorKind, NoAcknowledgeSource};

/// Bus-level transaction failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum BusError {
    /// Device did not acknowledge its address
    AddressNack,
    /// Device did not acknowledge a data byte
    DataNack,
    /// Another controller won arbitration
    ArbitrationLoss,
    /// Bus error (misplaced START/STOP)
    Bus,
    /// Receive overrun
    Overrun,
    /// Zero-length transfer requested
    EmptyTransfer,
    /// Register pointer too long for the pending buffer
    PointerTooLong,
    /// Any other driver-reported failure
    Other,
}

impl From<ErrorKind> for BusError {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data) => BusError::DataNack,
            ErrorKind::NoAcknowledge(_) => BusError::AddressNack,
            ErrorKind::ArbitrationLoss => BusError::ArbitrationLoss,
            ErrorKind::Bus => BusError::Bus,
            ErrorKind::Overrun => BusError::Overrun,
            _ => BusError::Other,
        }
    }
}

/// Publishing a sample into the attribute table failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum AttributeWriteError {
    /// The link stack rejected the value
    Rejected,
}

/// Assembling or applying the advertising payload failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum AdvertisingConfigurationError {
    /// Payload does not fit a legacy advertising PDU
    PayloadTooLarge,
    /// Device name is empty
    EmptyName,
    /// The radio did not accept the advertising command
    CommandRejected,
}

/// Link stack failed to come up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum InitializationError {
    /// GATT service or characteristic registration failed
    ServiceRegistration,
    /// Registration produced an unusable (zero) value handle
    InvalidHandle,
}

/// Firmware-wide error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum Error {
    BusTransaction(BusError),
    IdentityMismatch { expected: u8, found: u8 },
    AdvertisingConfiguration(AdvertisingConfigurationError),
    AttributeWrite(AttributeWriteError),
    Initialization(InitializationError),
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Error::BusTransaction(e)
    }
}

impl From<AttributeWriteError> for Error {
    fn from(e: AttributeWriteError) -> Self {
        Error::AttributeWrite(e)
    }
}

impl From<AdvertisingConfigurationError> for Error {
    fn from(e: AdvertisingConfigurationError) -> Self {
        Error::AdvertisingConfiguration(e)
    }
}

impl From<InitializationError> for Error {
    fn from(e: InitializationError) -> Self {
        Error::Initialization(e)
    }
}
