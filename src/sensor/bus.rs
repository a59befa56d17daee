//! Bus Transaction Client
//!
//! Addressed register writes and reads on the two-wire bus. Addresses are given
//! in their 8-bit read/write form and mapped to the 7-bit bus address here.
//!
//! A write issued with `hold_bus` set leaves the bus without a STOP: the
//! register pointer is kept pending and sent as the write half of a
//! repeated-start transfer by the next read to the same device. There are no
//! retries at this level.

use defmt::trace;
use embedded_hal_async::i2c::{Error as _, I2c, SevenBitAddress};
use heapless::Vec;

use crate::error::BusError;

/// Longest register pointer that can be held across a repeated start
pub const MAX_POINTER_LEN: usize = 4;

/// Register-oriented bus access used by the acquisition loop
#[allow(async_fn_in_trait)]
pub trait BusClient {
    /// Write `bytes` to the device. With `hold_bus` the transfer is not
    /// terminated so the next read can follow with a repeated start.
    async fn write(&mut self, address: u8, bytes: &[u8], hold_bus: bool) -> Result<(), BusError>;

    /// Fill `buffer` from the device
    async fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), BusError>;
}

/// Map an 8-bit read/write address to the 7-bit bus address
pub const fn seven_bit(address: u8) -> SevenBitAddress {
    address >> 1
}

struct PendingPointer {
    address: SevenBitAddress,
    bytes: Vec<u8, MAX_POINTER_LEN>,
}

/// [`BusClient`] over any `embedded-hal-async` I2C controller
pub struct I2cBus<I> {
    i2c: I,
    pending: Option<PendingPointer>,
}

impl<I: I2c> I2cBus<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c, pending: None }
    }

    /// Borrow the underlying controller. Inspection hook for tests and
    /// diagnostics; the firmware only goes through [`BusClient`].
    pub fn inner(&self) -> &I {
        &self.i2c
    }

    /// Whether a held register pointer is waiting for its read (inspection hook)
    pub fn has_pending_pointer(&self) -> bool {
        self.pending.is_some()
    }

    /// Send a held pointer that never got its read as a plain write
    async fn flush(&mut self) -> Result<(), BusError> {
        match self.pending.take() {
            Some(pointer) => {
                trace!("BUS: flushing held pointer to {=u8:#x}", pointer.address);
                self.i2c.write(pointer.address, &pointer.bytes).await.map_err(bus_error)
            }
            None => Ok(()),
        }
    }
}

impl<I: I2c> BusClient for I2cBus<I> {
    async fn write(&mut self, address: u8, bytes: &[u8], hold_bus: bool) -> Result<(), BusError> {
        if bytes.is_empty() {
            return Err(BusError::EmptyTransfer);
        }
        self.flush().await?;

        let address = seven_bit(address);
        if hold_bus {
            let bytes = Vec::from_slice(bytes).map_err(|_| BusError::PointerTooLong)?;
            self.pending = Some(PendingPointer { address, bytes });
            return Ok(());
        }

        trace!("BUS: write {=u8:#x} {=[u8]:#x}", address, bytes);
        self.i2c.write(address, bytes).await.map_err(bus_error)
    }

    async fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), BusError> {
        if buffer.is_empty() {
            return Err(BusError::EmptyTransfer);
        }

        let address = seven_bit(address);
        match self.pending.take() {
            Some(pointer) if pointer.address == address => {
                trace!("BUS: write_read {=u8:#x} {=[u8]:#x}", address, &pointer.bytes[..]);
                self.i2c
                    .write_read(address, &pointer.bytes, buffer)
                    .await
                    .map_err(bus_error)
            }
            Some(pointer) => {
                // Pointer was for another device: terminate it before reading
                self.i2c.write(pointer.address, &pointer.bytes).await.map_err(bus_error)?;
                self.i2c.read(address, buffer).await.map_err(bus_error)
            }
            None => self.i2c.read(address, buffer).await.map_err(bus_error),
        }
    }
}

fn bus_error<E: embedded_hal_async::i2c::Error>(e: E) -> BusError {
    e.kind().into()
}
