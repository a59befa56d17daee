//! Common test utilities and setup for embedded tests
//!
//! This module provides shared functionality for all defmt-test based tests:
//! - Global logger, panic handler and heap
//! - Scripted bus, delay, attribute store and link doubles

#![allow(dead_code)]

// Re-export commonly used items for tests (except conflicting macros)
pub use defmt_rtt as _; // global logger
// Also need the same embassy dependencies as the main firmware
pub use embassy_executor as _;
// Use nrf-softdevice which provides both interrupt vectors and critical section
pub use nrf_softdevice as _;
pub use panic_probe as _; // panic handler
pub use {embassy_nrf as _, embassy_sync as _, embassy_time as _};

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use embedded_alloc::LlffHeap as Heap;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{ErrorKind, ErrorType, I2c, Operation};
use nrf52840_thermo_peripheral::ble::advertising::AdvertisingPayload;
use nrf52840_thermo_peripheral::ble::attribute::{AttributeHandle, AttributeStore, VALUE_LEN};
use nrf52840_thermo_peripheral::ble::link::LinkControl;
use nrf52840_thermo_peripheral::config::AdvDuration;
use nrf52840_thermo_peripheral::error::{AdvertisingConfigurationError, AttributeWriteError, BusError};
use nrf52840_thermo_peripheral::sensor::bus::BusClient;

// Global allocator for proptest and the recording doubles
#[global_allocator]
pub static HEAP: Heap = Heap::empty();

// Define the global allocator backing store - 16KB heap for proptest
pub static mut HEAP_MEM: [u8; 16384] = [0; 16384];

// Global flag to ensure heap is only initialized once
static HEAP_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Ensure heap is initialized exactly once
pub fn ensure_heap_initialized() {
    if !HEAP_INITIALIZED.swap(true, Ordering::Relaxed) {
        unsafe {
            let ptr = core::ptr::addr_of_mut!(HEAP_MEM) as *mut u8;
            HEAP.init(ptr as usize, 16384);
        }
    }
}

// -----------------------------------------------------------------------------
// Bus doubles
// -----------------------------------------------------------------------------

/// Transfer seen by [`ScriptedBus`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    Write { address: u8, bytes: Vec<u8>, hold_bus: bool },
    Read { address: u8, len: usize },
}

/// [`BusClient`] that replays scripted read results and records every transfer
pub struct ScriptedBus {
    pub ops: Vec<BusOp>,
    reads: VecDeque<Result<u8, BusError>>,
    failing_registers: Vec<(u8, BusError)>,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            reads: VecDeque::new(),
            failing_registers: Vec::new(),
        }
    }

    /// Queue bytes returned by the next reads, in order
    pub fn with_reads(mut self, bytes: &[u8]) -> Self {
        self.reads.extend(bytes.iter().map(|b| Ok(*b)));
        self
    }

    pub fn push_read(&mut self, result: Result<u8, BusError>) {
        self.reads.push_back(result);
    }

    /// Every write whose first byte is `register` fails with `error`
    pub fn fail_writes_to(&mut self, register: u8, error: BusError) {
        self.failing_registers.push((register, error));
    }

    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                BusOp::Write { address, bytes, .. } => Some((*address, bytes.clone())),
                BusOp::Read { .. } => None,
            })
            .collect()
    }

    /// How many writes started with `register`
    pub fn writes_to(&self, register: u8) -> usize {
        self.writes().iter().filter(|(_, bytes)| bytes.first() == Some(&register)).count()
    }
}

impl BusClient for ScriptedBus {
    async fn write(&mut self, address: u8, bytes: &[u8], hold_bus: bool) -> Result<(), BusError> {
        self.ops.push(BusOp::Write {
            address,
            bytes: bytes.to_vec(),
            hold_bus,
        });
        match self.failing_registers.iter().find(|(reg, _)| bytes.first() == Some(reg)) {
            Some((_, error)) => Err(*error),
            None => Ok(()),
        }
    }

    async fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), BusError> {
        self.ops.push(BusOp::Read {
            address,
            len: buffer.len(),
        });
        for slot in buffer.iter_mut() {
            *slot = self.reads.pop_front().unwrap_or(Ok(0))?;
        }
        Ok(())
    }
}

/// Operation seen by [`ScriptedI2c`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum I2cOp {
    Write { address: u8, bytes: Vec<u8> },
    Read { address: u8, len: usize },
    WriteRead { address: u8, bytes: Vec<u8>, len: usize },
}

/// `embedded-hal-async` I2C controller double
pub struct ScriptedI2c {
    pub ops: Vec<I2cOp>,
    /// Byte every read is filled with
    pub fill: u8,
    /// When set, every transaction fails with this kind
    pub fail_with: Option<ErrorKind>,
}

impl ScriptedI2c {
    pub fn new(fill: u8) -> Self {
        Self {
            ops: Vec::new(),
            fill,
            fail_with: None,
        }
    }

    pub fn failing(kind: ErrorKind) -> Self {
        Self {
            ops: Vec::new(),
            fill: 0,
            fail_with: Some(kind),
        }
    }
}

impl ErrorType for ScriptedI2c {
    type Error = ErrorKind;
}

impl I2c for ScriptedI2c {
    async fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        let op = match operations {
            [Operation::Write(bytes)] => I2cOp::Write {
                address,
                bytes: bytes.to_vec(),
            },
            [Operation::Read(buffer)] => I2cOp::Read {
                address,
                len: buffer.len(),
            },
            [Operation::Write(bytes), Operation::Read(buffer)] => I2cOp::WriteRead {
                address,
                bytes: bytes.to_vec(),
                len: buffer.len(),
            },
            _ => return Err(ErrorKind::Other),
        };
        self.ops.push(op);

        if let Some(kind) = self.fail_with {
            return Err(kind);
        }
        for operation in operations.iter_mut() {
            if let Operation::Read(buffer) = operation {
                buffer.fill(self.fill);
            }
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Delay, attribute store and link doubles
// -----------------------------------------------------------------------------

/// Delay that returns immediately and remembers every requested wait
#[derive(Default)]
pub struct RecordingDelay {
    pub waits_ms: Vec<u32>,
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.waits_ms.push(ns / 1_000_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.waits_ms.push(ms);
    }
}

/// Attribute store that records writes
#[derive(Default)]
pub struct RecordingStore {
    pub writes: Vec<(u16, [u8; VALUE_LEN])>,
    pub reject: bool,
}

impl AttributeStore for RecordingStore {
    fn write(&mut self, handle: AttributeHandle, value: &[u8; VALUE_LEN]) -> Result<(), AttributeWriteError> {
        if self.reject {
            return Err(AttributeWriteError::Rejected);
        }
        self.writes.push((handle.raw(), *value));
        Ok(())
    }
}

/// Command seen by [`RecordingLink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    Configure(Vec<u8>),
    Start { duration: AdvDuration, run: u32 },
    Stop,
}

/// Link stack double
#[derive(Default)]
pub struct RecordingLink {
    pub commands: Vec<LinkCommand>,
    pub reject_configure: bool,
    pub reject_start: bool,
    pub reject_stop: bool,
}

impl RecordingLink {
    pub fn starts(&self) -> usize {
        self.commands.iter().filter(|c| matches!(c, LinkCommand::Start { .. })).count()
    }

    pub fn stops(&self) -> usize {
        self.commands.iter().filter(|c| matches!(c, LinkCommand::Stop)).count()
    }

    pub fn last_start(&self) -> Option<AdvDuration> {
        self.commands.iter().rev().find_map(|c| match c {
            LinkCommand::Start { duration, .. } => Some(*duration),
            _ => None,
        })
    }

    /// Run number of the most recent start
    pub fn last_run(&self) -> Option<u32> {
        self.commands.iter().rev().find_map(|c| match c {
            LinkCommand::Start { run, .. } => Some(*run),
            _ => None,
        })
    }
}

impl LinkControl for RecordingLink {
    fn configure_advertising(&mut self, payload: AdvertisingPayload) -> Result<(), AdvertisingConfigurationError> {
        if self.reject_configure {
            return Err(AdvertisingConfigurationError::CommandRejected);
        }
        self.commands.push(LinkCommand::Configure(payload.as_bytes().to_vec()));
        Ok(())
    }

    fn start_advertising(&mut self, duration: AdvDuration, run: u32) -> Result<(), AdvertisingConfigurationError> {
        if self.reject_start {
            return Err(AdvertisingConfigurationError::CommandRejected);
        }
        self.commands.push(LinkCommand::Start { duration, run });
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), AdvertisingConfigurationError> {
        if self.reject_stop {
            return Err(AdvertisingConfigurationError::CommandRejected);
        }
        self.commands.push(LinkCommand::Stop);
        Ok(())
    }
}
