//! Sensor Acquisition Loop
//!
//! Runs on its own task. After a one-time identity check and configuration it
//! cycles forever: trigger a one-shot measurement, let it settle, read the high
//! and low result bytes, publish the combined sample, rest.
//!
//! Every failure is reported (logged, counted, kept as `last_error`) and the
//! loop carries on: sampling must never stall the device.

use defmt::{debug, info, warn, Format};
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;

use crate::ble::attribute::{AttributeStore, TemperatureAttribute, VALUE_LEN};
use crate::config::SensorConfig;
use crate::error::{BusError, Error};
use crate::sensor::bus::BusClient;
use crate::sensor::registers;

/// One uncalibrated measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct Sample(u16);

impl Sample {
    /// Combine independently read result bytes, high byte first
    pub const fn from_bytes(high: u8, low: u8) -> Self {
        Self(((high as u16) << 8) | low as u16)
    }

    pub const fn value(self) -> u16 {
        self.0
    }

    /// Attribute wire order: low byte first
    pub const fn wire_bytes(self) -> [u8; VALUE_LEN] {
        self.0.to_le_bytes()
    }
}

/// Acquisition states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum AcquisitionState {
    Identify,
    Configure,
    MeasureTrigger,
    Settle,
    ReadHigh,
    ReadLow { high: u8 },
    Publish { high: u8, low: u8 },
    Rest,
}

/// Acquisition counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Format)]
pub struct AcquisitionStats {
    /// Measurement cycles started
    pub cycles: u32,
    /// Samples produced
    pub samples: u32,
    /// Samples written into the attribute
    pub published: u32,
    /// Samples produced while the attribute handle was not yet valid
    pub unpublished: u32,
    pub bus_errors: u32,
    pub identity_mismatches: u32,
    pub publish_errors: u32,
}

pub struct Acquisition<'a, B, D, S> {
    bus: B,
    delay: D,
    store: S,
    attribute: &'a TemperatureAttribute,
    config: SensorConfig,
    state: AcquisitionState,
    identity: Option<u8>,
    sample: Option<Sample>,
    stats: AcquisitionStats,
    last_error: Option<Error>,
}

impl<'a, B, D, S> Acquisition<'a, B, D, S>
where
    B: BusClient,
    D: DelayNs,
    S: AttributeStore,
{
    pub fn new(bus: B, delay: D, store: S, attribute: &'a TemperatureAttribute, config: SensorConfig) -> Self {
        Self {
            bus,
            delay,
            store,
            attribute,
            config,
            state: AcquisitionState::Identify,
            identity: None,
            sample: None,
            stats: AcquisitionStats::default(),
            last_error: None,
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Most recent successfully read sample
    pub fn sample(&self) -> Option<Sample> {
        self.sample
    }

    /// Byte returned by the who-am-I register, if it could be read
    pub fn identity(&self) -> Option<u8> {
        self.identity
    }

    pub fn stats(&self) -> AcquisitionStats {
        self.stats
    }

    pub fn last_error(&self) -> Option<Error> {
        self.last_error
    }

    // Component accessors, for inspection from tests and diagnostics

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run forever
    pub async fn run(mut self) -> ! {
        info!("SENSOR: acquisition loop starting");
        loop {
            self.step().await;
        }
    }

    /// Execute the current state and move to the next one
    pub async fn step(&mut self) -> AcquisitionState {
        let next = match self.state {
            AcquisitionState::Identify => {
                self.identify().await;
                AcquisitionState::Configure
            }
            AcquisitionState::Configure => {
                self.configure().await;
                AcquisitionState::MeasureTrigger
            }
            AcquisitionState::MeasureTrigger => {
                self.stats.cycles += 1;
                let trigger = [registers::CTRL2, registers::CTRL2_ONE_SHOT];
                if let Err(e) = self.bus.write(self.config.write_address, &trigger, false).await {
                    self.report(e.into());
                }
                AcquisitionState::Settle
            }
            AcquisitionState::Settle => {
                self.sleep(self.config.settle).await;
                AcquisitionState::ReadHigh
            }
            AcquisitionState::ReadHigh => match self.read_register(registers::RESULT_HIGH).await {
                Ok(high) => AcquisitionState::ReadLow { high },
                Err(e) => {
                    self.report(e.into());
                    AcquisitionState::Rest
                }
            },
            AcquisitionState::ReadLow { high } => match self.read_register(registers::RESULT_LOW).await {
                Ok(low) => AcquisitionState::Publish { high, low },
                Err(e) => {
                    self.report(e.into());
                    AcquisitionState::Rest
                }
            },
            AcquisitionState::Publish { high, low } => {
                self.publish(Sample::from_bytes(high, low));
                AcquisitionState::Rest
            }
            AcquisitionState::Rest => {
                self.sleep(self.config.interval).await;
                AcquisitionState::MeasureTrigger
            }
        };
        self.state = next;
        next
    }

    /// Step until the loop is about to trigger the next measurement. The
    /// firmware uses [`run`](Self::run); this drives one cycle at a time.
    pub async fn run_cycle(&mut self) {
        loop {
            if self.step().await == AcquisitionState::MeasureTrigger {
                return;
            }
        }
    }

    async fn identify(&mut self) {
        let mut id = [0u8; 1];
        if let Err(e) = self
            .bus
            .write(self.config.write_address, &[registers::IDENTITY], true)
            .await
        {
            warn!("SENSOR: failed to address identity register");
            self.report(e.into());
        }
        if let Err(e) = self.bus.read(self.config.read_address, &mut id).await {
            warn!("SENSOR: failed to read identity register");
            self.report(e.into());
            return;
        }

        let found = id[0];
        self.identity = Some(found);
        info!("SENSOR: who-am-I {=u8:#x}", found);
        if found != self.config.expected_identity {
            self.report(Error::IdentityMismatch {
                expected: self.config.expected_identity,
                found,
            });
        }
    }

    async fn configure(&mut self) {
        let ctrl1 = [registers::CTRL1, registers::CTRL1_ENABLE_MSB_FIRST];
        match self.bus.write(self.config.write_address, &ctrl1, false).await {
            Ok(()) => debug!("SENSOR: configured"),
            Err(e) => self.report(e.into()),
        }
    }

    async fn read_register(&mut self, register: u8) -> Result<u8, BusError> {
        let mut byte = [0u8; 1];
        self.bus.write(self.config.write_address, &[register], true).await?;
        self.bus.read(self.config.read_address, &mut byte).await?;
        Ok(byte[0])
    }

    fn publish(&mut self, sample: Sample) {
        self.sample = Some(sample);
        self.stats.samples += 1;
        info!("SENSOR: uncalibrated temperature {=u16}", sample.value());

        let Some(handle) = self.attribute.handle() else {
            debug!("SENSOR: attribute not registered yet, sample kept locally");
            self.stats.unpublished += 1;
            return;
        };

        match self.store.write(handle, &sample.wire_bytes()) {
            Ok(()) => self.stats.published += 1,
            Err(e) => self.report(e.into()),
        }
    }

    async fn sleep(&mut self, duration: Duration) {
        self.delay.delay_ms(duration.as_millis() as u32).await;
    }

    fn report(&mut self, error: Error) {
        warn!("SENSOR: {:?}", error);
        match error {
            Error::BusTransaction(_) => self.stats.bus_errors += 1,
            Error::IdentityMismatch { .. } => self.stats.identity_mismatches += 1,
            Error::AttributeWrite(_) => self.stats.publish_errors += 1,
            _ => {}
        }
        self.last_error = Some(error);
    }
}
