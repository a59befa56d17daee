//! SoftDevice Radio Adapter
//!
//! Bridges the connection state machine and nrf-softdevice. The state machine
//! talks to [`SoftdeviceLink`], which queues [`AdvCommand`]s; the radio task
//! executes them with `advertise_connectable`, serves the GATT server while a
//! peer is connected and posts the resulting lifecycle events.

use defmt::{debug, error, info, warn};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use nrf_softdevice::ble::gatt_server;
use nrf_softdevice::ble::peripheral::{self, AdvertiseError, ConnectableAdvertisement};
use nrf_softdevice::ble::Connection;
use nrf_softdevice::Softdevice;

use crate::ble::advertising::AdvertisingPayload;
use crate::ble::attribute::FRESH_VALUE;
use crate::ble::events::{post, AdvEndReason, LinkEvent};
use crate::ble::link::LinkControl;
use crate::ble::server::{ServerEvent, TemperatureServer};
use crate::config::{AdvDuration, AdvertisingConfig};
use crate::error::AdvertisingConfigurationError;

/// Advertising command types
#[derive(Debug, defmt::Format)]
pub enum AdvCommand {
    /// Replace the payload used by later starts
    Configure(AdvertisingPayload),
    Start { duration: AdvDuration, run: u32 },
    Stop,
}

/// Command channel for advertising control
static ADV_COMMANDS: Channel<CriticalSectionRawMutex, AdvCommand, 4> = Channel::new();

/// [`LinkControl`] that forwards commands to the radio task
pub struct SoftdeviceLink {
    configured: bool,
}

impl SoftdeviceLink {
    pub const fn new() -> Self {
        Self { configured: false }
    }

    fn send(&self, cmd: AdvCommand) -> Result<(), AdvertisingConfigurationError> {
        ADV_COMMANDS.try_send(cmd).map_err(|TrySendError::Full(cmd)| {
            error!("RADIO: command queue full, dropping {:?}", cmd);
            AdvertisingConfigurationError::CommandRejected
        })
    }
}

impl Default for SoftdeviceLink {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkControl for SoftdeviceLink {
    fn configure_advertising(&mut self, payload: AdvertisingPayload) -> Result<(), AdvertisingConfigurationError> {
        debug!("RADIO: advertising payload {:?}", payload);
        self.send(AdvCommand::Configure(payload))?;
        self.configured = true;
        Ok(())
    }

    fn start_advertising(&mut self, duration: AdvDuration, run: u32) -> Result<(), AdvertisingConfigurationError> {
        if !self.configured {
            return Err(AdvertisingConfigurationError::CommandRejected);
        }
        self.send(AdvCommand::Start { duration, run })
    }

    fn stop_advertising(&mut self) -> Result<(), AdvertisingConfigurationError> {
        self.send(AdvCommand::Stop)
    }
}

/// Wait for the next start command. Payload updates are kept, stale stops dropped.
async fn next_start(payload: &mut Option<AdvertisingPayload>) -> (AdvDuration, u32) {
    loop {
        match ADV_COMMANDS.receive().await {
            AdvCommand::Configure(update) => *payload = Some(update),
            AdvCommand::Start { duration, run } => return (duration, run),
            AdvCommand::Stop => debug!("RADIO: not advertising, stop ignored"),
        }
    }
}

/// Resolve once a stop command arrives. Payload updates are kept for the next
/// run, repeated starts are dropped.
async fn stop_requested(next_payload: &mut Option<AdvertisingPayload>) {
    loop {
        match ADV_COMMANDS.receive().await {
            AdvCommand::Stop => return,
            AdvCommand::Configure(update) => *next_payload = Some(update),
            AdvCommand::Start { run, .. } => debug!("RADIO: already advertising, start of run {=u32} ignored", run),
        }
    }
}

/// Radio task: advertising, connection service and lifecycle event posting
#[embassy_executor::task]
pub async fn radio_task(sd: &'static Softdevice, server: TemperatureServer, config: AdvertisingConfig) {
    info!("RADIO: task started");

    let mut payload: Option<AdvertisingPayload> = None;
    loop {
        let (duration, run) = next_start(&mut payload).await;
        let Some(active) = payload.take() else {
            warn!("RADIO: start of run {=u32} without a payload", run);
            post(LinkEvent::AdvertisingEnded {
                run,
                reason: AdvEndReason::Unspecified,
            })
            .await;
            continue;
        };

        let adv_config = peripheral::Config {
            interval: config.interval,
            timeout: duration.as_timeout(),
            ..Default::default()
        };
        let adv = ConnectableAdvertisement::ScannableUndirected {
            adv_data: active.as_bytes(),
            scan_data: &[],
        };

        post(LinkEvent::AdvertisingStarted).await;
        let outcome = select(
            peripheral::advertise_connectable(sd, adv, &adv_config),
            stop_requested(&mut payload),
        )
        .await;
        if payload.is_none() {
            payload = Some(active);
        }

        let reason = match outcome {
            Either::First(Ok(conn)) => {
                let conn_handle = conn.handle().unwrap_or(0);
                // Connection first: the state machine then issues its own stop,
                // which next_start discards since the SoftDevice already stopped.
                post(LinkEvent::ConnectionComplete { conn_handle }).await;
                post(LinkEvent::AdvertisingEnded {
                    run,
                    reason: AdvEndReason::Connected,
                })
                .await;

                serve(&conn, &server).await;

                post(LinkEvent::DisconnectionComplete { conn_handle }).await;
                continue;
            }
            Either::First(Err(AdvertiseError::Timeout)) => AdvEndReason::Timeout,
            Either::First(Err(e)) => {
                warn!("RADIO: advertising failed: {:?}", defmt::Debug2Format(&e));
                AdvEndReason::Unspecified
            }
            Either::Second(()) => AdvEndReason::Stopped,
        };
        post(LinkEvent::AdvertisingEnded { run, reason }).await;
    }
}

/// Run the GATT server and push indications until the peer disconnects
async fn serve(conn: &Connection, server: &TemperatureServer) {
    server.reset_subscription();
    FRESH_VALUE.reset();

    let gatt = gatt_server::run(conn, server, |event| match event {
        ServerEvent::IndicationsChanged { enabled } => info!("RADIO: indications enabled: {}", enabled),
    });

    let result = select(gatt, indicate_fresh_values(conn, server)).await;
    if let Either::First(e) = result {
        debug!("RADIO: GATT server ended: {:?}", defmt::Debug2Format(&e));
    }
}

async fn indicate_fresh_values(conn: &Connection, server: &TemperatureServer) {
    loop {
        let value = FRESH_VALUE.wait().await;
        if !server.indications_enabled() {
            continue;
        }
        if let Err(e) = gatt_server::indicate_value(conn, server.value_handle().raw(), &value) {
            warn!("RADIO: indication failed: {:?}", defmt::Debug2Format(&e));
        }
    }
}
