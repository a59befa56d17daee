//! Connection State Machine
//!
//! Owns the link state and is the only component that starts or stops
//! advertising. It reacts to [`LinkEvent`]s and issues commands through a
//! [`LinkControl`] implementation; it never touches sample data.
//!
//! ```text
//! Idle --start--> Advertising --connect--> Connected --disconnect--> Advertising
//!                     |
//!                     +--advertising ended--> Idle
//! ```

use defmt::{debug, error, info, warn, Format};

use crate::ble::advertising::AdvertisingPayload;
use crate::ble::attribute::{AttributeHandle, TemperatureAttribute};
use crate::ble::events::{AdvEndReason, LinkEvent};
use crate::config::{AdvDuration, AdvertisingConfig};
use crate::error::{AdvertisingConfigurationError, Error, InitializationError};

/// Radio connectivity phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum LinkState {
    Idle,
    Advertising,
    Connected,
}

/// Advertising commands towards the link stack
pub trait LinkControl {
    /// Install the advertising payload used by subsequent starts
    fn configure_advertising(&mut self, payload: AdvertisingPayload) -> Result<(), AdvertisingConfigurationError>;

    /// Begin advertising run number `run`. The stack tags the matching
    /// [`LinkEvent::AdvertisingEnded`] with the same number.
    fn start_advertising(&mut self, duration: AdvDuration, run: u32) -> Result<(), AdvertisingConfigurationError>;

    fn stop_advertising(&mut self) -> Result<(), AdvertisingConfigurationError>;
}

/// Link lifecycle counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Format)]
pub struct LinkStats {
    pub connections: u32,
    pub disconnections: u32,
    /// Advertising runs started; the latest one is the current run number
    pub advertising_starts: u32,
    pub advertising_stops: u32,
    /// Events that arrived before the machine registered as event sink
    pub dropped_events: u32,
}

pub struct ConnectionStateMachine<'a, L> {
    link: L,
    config: AdvertisingConfig,
    attribute: &'a TemperatureAttribute,
    state: LinkState,
    advertising: bool,
    event_sink: bool,
    stats: LinkStats,
    last_error: Option<Error>,
}

impl<'a, L: LinkControl> ConnectionStateMachine<'a, L> {
    pub fn new(link: L, config: AdvertisingConfig, attribute: &'a TemperatureAttribute) -> Self {
        Self {
            link,
            config,
            attribute,
            state: LinkState::Idle,
            advertising: false,
            event_sink: false,
            stats: LinkStats::default(),
            last_error: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    /// Whether start-up completed and lifecycle events are being handled
    pub fn is_event_sink(&self) -> bool {
        self.event_sink
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn last_error(&self) -> Option<Error> {
        self.last_error
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Apply one lifecycle event
    pub fn dispatch(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::StackInitialized(status) => self.on_stack_initialized(status),
            _ if !self.event_sink => {
                warn!("LINK: dropping {:?}, not registered for events", event);
                self.stats.dropped_events += 1;
            }
            LinkEvent::AdvertisingStarted => info!("LINK: advertising started"),
            LinkEvent::AdvertisingEnded { run, reason } => self.on_advertising_ended(run, reason),
            LinkEvent::ConnectionComplete { conn_handle } => self.on_connected(conn_handle),
            LinkEvent::DisconnectionComplete { conn_handle } => self.on_disconnected(conn_handle),
        }
    }

    /// Configure the advertising payload and begin advertising. A failure
    /// here is terminal for advertising: the device stays undiscoverable.
    pub fn start(&mut self) -> Result<(), Error> {
        if let Err(e) = self.configure_and_advertise() {
            error!("LINK: advertising setup failed: {:?}", e);
            self.report(e.into());
            return Err(e.into());
        }
        self.event_sink = true;
        Ok(())
    }

    /// Start advertising unless already advertising
    pub fn start_advertising(&mut self) -> Result<(), AdvertisingConfigurationError> {
        self.advertise(self.config.duration)
    }

    /// Stop advertising unless already stopped
    pub fn stop_advertising(&mut self) -> Result<(), AdvertisingConfigurationError> {
        if !self.advertising {
            debug!("LINK: advertising already stopped");
            return Ok(());
        }
        self.link.stop_advertising()?;
        self.advertising = false;
        self.stats.advertising_stops += 1;
        if self.state == LinkState::Advertising {
            self.state = LinkState::Idle;
        }
        Ok(())
    }

    fn configure_and_advertise(&mut self) -> Result<(), AdvertisingConfigurationError> {
        let payload = AdvertisingPayload::from_config(&self.config)?;
        self.link.configure_advertising(payload)?;
        self.advertise(self.config.duration)
    }

    fn advertise(&mut self, duration: AdvDuration) -> Result<(), AdvertisingConfigurationError> {
        if self.advertising {
            debug!("LINK: already advertising");
            return Ok(());
        }
        let run = self.stats.advertising_starts.wrapping_add(1);
        self.link.start_advertising(duration, run)?;
        self.advertising = true;
        self.stats.advertising_starts = run;
        if self.state == LinkState::Idle {
            self.state = LinkState::Advertising;
        }
        Ok(())
    }

    fn on_stack_initialized(&mut self, status: Result<AttributeHandle, InitializationError>) {
        if self.event_sink {
            warn!("LINK: duplicate stack initialization ignored");
            return;
        }

        let handle = match status {
            Ok(handle) => handle,
            Err(e) => {
                error!("LINK: stack initialization failed: {:?}", e);
                self.report(e.into());
                return;
            }
        };

        info!("LINK: stack initialized, temperature attribute at handle {=u16}", handle.raw());
        if let Err(e) = self.attribute.assign(handle) {
            warn!("LINK: {:?}", e);
        }
        // Failure is reported inside start()
        let _ = self.start();
    }

    fn on_advertising_ended(&mut self, run: u32, reason: AdvEndReason) {
        if run != self.stats.advertising_starts {
            debug!("LINK: end of superseded advertising run {=u32} ignored", run);
            return;
        }
        match reason {
            AdvEndReason::Timeout => info!("LINK: advertising ended, no peer found before timeout"),
            AdvEndReason::Connected => info!("LINK: advertising ended, peer connected"),
            AdvEndReason::Stopped => info!("LINK: advertising ended on request"),
            AdvEndReason::Unspecified => info!("LINK: advertising ended"),
        }
        self.advertising = false;
        if self.state == LinkState::Advertising {
            self.state = LinkState::Idle;
        }
    }

    fn on_connected(&mut self, conn_handle: u16) {
        info!("LINK: connected, handle {=u16}", conn_handle);
        if let Err(e) = self.stop_advertising() {
            warn!("LINK: failed to stop advertising: {:?}", e);
            self.report(e.into());
            // The stack stops advertising on connection anyway
            self.advertising = false;
        }
        self.state = LinkState::Connected;
        self.stats.connections += 1;
    }

    fn on_disconnected(&mut self, conn_handle: u16) {
        if self.state != LinkState::Connected {
            warn!("LINK: disconnect for {=u16} while {:?}, ignored", conn_handle, self.state);
            return;
        }

        info!("LINK: disconnected, handle {=u16}", conn_handle);
        self.stats.disconnections += 1;
        self.state = LinkState::Idle;

        match self.advertise(AdvDuration::Forever) {
            Ok(()) => info!("LINK: advertising resumed ({=u32} starts)", self.stats.advertising_starts),
            Err(e) => {
                error!("LINK: failed to resume advertising: {:?}", e);
                self.report(e.into());
            }
        }
    }

    fn report(&mut self, error: Error) {
        self.last_error = Some(error);
    }
}
