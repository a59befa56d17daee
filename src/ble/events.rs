//! Link-Layer Lifecycle Events
//!
//! The radio task translates SoftDevice outcomes into [`LinkEvent`]s and queues
//! them on [`LINK_EVENTS`]. The event-processing context drains the queue and
//! applies each event to the connection state machine synchronously, in
//! arrival order.

use defmt::{debug, Format};
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::channel::{Channel, Receiver};

use crate::ble::attribute::AttributeHandle;
use crate::ble::link::{ConnectionStateMachine, LinkControl};
use crate::error::InitializationError;

/// Depth of the lifecycle event queue
pub const EVENT_QUEUE_DEPTH: usize = 8;

/// Why an advertising run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum AdvEndReason {
    /// Advertising timed out without finding a peer
    Timeout,
    /// A peer connected
    Connected,
    /// Advertising was stopped on request
    Stopped,
    /// Any other stack-reported termination
    Unspecified,
}

/// Lifecycle events consumed by the connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum LinkEvent {
    /// Stack bring-up finished; carries the temperature attribute's handle
    StackInitialized(Result<AttributeHandle, InitializationError>),
    AdvertisingStarted,
    /// An advertising run ended; `run` is the number passed to
    /// [`LinkControl::start_advertising`](crate::ble::link::LinkControl::start_advertising)
    AdvertisingEnded { run: u32, reason: AdvEndReason },
    ConnectionComplete { conn_handle: u16 },
    DisconnectionComplete { conn_handle: u16 },
}

/// Lifecycle event queue between the radio task and the event context
pub static LINK_EVENTS: Channel<CriticalSectionRawMutex, LinkEvent, EVENT_QUEUE_DEPTH> = Channel::new();

/// Queue an event, waiting for room so no event is lost
pub async fn post(event: LinkEvent) {
    debug!("EVENTS: posting {:?}", event);
    LINK_EVENTS.send(event).await;
}

/// Dispatch every queued event without waiting. Returns how many were applied.
///
/// The firmware drains with [`drain_forever`]; this non-blocking variant is
/// for single-stepping the queue in tests and diagnostics.
pub fn drain_pending<L, M, const N: usize>(
    machine: &mut ConnectionStateMachine<'_, L>,
    events: &Receiver<'_, M, LinkEvent, N>,
) -> usize
where
    L: LinkControl,
    M: RawMutex,
{
    let mut applied = 0;
    while let Ok(event) = events.try_receive() {
        machine.dispatch(event);
        applied += 1;
    }
    applied
}

/// Event-processing context: wait for the next event and apply it, forever
pub async fn drain_forever<L, M, const N: usize>(
    machine: &mut ConnectionStateMachine<'_, L>,
    events: Receiver<'_, M, LinkEvent, N>,
) -> !
where
    L: LinkControl,
    M: RawMutex,
{
    loop {
        let event = events.receive().await;
        machine.dispatch(event);
    }
}
