//! The proximity transport seam.
//!
//! Connection handling, characteristic reads and writes and fragmentation all live
//! behind [Transport]. The transport reports what happens on the link by pushing
//! [TransportEvent]s through the [EventSender] it receives when it starts advertising.
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::presentation::device::SessionEvent;

/// Something that happened on the link.
#[derive(Debug, Clone, PartialEq, Eq, strum_macros::Display)]
pub enum TransportEvent {
    /// A reader connected.
    Connected,
    /// Free-form progress from the transport, forwarded to the observer.
    Progress(String),
    /// A complete message was received from the reader.
    DataReceived(Vec<u8>),
    /// The last message handed to [Transport::send] was delivered.
    WriteConfirmed,
    /// The link failed.
    Error(String),
    /// The reader dropped the link.
    Disconnected,
}

/// The link to the reader.
pub trait Transport {
    /// Starts advertising under `correlation_id` and keeps `events` to report back.
    fn advertise(&mut self, correlation_id: Uuid, events: EventSender) -> anyhow::Result<()>;

    /// Queues `message` for the connected reader.
    ///
    /// Delivery is confirmed with [TransportEvent::WriteConfirmed].
    fn send(&mut self, message: Vec<u8>) -> anyhow::Result<()>;

    /// Tears the link down. Must be safe to call in any state, more than once.
    fn disconnect(&mut self);
}

/// Feeds transport events into a session's queue.
///
/// Cheap to clone and usable from any thread.
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSender {
    pub(crate) fn new(inner: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { inner }
    }

    /// Returns `false` once the session is gone.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.inner.send(SessionEvent::Transport(event)).is_ok()
    }

    pub fn connected(&self) -> bool {
        self.send(TransportEvent::Connected)
    }

    pub fn progress(&self, message: impl Into<String>) -> bool {
        self.send(TransportEvent::Progress(message.into()))
    }

    pub fn data_received(&self, data: Vec<u8>) -> bool {
        self.send(TransportEvent::DataReceived(data))
    }

    pub fn write_confirmed(&self) -> bool {
        self.send(TransportEvent::WriteConfirmed)
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.send(TransportEvent::Error(message.into()))
    }

    pub fn disconnected(&self) -> bool {
        self.send(TransportEvent::Disconnected)
    }
}
