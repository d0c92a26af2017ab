//! Transport abstraction.
//!
//! A [`Transport`] opens one bidirectional text [`Channel`] per connection
//! attempt and reports its lifecycle through [`TransportEvents`]. Every event
//! is tagged with the connection id it was opened under, so the manager can
//! ignore late events from a channel it has already replaced or closed.

pub mod ws;

use tokio::sync::mpsc;

use crate::error::Result;

pub use ws::{WsChannel, WsTransport};

/// Close code for an intentional closure. Never triggers a reconnect.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code reported when no close frame was received.
pub const NO_STATUS_RECEIVED: u16 = 1005;
/// Close code for a connection lost without a close handshake.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Close reason sent by a manual disconnect.
pub const MANUAL_CLOSE_REASON: &str = "Manual disconnect";

/// Identifies one opened channel within a manager.
pub type ConnectionId = u64;

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle event of one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed.
    Open,
    /// A text frame arrived.
    Message(String),
    /// The channel closed. Always the last event of a channel.
    Close {
        /// Close status code.
        code: u16,
        /// Close reason text.
        reason: String,
    },
    /// The channel failed. A `Close` follows.
    Error(String),
}

/// Anything the manager reacts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManagerEvent {
    /// An event from the channel opened as `conn_id`.
    Transport {
        /// Channel the event belongs to.
        conn_id: ConnectionId,
        /// The event.
        event: TransportEvent,
    },
    /// The reconnect timer armed as `timer_id` fired.
    ReconnectDue {
        /// Timer generation.
        timer_id: u64,
    },
}

/// Event sender handed to a transport for one channel.
#[derive(Clone, Debug)]
pub struct TransportEvents {
    conn_id: ConnectionId,
    tx: mpsc::UnboundedSender<ManagerEvent>,
}

impl TransportEvents {
    pub(crate) fn new(conn_id: ConnectionId, tx: mpsc::UnboundedSender<ManagerEvent>) -> Self {
        Self { conn_id, tx }
    }

    /// Connection id these events are tagged with.
    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Deliver an event. Returns `false` once the manager is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(ManagerEvent::Transport {
                conn_id: self.conn_id,
                event,
            })
            .is_ok()
    }

    /// Report a completed handshake.
    pub fn opened(&self) -> bool {
        self.emit(TransportEvent::Open)
    }

    /// Report an inbound text frame.
    pub fn message(&self, text: impl Into<String>) -> bool {
        self.emit(TransportEvent::Message(text.into()))
    }

    /// Report the closure.
    pub fn closed(&self, code: u16, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::Close {
            code,
            reason: reason.into(),
        })
    }

    /// Report a failure.
    pub fn errored(&self, error: impl Into<String>) -> bool {
        self.emit(TransportEvent::Error(error.into()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Channel readiness, mirroring the WebSocket `readyState` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyState {
    /// Handshake in progress.
    Connecting,
    /// Frames can be sent.
    Open,
    /// Close handshake in progress.
    Closing,
    /// Closed.
    Closed,
}

/// One open (or opening) channel.
pub trait Channel: Send + 'static {
    /// Current readiness.
    fn ready_state(&self) -> ReadyState;

    /// Queue a text frame. Returns `false` if it could not be queued.
    fn send_text(&self, text: String) -> bool;

    /// Start the close handshake.
    fn close(&mut self, code: u16, reason: &str);
}

/// Opens channels.
pub trait Transport: Send + 'static {
    /// Channel type produced by this transport.
    type Channel: Channel;

    /// Begin opening a channel to `url`. Completion, frames, and closure are
    /// reported through `events`.
    fn open(&self, url: &str, events: TransportEvents) -> Result<Self::Channel>;
}
