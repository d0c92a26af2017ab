//! In-memory transport for manager and client tests.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{LiveError, Result};
use crate::transport::{Channel, ReadyState, Transport, TransportEvents};

#[derive(Default)]
struct Shared {
    opened: Vec<MockRemote>,
    refuse_opens: bool,
}

/// Transport whose channels are driven by the test through [`MockRemote`].
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    shared: Arc<Mutex<Shared>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make every following `open` fail synchronously.
    pub(crate) fn refuse_opens(&self, refuse: bool) {
        self.shared.lock().refuse_opens = refuse;
    }

    pub(crate) fn open_count(&self) -> usize {
        self.shared.lock().opened.len()
    }

    /// Remote end of the most recently opened channel.
    pub(crate) fn last(&self) -> MockRemote {
        self.shared
            .lock()
            .opened
            .last()
            .cloned()
            .expect("no channel opened")
    }

    pub(crate) fn nth(&self, index: usize) -> MockRemote {
        self.shared.lock().opened[index].clone()
    }
}

impl Transport for MockTransport {
    type Channel = MockChannel;

    fn open(&self, url: &str, events: TransportEvents) -> Result<MockChannel> {
        let mut shared = self.shared.lock();
        if shared.refuse_opens {
            return Err(LiveError::Transport(format!("refused: {url}")));
        }
        let remote = MockRemote {
            url: url.to_owned(),
            events,
            link: Arc::new(Mutex::new(Link {
                ready: ReadyState::Connecting,
                sent: Vec::new(),
                closed_with: None,
            })),
        };
        let channel = MockChannel {
            link: Arc::clone(&remote.link),
        };
        shared.opened.push(remote);
        Ok(channel)
    }
}

struct Link {
    ready: ReadyState,
    sent: Vec<String>,
    closed_with: Option<(u16, String)>,
}

/// Manager-side handle.
pub(crate) struct MockChannel {
    link: Arc<Mutex<Link>>,
}

impl Channel for MockChannel {
    fn ready_state(&self) -> ReadyState {
        self.link.lock().ready
    }

    fn send_text(&self, text: String) -> bool {
        let mut link = self.link.lock();
        if link.ready != ReadyState::Open {
            return false;
        }
        link.sent.push(text);
        true
    }

    fn close(&mut self, code: u16, reason: &str) {
        let mut link = self.link.lock();
        if link.closed_with.is_none() {
            link.ready = ReadyState::Closing;
            link.closed_with = Some((code, reason.to_owned()));
        }
    }
}

/// Server side of one mock channel.
#[derive(Clone)]
pub(crate) struct MockRemote {
    url: String,
    events: TransportEvents,
    link: Arc<Mutex<Link>>,
}

impl MockRemote {
    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Complete the handshake.
    pub(crate) fn accept(&self) {
        self.link.lock().ready = ReadyState::Open;
        let _ = self.events.opened();
    }

    /// Push an inbound text frame.
    pub(crate) fn push(&self, text: &str) {
        let _ = self.events.message(text);
    }

    /// Report a transport error (no close yet).
    pub(crate) fn error(&self, error: &str) {
        let _ = self.events.errored(error);
    }

    /// Close the channel from the server side.
    pub(crate) fn close(&self, code: u16, reason: &str) {
        self.link.lock().ready = ReadyState::Closed;
        let _ = self.events.closed(code, reason);
    }

    /// Outbound frames the manager sent.
    pub(crate) fn sent(&self) -> Vec<String> {
        self.link.lock().sent.clone()
    }

    /// Code and reason the manager closed with.
    pub(crate) fn closed_with(&self) -> Option<(u16, String)> {
        self.link.lock().closed_with.clone()
    }
}
