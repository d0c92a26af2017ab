//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each channel is one spawned task that owns the socket. The handle only
//! holds the shared ready state and an outbound queue, so `send_text` and
//! `close` never block the caller. The task always finishes by emitting
//! exactly one `Close` event, after any `Error` it reported.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use super::{
    ABNORMAL_CLOSURE, Channel, NORMAL_CLOSURE, NO_STATUS_RECEIVED, ReadyState, Transport,
    TransportEvents,
};
use crate::error::{LiveError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for the peer to acknowledge our close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

const STATE_CONNECTING: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_CLOSING: u8 = 2;
const STATE_CLOSED: u8 = 3;

/// Opens WebSocket channels. Must be used inside a tokio runtime.
///
/// `wss` URLs need the `tls` feature; without it the handshake fails and the
/// channel reports an error followed by an abnormal close.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsTransport;

impl Transport for WsTransport {
    type Channel = WsChannel;

    fn open(&self, url: &str, events: TransportEvents) -> Result<WsChannel> {
        let request = url
            .into_client_request()
            .map_err(|e| LiveError::InvalidEndpoint(format!("{url}: {e}")))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LiveError::Transport(e.to_string()))?;

        let state = Arc::new(AtomicU8::new(STATE_CONNECTING));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        debug!(conn_id = events.conn_id(), url, "opening websocket");
        let _ = runtime.spawn(run_channel(
            request,
            Arc::clone(&state),
            outbound_rx,
            events,
        ));

        Ok(WsChannel {
            state,
            outbound: outbound_tx,
        })
    }
}

/// Handle to one WebSocket channel task.
///
/// Dropping the handle without calling [`Channel::close`] closes the socket
/// with code 1000.
#[derive(Debug)]
pub struct WsChannel {
    state: Arc<AtomicU8>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

impl Channel for WsChannel {
    fn ready_state(&self) -> ReadyState {
        match self.state.load(Ordering::Acquire) {
            STATE_CONNECTING => ReadyState::Connecting,
            STATE_OPEN => ReadyState::Open,
            STATE_CLOSING => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }

    fn send_text(&self, text: String) -> bool {
        self.ready_state() == ReadyState::Open && self.outbound.send(Outbound::Text(text)).is_ok()
    }

    fn close(&mut self, code: u16, reason: &str) {
        if matches!(self.ready_state(), ReadyState::Closing | ReadyState::Closed) {
            return;
        }
        self.state.store(STATE_CLOSING, Ordering::Release);
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.to_owned(),
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Channel task
// ─────────────────────────────────────────────────────────────────────────────

enum Handshake {
    Connected(Box<WsStream>),
    Failed(String),
    Aborted { code: u16, reason: String },
}

async fn run_channel(
    request: Request,
    state: Arc<AtomicU8>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: TransportEvents,
) {
    let (code, reason) = match handshake(request, &mut outbound).await {
        Handshake::Connected(ws) => {
            // A close requested during the handshake is still queued and is
            // picked up by the pump before any frame is read.
            let _ = state.compare_exchange(
                STATE_CONNECTING,
                STATE_OPEN,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            let _ = events.opened();
            pump(*ws, &state, &mut outbound, &events).await
        }
        Handshake::Failed(error) => {
            let _ = events.errored(error);
            (ABNORMAL_CLOSURE, String::new())
        }
        Handshake::Aborted { code, reason } => (code, reason),
    };

    state.store(STATE_CLOSED, Ordering::Release);
    debug!(conn_id = events.conn_id(), code, reason = %reason, "websocket task finished");
    let _ = events.closed(code, reason);
}

async fn handshake(request: Request, outbound: &mut mpsc::UnboundedReceiver<Outbound>) -> Handshake {
    let connect = connect_async(request);
    tokio::pin!(connect);
    loop {
        tokio::select! {
            result = &mut connect => {
                return match result {
                    Ok((ws, _response)) => Handshake::Connected(Box::new(ws)),
                    Err(e) => Handshake::Failed(e.to_string()),
                };
            }
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Close { code, reason }) => return Handshake::Aborted { code, reason },
                Some(Outbound::Text(_)) => {}
                None => {
                    return Handshake::Aborted {
                        code: NORMAL_CLOSURE,
                        reason: String::new(),
                    };
                }
            },
        }
    }
}

async fn pump(
    ws: WsStream,
    state: &AtomicU8,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    events: &TransportEvents,
) -> (u16, String) {
    let conn_id = events.conn_id();
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            biased;

            cmd = outbound.recv() => match cmd {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        let _ = events.errored(e.to_string());
                        return (ABNORMAL_CLOSURE, String::new());
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    state.store(STATE_CLOSING, Ordering::Release);
                    return close_handshake(sink, stream, code, reason).await;
                }
                None => {
                    state.store(STATE_CLOSING, Ordering::Release);
                    return close_handshake(sink, stream, NORMAL_CLOSURE, String::new()).await;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.message(text.as_str());
                }
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        let _ = events.message(text);
                    }
                    Err(_) => debug!(conn_id, len = bytes.len(), "non-UTF-8 binary frame ignored"),
                },
                Some(Ok(Message::Close(frame))) => {
                    state.store(STATE_CLOSING, Ordering::Release);
                    let (code, reason) = frame.map_or_else(
                        || (NO_STATUS_RECEIVED, String::new()),
                        |f| (u16::from(f.code), f.reason.as_str().to_owned()),
                    );
                    // Reading on flushes the automatic close reply.
                    let _ = tokio::time::timeout(CLOSE_TIMEOUT, drain(&mut stream)).await;
                    return (code, reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.errored(e.to_string());
                    return (ABNORMAL_CLOSURE, String::new());
                }
                None => return (ABNORMAL_CLOSURE, String::new()),
            },
        }
    }
}

async fn close_handshake(
    mut sink: SplitSink<WsStream, Message>,
    mut stream: SplitStream<WsStream>,
    code: u16,
    reason: String,
) -> (u16, String) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.clone().into(),
    };
    if sink.send(Message::Close(Some(frame))).await.is_ok() {
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, drain(&mut stream)).await;
    }
    (code, reason)
}

async fn drain(stream: &mut SplitStream<WsStream>) {
    while let Some(Ok(_)) = stream.next().await {}
}
