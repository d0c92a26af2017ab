//! Owning async handle over a [`ConnectionManager`].
//!
//! [`LiveClient::spawn`] moves the manager into a background task that
//! connects immediately and then serves commands and manager events from a
//! single loop. Dropping the client or calling [`LiveClient::shutdown`]
//! disposes the manager, closing the channel with code 1000.

use std::sync::Arc;

use gait_settings::LiveSettings;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dispatch::MessageDispatcher;
use crate::error::{LiveError, Result};
use crate::frame::InboundFrame;
use crate::manager::ConnectionManager;
use crate::notify::{ChannelSink, Notification, NotificationSink};
use crate::state::ConnectionState;
use crate::transport::{Transport, WsTransport};

/// Default command queue capacity.
pub const DEFAULT_COMMAND_BUFFER: usize = 32;

enum Command {
    Connect,
    Disconnect,
    Send {
        payload: Value,
        reply: oneshot::Sender<bool>,
    },
}

/// Handle to a running connection manager.
pub struct LiveClient {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    last_frame: watch::Receiver<Option<InboundFrame>>,
    frames: broadcast::Sender<InboundFrame>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LiveClient {
    /// Start `manager` in a background task and connect.
    pub fn spawn<T: Transport>(manager: ConnectionManager<T>) -> Self {
        Self::spawn_with_capacity(manager, DEFAULT_COMMAND_BUFFER)
    }

    /// Like [`spawn`](Self::spawn) with an explicit command queue size.
    pub fn spawn_with_capacity<T: Transport>(manager: ConnectionManager<T>, capacity: usize) -> Self {
        let (commands, rx) = mpsc::channel(capacity.max(1));
        let state = manager.subscribe_state();
        let last_frame = manager.subscribe_last_frame();
        let frames = manager.frames_sender();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(manager, rx, cancel.clone()));
        Self {
            commands,
            state,
            last_frame,
            frames,
            cancel,
            task: Some(task),
        }
    }

    /// WebSocket client configured from settings.
    pub fn from_settings(settings: &LiveSettings, sink: Arc<dyn NotificationSink>) -> Self {
        let manager = ConnectionManager::from_settings(
            settings,
            WsTransport,
            MessageDispatcher::with_default_routes(sink),
        );
        Self::spawn_with_capacity(manager, settings.channels.command_buffer)
    }

    /// WebSocket client whose notifications are delivered on a bounded channel.
    pub fn from_settings_with_channel(settings: &LiveSettings) -> (Self, mpsc::Receiver<Notification>) {
        let (sink, rx) = ChannelSink::new(settings.channels.notification_buffer);
        (Self::from_settings(settings, Arc::new(sink)), rx)
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether the state is `Connected`.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Last successfully parsed frame.
    pub fn last_frame(&self) -> Option<InboundFrame> {
        self.last_frame.borrow().clone()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Receive every parsed frame from now on.
    pub fn subscribe_frames(&self) -> broadcast::Receiver<InboundFrame> {
        self.frames.subscribe()
    }

    /// Wait until the state equals `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<()> {
        let mut state = self.state.clone();
        let _ = state
            .wait_for(|s| *s == target)
            .await
            .map_err(|_| LiveError::ClientClosed)?;
        Ok(())
    }

    /// Ask the manager to connect.
    pub async fn connect(&self) -> Result<()> {
        self.command(Command::Connect).await
    }

    /// Ask the manager to disconnect on purpose.
    pub async fn disconnect(&self) -> Result<()> {
        self.command(Command::Disconnect).await
    }

    /// Send `payload` as JSON. `Ok(false)` means the channel was not open.
    pub async fn send_message<P: Serialize + ?Sized>(&self, payload: &P) -> Result<bool> {
        let payload = serde_json::to_value(payload)?;
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send { payload, reply }).await?;
        rx.await.map_err(|_| LiveError::ClientClosed)
    }

    /// Dispose the manager and wait for the background task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    async fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| LiveError::ClientClosed)
    }
}

impl Drop for LiveClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for LiveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveClient")
            .field("state", &self.state())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

async fn run<T: Transport>(
    mut manager: ConnectionManager<T>,
    mut commands: mpsc::Receiver<Command>,
    cancel: CancellationToken,
) {
    manager.connect();
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(Command::Connect) => manager.connect(),
                Some(Command::Disconnect) => manager.disconnect(),
                Some(Command::Send { payload, reply }) => {
                    let _ = reply.send(manager.send_message(&payload));
                }
                None => break,
            },
            event = manager.next_event() => match event {
                Some(event) => manager.handle_event(event),
                None => break,
            },
        }
    }
    manager.dispose();
    debug!("live client task stopped");
}
