//! Connection manager: lifecycle state machine and reconnect scheduling.
//!
//! The manager owns one logical connection. Transport callbacks and timer
//! firings arrive as [`ManagerEvent`]s in a private inbox and are applied one
//! at a time by [`ConnectionManager::handle_event`], so all state lives in
//! plain owned fields with no locking:
//!
//! ```text
//! connect() ──► Connecting ──open──► Connected
//!                   │                   │
//!                 error               error
//!                   ▼                   ▼
//!                 Error ───close──► Disconnected ──abnormal, under ceiling──► timer ──► connect()
//! ```
//!
//! Observers read state through `watch` and `broadcast` subscriptions.

use gait_core::BackoffPolicy;
use gait_settings::LiveSettings;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::dispatch::MessageDispatcher;
use crate::endpoint::{Endpoint, EndpointResolver};
use crate::frame::InboundFrame;
use crate::state::ConnectionState;
use crate::timer::ReconnectTimer;
use crate::transport::{
    ABNORMAL_CLOSURE, Channel, ConnectionId, MANUAL_CLOSE_REASON, ManagerEvent, NORMAL_CLOSURE,
    ReadyState, Transport, TransportEvent, TransportEvents,
};

/// Default capacity of the frame broadcast.
pub const DEFAULT_FRAME_BUFFER: usize = 64;

struct ActiveChannel<C> {
    id: ConnectionId,
    channel: C,
}

/// Owns the channel, the attempt counter, and the reconnect timer.
pub struct ConnectionManager<T: Transport> {
    resolver: Box<dyn EndpointResolver>,
    transport: T,
    dispatcher: MessageDispatcher,
    policy: BackoffPolicy,
    attempts: u32,
    active: Option<ActiveChannel<T::Channel>>,
    next_conn_id: ConnectionId,
    timer: ReconnectTimer,
    state_tx: watch::Sender<ConnectionState>,
    last_frame_tx: watch::Sender<Option<InboundFrame>>,
    frames_tx: broadcast::Sender<InboundFrame>,
    inbox_tx: mpsc::UnboundedSender<ManagerEvent>,
    inbox_rx: mpsc::UnboundedReceiver<ManagerEvent>,
    disposed: bool,
}

impl<T: Transport> ConnectionManager<T> {
    /// Manager with the default backoff policy. Starts `Disconnected`.
    pub fn new(
        resolver: impl EndpointResolver,
        transport: T,
        dispatcher: MessageDispatcher,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (last_frame_tx, _) = watch::channel(None);
        let (frames_tx, _) = broadcast::channel(DEFAULT_FRAME_BUFFER);
        Self {
            resolver: Box::new(resolver),
            transport,
            dispatcher,
            policy: BackoffPolicy::default(),
            attempts: 0,
            active: None,
            next_conn_id: 0,
            timer: ReconnectTimer::new(inbox_tx.clone()),
            state_tx,
            last_frame_tx,
            frames_tx,
            inbox_tx,
            inbox_rx,
            disposed: false,
        }
    }

    /// Manager configured from settings: endpoint, backoff, frame buffer.
    pub fn from_settings(settings: &LiveSettings, transport: T, dispatcher: MessageDispatcher) -> Self {
        Self::new(Endpoint::from(&settings.endpoint), transport, dispatcher)
            .with_policy(settings.reconnect.into())
            .with_frame_buffer(settings.channels.frame_buffer)
    }

    /// Replace the backoff policy.
    #[must_use]
    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Resize the frame broadcast. Existing frame subscribers are detached.
    #[must_use]
    pub fn with_frame_buffer(mut self, capacity: usize) -> Self {
        self.frames_tx = broadcast::channel(capacity.max(1)).0;
        self
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Whether the state is `Connected`.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Consecutive automatic reconnect attempts since the last open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Backoff policy in effect.
    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    /// Last successfully parsed frame.
    pub fn last_frame(&self) -> Option<InboundFrame> {
        self.last_frame_tx.borrow().clone()
    }

    /// Delay of the pending reconnect, if one is armed.
    pub fn pending_reconnect(&self) -> Option<Duration> {
        self.timer.pending_delay()
    }

    /// Watch state transitions. Repeated identical states are not reported.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Watch the last received frame.
    pub fn subscribe_last_frame(&self) -> watch::Receiver<Option<InboundFrame>> {
        self.last_frame_tx.subscribe()
    }

    /// Receive every parsed frame from now on.
    pub fn subscribe_frames(&self) -> broadcast::Receiver<InboundFrame> {
        self.frames_tx.subscribe()
    }

    pub(crate) fn frames_sender(&self) -> broadcast::Sender<InboundFrame> {
        self.frames_tx.clone()
    }

    /// Routing table, for registering additional frame routes.
    pub fn dispatcher_mut(&mut self) -> &mut MessageDispatcher {
        &mut self.dispatcher
    }

    // ─────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────

    /// Open a channel to the resolved endpoint.
    ///
    /// No-op while a channel is connecting or open. Cancels any pending
    /// reconnect. A transport that fails to open synchronously is treated as
    /// an error followed by an abnormal close, so backoff still applies.
    pub fn connect(&mut self) {
        if self.disposed {
            debug!("connect ignored: manager disposed");
            return;
        }
        if let Some(active) = &self.active {
            if matches!(
                active.channel.ready_state(),
                ReadyState::Connecting | ReadyState::Open
            ) {
                debug!(conn_id = active.id, "connect ignored: channel already active");
                return;
            }
        }
        let _ = self.timer.cancel();
        self.active = None;

        self.next_conn_id += 1;
        let conn_id = self.next_conn_id;
        let url = self.resolver.resolve().url();
        self.set_state(ConnectionState::Connecting);
        info!(conn_id, url = %url, attempt = self.attempts, "connecting");

        let events = TransportEvents::new(conn_id, self.inbox_tx.clone());
        match self.transport.open(&url, events) {
            Ok(channel) => self.active = Some(ActiveChannel { id: conn_id, channel }),
            Err(e) => {
                warn!(conn_id, error = %e, "failed to open channel");
                self.set_state(ConnectionState::Error);
                self.on_close(ABNORMAL_CLOSURE, &e.to_string());
            }
        }
    }

    /// Close the channel on purpose. Never followed by a reconnect.
    pub fn disconnect(&mut self) {
        let _ = self.timer.cancel();
        if let Some(mut active) = self.active.take() {
            info!(conn_id = active.id, "manual disconnect");
            active.channel.close(NORMAL_CLOSURE, MANUAL_CLOSE_REASON);
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Send `payload` as JSON if the channel is open.
    ///
    /// Returns `false` without sending when it is not.
    pub fn send_message<P: Serialize + ?Sized>(&self, payload: &P) -> bool {
        let Some(active) = self
            .active
            .as_ref()
            .filter(|a| a.channel.ready_state() == ReadyState::Open)
        else {
            debug!("send dropped: channel not open");
            return false;
        };
        match serde_json::to_string(payload) {
            Ok(text) => active.channel.send_text(text),
            Err(e) => {
                warn!(conn_id = active.id, error = %e, "failed to serialize outbound message");
                false
            }
        }
    }

    /// Apply one event.
    pub fn handle_event(&mut self, event: ManagerEvent) {
        if self.disposed {
            return;
        }
        match event {
            ManagerEvent::Transport { conn_id, event } => {
                if self.active.as_ref().map(|a| a.id) != Some(conn_id) {
                    debug!(conn_id, "ignoring event from stale channel");
                    return;
                }
                match event {
                    TransportEvent::Open => self.on_open(conn_id),
                    TransportEvent::Message(text) => self.on_message(conn_id, &text),
                    TransportEvent::Error(error) => {
                        warn!(conn_id, error = %error, "transport error");
                        self.set_state(ConnectionState::Error);
                    }
                    TransportEvent::Close { code, reason } => {
                        self.active = None;
                        self.on_close(code, &reason);
                    }
                }
            }
            ManagerEvent::ReconnectDue { timer_id } => {
                if !self.timer.take_if_current(timer_id) {
                    debug!(timer_id, "ignoring stale reconnect firing");
                    return;
                }
                self.attempts = self.attempts.saturating_add(1);
                info!(attempt = self.attempts, "reconnecting");
                self.connect();
            }
        }
    }

    /// Wait for the next transport event or timer firing.
    pub async fn next_event(&mut self) -> Option<ManagerEvent> {
        self.inbox_rx.recv().await
    }

    /// Wait for and apply one event. Returns `false` if the inbox is closed.
    pub async fn process_next(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Apply every event already queued. Returns how many were applied.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.inbox_rx.try_recv() {
            self.handle_event(event);
            applied += 1;
        }
        applied
    }

    /// Tear down: cancel the timer and close the channel with code 1000.
    ///
    /// Safe from any state and idempotent. Later events and `connect()`
    /// calls are ignored.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disconnect();
        self.disposed = true;
        debug!("connection manager disposed");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Event handlers
    // ─────────────────────────────────────────────────────────────────────

    fn on_open(&mut self, conn_id: ConnectionId) {
        self.attempts = 0;
        self.set_state(ConnectionState::Connected);
        info!(conn_id, "connected");
    }

    fn on_message(&mut self, conn_id: ConnectionId, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(conn_id, error = %e, "discarding malformed frame");
                return;
            }
        };
        debug!(conn_id, kind = %frame.kind, "frame received");
        let _ = self.last_frame_tx.send_replace(Some(frame.clone()));
        let _ = self.frames_tx.send(frame.clone());
        let _ = self.dispatcher.dispatch(&frame);
    }

    fn on_close(&mut self, code: u16, reason: &str) {
        self.set_state(ConnectionState::Disconnected);
        info!(code, reason, "disconnected");
        if code == NORMAL_CLOSURE {
            return;
        }

        let decision = self.policy.decide(self.attempts);
        if decision.should_retry {
            if self.timer.arm(decision.delay).is_some() {
                info!(
                    attempt = self.attempts + 1,
                    delay_ms = %decision.delay.as_millis(),
                    "reconnect scheduled"
                );
            }
        } else {
            warn!(
                attempts = self.attempts,
                max_attempts = self.policy.max_attempts,
                "reconnect attempts exhausted"
            );
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let _ = self.state_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(from = %current, to = %next, "state transition");
            *current = next;
            true
        });
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: Transport> std::fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("attempts", &self.attempts)
            .field("conn_id", &self.active.as_ref().map(|a| a.id))
            .field("timer", &self.timer)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{Notification, NotificationSink};
    use crate::testing::MockTransport;
    use gait_core::logging::test_utils::capture_logs;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::Level;

    type Seen = Arc<Mutex<Vec<Notification>>>;

    fn fixture() -> (ConnectionManager<MockTransport>, MockTransport, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: Arc<dyn NotificationSink> =
            Arc::new(move |n: Notification| sink_seen.lock().push(n));
        let transport = MockTransport::new();
        let manager = ConnectionManager::new(
            Endpoint::new(false, "localhost:8080", "/ws/dashboard"),
            transport.clone(),
            MessageDispatcher::with_default_routes(sink),
        );
        (manager, transport, seen)
    }

    fn connected() -> (ConnectionManager<MockTransport>, MockTransport, Seen) {
        let (mut manager, transport, seen) = fixture();
        manager.connect();
        transport.last().accept();
        let _ = manager.process_pending();
        assert_eq!(manager.state(), ConnectionState::Connected);
        (manager, transport, seen)
    }

    // -- connect --

    #[tokio::test(start_paused = true)]
    async fn starts_disconnected() {
        let (manager, transport, _) = fixture();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_connected());
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_opens_resolved_url() {
        let (mut manager, transport, _) = fixture();
        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(transport.last().url(), "ws://localhost:8080/ws/dashboard");

        transport.last().accept();
        let _ = manager.process_pending();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_idempotent_while_active() {
        let (mut manager, transport, _) = fixture();
        manager.connect();
        manager.connect();
        assert_eq!(transport.open_count(), 1);

        transport.last().accept();
        let _ = manager.process_pending();
        manager.connect();
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn endpoint_resolved_on_every_connect() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let transport = MockTransport::new();
        let mut manager = ConnectionManager::new(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Endpoint::new(n > 0, "git.example.com", "/ws/dashboard")
            },
            transport.clone(),
            MessageDispatcher::new(Arc::new(|_: Notification| {})),
        );

        manager.connect();
        transport.last().close(ABNORMAL_CLOSURE, "");
        let _ = manager.process_pending();
        manager.connect();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(transport.nth(0).url(), "ws://git.example.com/ws/dashboard");
        assert_eq!(transport.nth(1).url(), "wss://git.example.com/ws/dashboard");
    }

    // -- open resets attempts --

    #[tokio::test(start_paused = true)]
    async fn open_resets_attempts() {
        let (mut manager, transport, _) = connected();
        transport.last().close(ABNORMAL_CLOSURE, "");
        let _ = manager.process_pending();
        assert!(manager.process_next().await);
        transport.last().close(ABNORMAL_CLOSURE, "");
        let _ = manager.process_pending();
        assert!(manager.process_next().await);
        assert_eq!(manager.attempts(), 2);

        transport.last().accept();
        let _ = manager.process_pending();
        assert_eq!(manager.attempts(), 0);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    // -- send_message --

    #[tokio::test(start_paused = true)]
    async fn send_refused_when_not_open() {
        let (mut manager, transport, _) = fixture();
        assert!(!manager.send_message(&json!({"type": "ping"})));

        manager.connect();
        assert!(!manager.send_message(&json!({"type": "ping"})));
        assert!(transport.last().sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn send_transmits_json_when_open() {
        let (manager, transport, _) = connected();
        assert!(manager.send_message(&json!({"type": "subscribe", "repo": "gait"})));
        assert_eq!(
            transport.last().sent(),
            vec![r#"{"repo":"gait","type":"subscribe"}"#.to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn send_after_disconnect_refused() {
        let (mut manager, transport, _) = connected();
        manager.disconnect();
        assert!(!manager.send_message("hello"));
        assert!(transport.last().sent().is_empty());
    }

    // -- frames --

    #[tokio::test(start_paused = true)]
    async fn frame_is_stored_broadcast_and_dispatched() {
        let (mut manager, transport, seen) = connected();
        let mut frames = manager.subscribe_frames();
        let mut last = manager.subscribe_last_frame();

        transport
            .last()
            .push(r#"{"type":"commit","payload":{"hash":"abcdef1234","message":"fix bug"}}"#);
        let _ = manager.process_pending();

        let frame = manager.last_frame().unwrap();
        assert_eq!(frame.payload["hash"], "abcdef1234");
        assert!(last.has_changed().unwrap());
        assert_eq!(frames.try_recv().unwrap(), frame);
        assert_eq!(
            seen.lock().as_slice(),
            &[Notification::info("New Commit", "abcdef1: fix bug")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frame_is_logged_and_discarded() {
        let (logs, _guard) = capture_logs();
        let (mut manager, transport, seen) = connected();
        transport.last().push(r#"{"type":"update","payload":{}}"#);
        let _ = manager.process_pending();
        let before = manager.last_frame();

        transport.last().push("{not json");
        transport.last().push(r#"{"payload":{}}"#);
        let _ = manager.process_pending();

        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.last_frame(), before);
        assert!(seen.lock().is_empty());
        assert_eq!(
            logs.events()
                .iter()
                .filter(|e| e.level == Level::WARN && e.message == "discarding malformed frame")
                .count(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_kind_updates_last_frame_only() {
        let (mut manager, transport, seen) = connected();
        transport.last().push(r#"{"type":"unknown_future_kind","payload":{}}"#);
        let _ = manager.process_pending();
        assert_eq!(manager.last_frame().unwrap().kind.as_str(), "unknown_future_kind");
        assert!(seen.lock().is_empty());
    }

    // -- close and reconnect --

    #[tokio::test(start_paused = true)]
    async fn abnormal_close_doubles_delay() {
        let (mut manager, transport, _) = connected();

        transport.last().close(ABNORMAL_CLOSURE, "");
        let _ = manager.process_pending();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.pending_reconnect(), Some(Duration::from_millis(1000)));

        let start = tokio::time::Instant::now();
        assert!(manager.process_next().await);
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert_eq!(manager.attempts(), 1);
        assert_eq!(transport.open_count(), 2);
        assert_eq!(manager.state(), ConnectionState::Connecting);

        transport.last().close(ABNORMAL_CLOSURE, "");
        let _ = manager.process_pending();
        assert_eq!(manager.pending_reconnect(), Some(Duration::from_millis(2000)));

        assert!(manager.process_next().await);
        transport.last().close(ABNORMAL_CLOSURE, "");
        let _ = manager.process_pending();
        assert_eq!(manager.pending_reconnect(), Some(Duration::from_millis(4000)));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_capped_at_max() {
        let (manager, transport, _) = fixture();
        let mut manager = manager.with_policy(BackoffPolicy {
            max_attempts: 10,
            ..BackoffPolicy::default()
        });
        manager.connect();
        let mut delays = Vec::new();
        for _ in 0..7 {
            transport.last().close(ABNORMAL_CLOSURE, "");
            let _ = manager.process_pending();
            delays.push(manager.pending_reconnect().unwrap().as_millis());
            assert!(manager.process_next().await);
        }
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16_000, 30_000, 30_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn normal_close_from_server_does_not_reconnect() {
        let (mut manager, transport, _) = connected();
        transport.last().close(NORMAL_CLOSURE, "server shutdown");
        let _ = manager.process_pending();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.pending_reconnect().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_then_close_never_schedules() {
        let (mut manager, transport, _) = connected();
        manager.disconnect();
        assert_eq!(
            transport.last().closed_with(),
            Some((NORMAL_CLOSURE, MANUAL_CLOSE_REASON.to_string()))
        );

        transport.last().close(NORMAL_CLOSURE, MANUAL_CLOSE_REASON);
        transport.last().close(ABNORMAL_CLOSURE, "");
        let _ = manager.process_pending();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.pending_reconnect().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let (mut manager, transport, _) = connected();
        transport.last().close(ABNORMAL_CLOSURE, "");
        let _ = manager.process_pending();
        assert!(manager.pending_reconnect().is_some());

        manager.disconnect();
        assert!(manager.pending_reconnect().is_none());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(manager.process_pending(), 0);
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_twice_has_no_extra_effect() {
        let (mut manager, transport, _) = connected();
        let mut state = manager.subscribe_state();
        manager.disconnect();
        assert!(state.has_changed().unwrap());
        state.mark_unchanged();

        manager.disconnect();
        assert!(!state.has_changed().unwrap());
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_connect_replaces_pending_timer() {
        let (mut manager, transport, _) = connected();
        transport.last().close(ABNORMAL_CLOSURE, "");
        let _ = manager.process_pending();
        assert!(manager.pending_reconnect().is_some());

        manager.connect();
        assert!(manager.pending_reconnect().is_none());
        assert_eq!(transport.open_count(), 2);

        transport.last().close(ABNORMAL_CLOSURE, "");
        let _ = manager.process_pending();
        assert_eq!(manager.pending_reconnect(), Some(Duration::from_millis(1000)));

        // Only the latest timer fires.
        assert!(manager.process_next().await);
        assert_eq!(transport.open_count(), 3);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(manager.process_pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_settles_in_disconnected() {
        let (logs, _guard) = capture_logs();
        let (manager, transport, _) = fixture();
        let mut manager = manager.with_policy(BackoffPolicy {
            max_attempts: 2,
            ..BackoffPolicy::default()
        });
        manager.connect();
        for _ in 0..2 {
            transport.last().close(ABNORMAL_CLOSURE, "");
            let _ = manager.process_pending();
            assert!(manager.process_next().await);
        }
        transport.last().close(ABNORMAL_CLOSURE, "");
        let _ = manager.process_pending();

        assert_eq!(manager.attempts(), 2);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.pending_reconnect().is_none());
        assert!(logs.has_event(Level::WARN, "reconnect attempts exhausted"));

        // A caller-driven connect still works.
        manager.connect();
        assert_eq!(transport.open_count(), 4);
    }

    // -- errors --

    #[tokio::test(start_paused = true)]
    async fn error_event_sets_error_and_close_drives_retry() {
        let (mut manager, transport, _) = connected();
        transport.last().error("connection reset");
        let _ = manager.process_pending();
        assert_eq!(manager.state(), ConnectionState::Error);
        assert!(manager.pending_reconnect().is_none());

        transport.last().close(ABNORMAL_CLOSURE, "");
        let _ = manager.process_pending();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.pending_reconnect().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn synchronous_open_failure_still_backs_off() {
        let (logs, _guard) = capture_logs();
        let (mut manager, transport, _) = fixture();
        transport.refuse_opens(true);
        manager.connect();

        assert!(logs.has_event(Level::WARN, "failed to open channel"));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.pending_reconnect(), Some(Duration::from_millis(1000)));

        transport.refuse_opens(false);
        assert!(manager.process_next().await);
        assert_eq!(transport.open_count(), 1);
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn events_from_superseded_channel_ignored() {
        let (mut manager, transport, seen) = connected();
        let old = transport.last();
        transport.last().close(ABNORMAL_CLOSURE, "");
        let _ = manager.process_pending();
        manager.connect();

        old.push(r#"{"type":"commit","payload":{"hash":"x","message":"y"}}"#);
        old.accept();
        let _ = manager.process_pending();
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn open_failure_outside_runtime_settles_disconnected() {
        let mut manager = ConnectionManager::new(
            Endpoint::new(false, "localhost:1", "/ws/dashboard"),
            crate::transport::WsTransport,
            MessageDispatcher::new(Arc::new(|_: Notification| {})),
        );
        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.pending_reconnect().is_none());

        manager.disconnect();
        manager.dispose();
    }

    // -- dispose --

    #[tokio::test(start_paused = true)]
    async fn dispose_is_idempotent_and_final() {
        let (mut manager, transport, _) = connected();
        manager.dispose();
        manager.dispose();
        assert_eq!(
            transport.last().closed_with(),
            Some((NORMAL_CLOSURE, MANUAL_CLOSE_REASON.to_string()))
        );
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.connect();
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_closes_channel_and_timer() {
        let (mut manager, transport, _) = connected();
        transport.last().close(ABNORMAL_CLOSURE, "");
        let _ = manager.process_pending();
        manager.connect();
        let remote = transport.last();
        drop(manager);
        assert_eq!(
            remote.closed_with(),
            Some((NORMAL_CLOSURE, MANUAL_CLOSE_REASON.to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn from_settings_applies_policy_and_endpoint() {
        let mut settings = LiveSettings::default();
        settings.endpoint.secure = true;
        settings.reconnect.base_delay_ms = 250;
        let transport = MockTransport::new();
        let mut manager = ConnectionManager::from_settings(
            &settings,
            transport.clone(),
            MessageDispatcher::new(Arc::new(|_: Notification| {})),
        );
        assert_eq!(manager.policy().base_delay_ms, 250);

        manager.connect();
        assert_eq!(transport.last().url(), "wss://localhost:8080/ws/dashboard");
        transport.last().close(ABNORMAL_CLOSURE, "");
        let _ = manager.process_pending();
        assert_eq!(manager.pending_reconnect(), Some(Duration::from_millis(250)));
    }
}
