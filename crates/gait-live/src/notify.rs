//! Notification sink contract and bundled sinks.
//!
//! The dispatcher hands every user-facing alert to a [`NotificationSink`].
//! Presentation lives outside this crate; a sink must not block and has no
//! way to report failure back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Notification severity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Error,
    /// Needs attention.
    Warning,
    /// Informational.
    #[default]
    Info,
}

impl NotificationLevel {
    /// Parse a wire name; anything unrecognized is [`Info`](Self::Info).
    pub fn from_wire(name: &str) -> Self {
        match name {
            "success" => Self::Success,
            "error" => Self::Error,
            "warning" => Self::Warning,
            _ => Self::Info,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl<'de> Deserialize<'de> for NotificationLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&name))
    }
}

/// A user-facing alert.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Severity, serialized as `type`.
    #[serde(rename = "type")]
    pub level: NotificationLevel,
    /// Headline.
    pub title: String,
    /// Body; empty when the source had none.
    #[serde(default)]
    pub message: String,
}

impl Notification {
    /// Build a notification.
    pub fn new(level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }

    /// Info-level notification.
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, message)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sink trait
// ─────────────────────────────────────────────────────────────────────────────

/// Receives user-facing alerts.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send + Sync {
    /// Present one notification. Must not block.
    fn notify(&self, notification: Notification);
}

impl<F> NotificationSink for F
where
    F: Fn(Notification) + Send + Sync,
{
    fn notify(&self, notification: Notification) {
        self(notification);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bundled sinks
// ─────────────────────────────────────────────────────────────────────────────

/// Writes notifications to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, n: Notification) {
        match n.level {
            NotificationLevel::Error => error!(title = %n.title, message = %n.message, "notification"),
            NotificationLevel::Warning => warn!(title = %n.title, message = %n.message, "notification"),
            NotificationLevel::Success | NotificationLevel::Info => {
                info!(level = n.level.as_str(), title = %n.title, message = %n.message, "notification");
            }
        }
    }
}

/// Forwards notifications into a bounded channel without blocking.
///
/// When the consumer falls behind, new notifications are dropped and counted.
pub struct ChannelSink {
    tx: mpsc::Sender<Notification>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Create a sink and the receiver its consumer reads from.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Notifications dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(n)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(title = %n.title, dropped = total, "notification dropped: sink full");
            }
            Err(mpsc::error::TrySendError::Closed(n)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(title = %n.title, dropped = total, "notification dropped: receiver gone");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Notifier
// ─────────────────────────────────────────────────────────────────────────────

/// Shared handle over a sink with per-level helpers.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    /// Wrap a sink.
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Forward a notification as-is.
    pub fn notify(&self, notification: Notification) {
        self.sink.notify(notification);
    }

    /// Success-level alert.
    pub fn success(&self, title: &str, message: Option<&str>) {
        self.emit(NotificationLevel::Success, title, message);
    }

    /// Error-level alert.
    pub fn error(&self, title: &str, message: Option<&str>) {
        self.emit(NotificationLevel::Error, title, message);
    }

    /// Warning-level alert.
    pub fn warning(&self, title: &str, message: Option<&str>) {
        self.emit(NotificationLevel::Warning, title, message);
    }

    /// Info-level alert.
    pub fn info(&self, title: &str, message: Option<&str>) {
        self.emit(NotificationLevel::Info, title, message);
    }

    fn emit(&self, level: NotificationLevel, title: &str, message: Option<&str>) {
        self.notify(Notification::new(level, title, message.unwrap_or_default()));
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}
