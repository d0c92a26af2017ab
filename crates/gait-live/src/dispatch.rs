//! Message dispatcher: frame kind → notification routing table.
//!
//! Each [`FrameRoute`] turns the payload of one frame kind into at most one
//! [`Notification`]. New kinds are added with [`MessageDispatcher::register`]
//! without touching the connection manager. Kinds with no route are ignored.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::frame::{FrameKind, InboundFrame};
use crate::notify::{Notification, NotificationLevel, NotificationSink, Notifier};

/// Title of commit notifications.
pub const COMMIT_TITLE: &str = "New Commit";
/// Insight title used when the payload carries none.
pub const INSIGHT_FALLBACK_TITLE: &str = "Repository analysis updated";
/// Characters of the commit hash shown in commit notifications.
pub const SHORT_HASH_LEN: usize = 7;

// ─────────────────────────────────────────────────────────────────────────────
// Routes
// ─────────────────────────────────────────────────────────────────────────────

/// Maps the payload of one frame kind to a notification.
pub trait FrameRoute: Send + Sync {
    /// Wire tag this route handles.
    fn kind(&self) -> &str;

    /// Build the notification for `payload`, or `None` to stay silent.
    fn route(&self, payload: &Value) -> Option<Notification>;
}

fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

fn non_empty<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    str_field(payload, key).filter(|s| !s.is_empty())
}

/// Forwards server-authored notifications that carry both `type` and `title`.
#[derive(Debug, Default)]
pub struct NotificationRoute;

impl FrameRoute for NotificationRoute {
    fn kind(&self) -> &str {
        FrameKind::Notification.as_str()
    }

    fn route(&self, payload: &Value) -> Option<Notification> {
        let level = non_empty(payload, "type")?;
        let title = non_empty(payload, "title")?;
        Some(Notification::new(
            NotificationLevel::from_wire(level),
            title,
            str_field(payload, "message").unwrap_or_default(),
        ))
    }
}

/// Announces a new commit as `"<short hash>: <message>"`.
#[derive(Debug, Default)]
pub struct CommitRoute;

impl FrameRoute for CommitRoute {
    fn kind(&self) -> &str {
        FrameKind::Commit.as_str()
    }

    fn route(&self, payload: &Value) -> Option<Notification> {
        let hash: String = str_field(payload, "hash")
            .unwrap_or_default()
            .chars()
            .take(SHORT_HASH_LEN)
            .collect();
        let message = str_field(payload, "message").unwrap_or_default();
        Some(Notification::info(COMMIT_TITLE, format!("{hash}: {message}")))
    }
}

/// Announces a repository insight.
///
/// The insight's own title is the headline, falling back to
/// [`INSIGHT_FALLBACK_TITLE`], and its `description` is the body. There is
/// no fixed "New Insight" heading.
#[derive(Debug, Default)]
pub struct InsightRoute;

impl FrameRoute for InsightRoute {
    fn kind(&self) -> &str {
        FrameKind::Insight.as_str()
    }

    fn route(&self, payload: &Value) -> Option<Notification> {
        let title = non_empty(payload, "title").unwrap_or(INSIGHT_FALLBACK_TITLE);
        let description = str_field(payload, "description").unwrap_or_default();
        Some(Notification::info(title, description))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────────────────

/// Routes parsed frames to the notification sink.
pub struct MessageDispatcher {
    routes: HashMap<String, Box<dyn FrameRoute>>,
    notifier: Notifier,
}

impl MessageDispatcher {
    /// Dispatcher with an empty routing table.
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            routes: HashMap::new(),
            notifier: Notifier::new(sink),
        }
    }

    /// Dispatcher with the notification, commit, and insight routes.
    pub fn with_default_routes(sink: Arc<dyn NotificationSink>) -> Self {
        let mut dispatcher = Self::new(sink);
        let _ = dispatcher
            .register(NotificationRoute)
            .register(CommitRoute)
            .register(InsightRoute);
        dispatcher
    }

    /// Add a route, replacing any earlier route for the same kind.
    pub fn register(&mut self, route: impl FrameRoute + 'static) -> &mut Self {
        let kind = route.kind().to_owned();
        if self.routes.insert(kind.clone(), Box::new(route)).is_some() {
            debug!(kind = %kind, "frame route replaced");
        }
        self
    }

    /// Whether a route exists for `kind`.
    pub fn handles(&self, kind: &FrameKind) -> bool {
        self.routes.contains_key(kind.as_str())
    }

    /// Notifier over the same sink, for host-side alerts.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Route one frame. Returns whether the sink was called.
    pub fn dispatch(&self, frame: &InboundFrame) -> bool {
        let Some(route) = self.routes.get(frame.kind.as_str()) else {
            debug!(kind = %frame.kind, "no route for frame kind");
            return false;
        };
        match route.route(&frame.payload) {
            Some(notification) => {
                self.notifier.notify(notification);
                true
            }
            None => {
                debug!(kind = %frame.kind, "frame produced no notification");
                false
            }
        }
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("MessageDispatcher")
            .field("routes", &kinds)
            .finish_non_exhaustive()
    }
}
