//! # gait-live
//!
//! Real-time push channel for the gait dashboard.
//!
//! One persistent WebSocket to the backend carries server events (new
//! commits, repository insights, notifications, dashboard data). This crate
//! keeps that channel alive and turns its frames into user-facing alerts:
//!
//! - [`ConnectionManager`]: lifecycle state machine, exponential-backoff
//!   reconnects, and teardown
//! - [`MessageDispatcher`]: extensible frame kind → notification routing
//! - [`NotificationSink`]: where alerts go (closure, log, or bounded channel)
//! - [`Transport`]: channel abstraction, with [`WsTransport`] over
//!   `tokio-tungstenite`
//! - [`LiveClient`]: owning async handle that runs a manager in a task
//!
//! ```no_run
//! use std::sync::Arc;
//! use gait_live::{LiveClient, TracingSink};
//! use gait_settings::load_settings;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = load_settings()?;
//! settings.logging.init();
//! let client = LiveClient::from_settings(&settings, Arc::new(TracingSink));
//! client.wait_for_state(gait_live::ConnectionState::Connected).await?;
//! let _ = client.send_message(&serde_json::json!({"type": "ping"})).await?;
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod client;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod manager;
pub mod notify;
pub mod state;
pub mod timer;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::LiveClient;
pub use dispatch::{CommitRoute, FrameRoute, InsightRoute, MessageDispatcher, NotificationRoute};
pub use endpoint::{Endpoint, EndpointResolver};
pub use error::{LiveError, Result};
pub use frame::{FrameError, FrameKind, InboundFrame};
pub use manager::ConnectionManager;
pub use notify::{
    ChannelSink, Notification, NotificationLevel, NotificationSink, Notifier, TracingSink,
};
pub use state::ConnectionState;
pub use transport::{
    Channel, ConnectionId, ManagerEvent, ReadyState, Transport, TransportEvent, TransportEvents,
    WsChannel, WsTransport,
};
