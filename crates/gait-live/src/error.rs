//! Live channel error types.

use thiserror::Error;

/// Errors surfaced by the live channel's public API.
///
/// The connection manager itself never propagates these to the host: transport
/// failures become state transitions and log lines. They surface only from
/// endpoint construction and from [`LiveClient`](crate::client::LiveClient)
/// commands issued after its background task has stopped.
#[derive(Debug, Error)]
pub enum LiveError {
    /// The endpoint or URL could not be used to open a channel.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// The underlying transport refused to open a channel.
    #[error("transport error: {0}")]
    Transport(String),
    /// An outbound payload could not be encoded as JSON.
    #[error("failed to serialize outbound message: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The background client task is no longer running.
    #[error("live client has shut down")]
    ClientClosed,
}

/// Result type for live channel operations.
pub type Result<T> = std::result::Result<T, LiveError>;
