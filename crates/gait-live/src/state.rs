//! Connection lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the live channel.
///
/// `Connecting` is entered on every (re)connect attempt, `Error` is reachable
/// from `Connecting` or `Connected`, and `Disconnected` is both the initial
/// state and where the manager settles once it stops retrying.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// A channel is being opened.
    Connecting,
    /// The channel is open.
    Connected,
    /// No channel is open.
    #[default]
    Disconnected,
    /// The transport reported an error; a close normally follows.
    Error,
}

impl ConnectionState {
    /// Wire/display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }

    /// Whether the channel is open.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
