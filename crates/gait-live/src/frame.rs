//! Inbound frame decoding.
//!
//! Every message from the push service is a JSON object
//! `{ "type": string, "payload": any, "timestamp"?: string }`. The `type`
//! tag is an open set: kinds this crate does not know are kept as
//! [`FrameKind::Other`] so newer servers never break older clients.
//!
//! JSON that parses but is not an object with a string `type` is rejected
//! with [`FrameError::MissingType`], the same as invalid JSON, so it never
//! becomes the last received frame.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Frame kind tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// User-facing notification.
    Notification,
    /// A new commit landed.
    Commit,
    /// Repository analysis produced an insight.
    Insight,
    /// Dashboard snapshot sent right after connecting.
    InitialData,
    /// Incremental dashboard data.
    Update,
    /// Any other tag.
    Other(String),
}

impl FrameKind {
    /// Map a wire tag to a kind.
    pub fn from_wire(tag: &str) -> Self {
        match tag {
            "notification" => Self::Notification,
            "commit" => Self::Commit,
            "insight" => Self::Insight,
            "initial_data" => Self::InitialData,
            "update" => Self::Update,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Wire tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Notification => "notification",
            Self::Commit => "commit",
            Self::Insight => "insight",
            Self::InitialData => "initial_data",
            Self::Update => "update",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FrameKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Errors decoding an inbound frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The text is not valid JSON.
    #[error("invalid frame JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The JSON is not an object with a string `type` tag.
    #[error("frame has no string \"type\" tag")]
    MissingType,
}

/// A decoded frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InboundFrame {
    /// Kind tag.
    #[serde(rename = "type")]
    pub kind: FrameKind,
    /// Kind-specific payload; `null` when absent.
    pub payload: Value,
    /// Server send time as sent on the wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl InboundFrame {
    /// Build a frame directly.
    pub fn new(kind: FrameKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            timestamp: None,
        }
    }

    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut map) = value else {
            return Err(FrameError::MissingType);
        };
        let kind = match map.get("type") {
            Some(Value::String(tag)) => FrameKind::from_wire(tag),
            _ => return Err(FrameError::MissingType),
        };
        let payload = map.remove("payload").unwrap_or(Value::Null);
        let timestamp = match map.remove("timestamp") {
            Some(Value::String(ts)) => Some(ts),
            _ => None,
        };
        Ok(Self {
            kind,
            payload,
            timestamp,
        })
    }

    /// Server send time, if present and valid RFC 3339.
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
    }
}
