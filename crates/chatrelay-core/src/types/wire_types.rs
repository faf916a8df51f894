//! Wire protocol types
//!
//! Everything that crosses the relay boundary is one of these two types,
//! serialized as a single JSON text frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Client → server request to start one agent invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRequest {
    pub content: String,
    pub session_id: String,
}

impl ClientRequest {
    pub fn new(content: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            session_id: session_id.into(),
        }
    }
}

/// Server → client event
///
/// `Message` always carries the full accumulated agent text of the current
/// invocation; receivers replace the open message's content with it.
/// `Tools` carries the agent's raw tool payload, parsed only by the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireEvent {
    Message {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "lenient_timestamp"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    Tools {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "lenient_timestamp"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "lenient_timestamp"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    Connection {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "lenient_timestamp"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
}

impl WireEvent {
    pub fn message(content: impl Into<String>) -> Self {
        Self::Message {
            content: Some(content.into()),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn tools(raw: impl Into<String>) -> Self {
        Self::Tools {
            content: Some(raw.into()),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            content: Some(reason.into()),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn connection(status: impl Into<String>) -> Self {
        Self::Connection {
            content: Some(status.into()),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Message { content, .. }
            | Self::Tools { content, .. }
            | Self::Error { content, .. }
            | Self::Connection { content, .. } => content.as_deref(),
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Message { timestamp, .. }
            | Self::Tools { timestamp, .. }
            | Self::Error { timestamp, .. }
            | Self::Connection { timestamp, .. } => *timestamp,
        }
    }

    /// Wire name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Tools { .. } => "tools",
            Self::Error { .. } => "error",
            Self::Connection { .. } => "connection",
        }
    }
}

/// Timestamps are informational: an unparseable one becomes `None` instead of
/// rejecting the whole event.
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|time| time.with_timezone(&Utc)))
}
