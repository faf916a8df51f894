//! Client session and notification types

use super::Message;
use serde::{Deserialize, Serialize};

/// Connection status of a client session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Not connected
    Disconnected,
    /// Transport is being opened
    Connecting,
    /// Connected and ready to send
    Connected,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// Transient, user-visible notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Notification {
    Connected,
    Disconnected,
    /// Error reported by the agent or the relay
    Error(String),
    /// Local failure, e.g. sending while disconnected
    Rejected(String),
    /// Connection-status event from the relay
    Status(String),
}

impl Notification {
    pub fn message(&self) -> String {
        match self {
            Self::Connected => "Connected to AI agent".to_string(),
            Self::Disconnected => "Disconnected from AI agent".to_string(),
            Self::Error(reason) => format!("Error: {}", reason),
            Self::Rejected(reason) => reason.clone(),
            Self::Status(status) => status.clone(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error(_) | Self::Rejected(_))
    }
}

/// Read-only view handed to presentation layers
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: ConnectionStatus,
    pub messages: Vec<Message>,
    pub awaiting_response: bool,
    pub reconnect_attempts: u32,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}
