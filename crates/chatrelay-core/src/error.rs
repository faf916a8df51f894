//! Error types for ChatRelay Core

use thiserror::Error;

/// Main error type for ChatRelay operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("An agent invocation is already in progress on this connection")]
    ConcurrentInvocation,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Connection and send failures
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected to agent")]
    NotConnected,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection closed")]
    Closed,
}

/// Malformed payloads crossing the wire
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Unsupported frame: {0}")]
    UnsupportedFrame(String),
}

/// Agent invocation errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Failed to start agent: {0}")]
    StartFailed(String),

    #[error("Agent invocation failed: {0}")]
    InvocationFailed(String),

    #[error("Agent exited with {0}")]
    Exited(String),
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Invalid TOML: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Required environment variables are not set: {}", .0.join(", "))]
    MissingEnv(Vec<String>),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(ConfigError::Parse(err.to_string()))
    }
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;
