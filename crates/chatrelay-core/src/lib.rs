//! ChatRelay Core Library
//!
//! This crate provides the core functionality for ChatRelay, including:
//! - Agent invocation and stream normalization
//! - The per-connection relay turning agent output into wire events
//! - The client session state machine, reconnect scheduling and transcript
//!   assembly
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     chatrelay-core                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  agent/        - Agent invoker, stream adapter, agents      │
//! │  relay/        - Event encoder, connection relay            │
//! │  client/       - Session, scheduler, assembler, runtime     │
//! │  types/        - Shared type definitions                    │
//! │  config.rs     - TOML configuration                         │
//! │  error.rs      - Error types                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod client;
pub mod config;
pub mod error;
pub mod relay;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;

pub use agent::{
    AgentChunk, AgentInvoker, AgentStreamAdapter, EchoAgent, Fragment, ProcessAgent,
    ScriptedAgent,
};
pub use client::{
    spawn_session, Connector, Session, SessionHandle, Transcript, TransportEvents,
    TransportHandle,
};
pub use config::{ClientConfig, Config, ServerConfig};
pub use relay::{ConnectionRelay, EventEncoder, RelayState};
