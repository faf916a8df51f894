//! Core type definitions for ChatRelay
//!
//! This module contains the shared types used on both sides of the relay:
//! wire protocol types, transcript types and client session types.

mod message_types;
mod session_types;
mod wire_types;

pub use message_types::*;
pub use session_types::*;
pub use wire_types::*;

/// Session id used when the client is not configured with one
pub const DEFAULT_SESSION_ID: &str = "default-session";
