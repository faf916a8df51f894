//! Client session
//!
//! - `Session` - pure connection/transcript state machine
//! - `assembler` - reduces wire events into the transcript
//! - `ReconnectScheduler` - single cancellable reconnect timer
//! - `spawn_session` - runtime task driving a session over a `Connector`

pub mod assembler;
mod runtime;
mod scheduler;
mod session;

pub use assembler::{parse_tool_call, Reduction, Transcript, FALLBACK_TOOL_NAME};
pub use runtime::{spawn_session, Connector, SessionHandle, TransportEvents, TransportHandle};
pub use scheduler::ReconnectScheduler;
pub use session::{Session, SessionEffect};
