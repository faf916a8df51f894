//! Server-side relay
//!
//! - `EventEncoder` - maps agent fragments to wire events
//! - `ConnectionRelay` - per-connection actor enforcing one invocation at a time

mod connection;
mod encoder;

pub use connection::{ConnectionRelay, RelayState};
pub use encoder::EventEncoder;
