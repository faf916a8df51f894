//! ChatRelay Application
//!
//! Network and terminal surfaces for ChatRelay:
//! - `server` - axum WebSocket endpoint hosting one relay per connection
//! - `ws_client` - tokio-tungstenite connector for the client session
//! - `console` - terminal rendering of the session transcript

pub mod console;
pub mod server;
pub mod ws_client;

pub use server::{router, RelayServer};
pub use ws_client::WsConnector;
