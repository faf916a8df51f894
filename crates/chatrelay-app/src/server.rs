//! WebSocket relay server
//!
//! Every accepted socket gets its own `ConnectionRelay`, a writer task that
//! serializes wire events into text frames, and a bounded outbound queue so a
//! slow client only stalls its own connection.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chatrelay_core::agent::{self, AgentInvoker, AgentStreamAdapter};
use chatrelay_core::config::ServerConfig;
use chatrelay_core::error::ProtocolError;
use chatrelay_core::{ConnectionRelay, WireEvent};
use futures::stream::{self, BoxStream, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared state for the WebSocket endpoint
#[derive(Clone)]
pub struct RelayServer {
    agent: Arc<dyn AgentInvoker>,
    outbound_buffer: usize,
    next_connection: Arc<AtomicU64>,
}

impl RelayServer {
    pub fn new(agent: Arc<dyn AgentInvoker>, outbound_buffer: usize) -> Self {
        Self {
            agent,
            outbound_buffer: outbound_buffer.max(1),
            next_connection: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Build the server from configuration, including the configured agent
    pub fn from_config(config: &ServerConfig) -> chatrelay_core::Result<Self> {
        let agent = agent::from_config(config)?;
        Ok(Self::new(agent, config.outbound_buffer))
    }

    /// Serve connections on `listener` until the task is dropped
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("WebSocket server is running on ws://{}", addr);
        }
        axum::serve(listener, router(self)).await
    }
}

pub fn router(server: RelayServer) -> Router {
    Router::new()
        .route("/", get(ws_connect))
        .with_state(server)
}

async fn ws_connect(State(server): State<RelayServer>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, server))
}

async fn handle_socket(socket: WebSocket, server: RelayServer) {
    let id = server.next_connection.fetch_add(1, Ordering::Relaxed);
    let connection_id = format!("conn-{}", id);
    info!("New client connected: {}", connection_id);

    let (mut sink, inbound) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<WireEvent>(server.outbound_buffer);

    let writer_id = connection_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode {} event: {}", event.kind(), e);
                    continue;
                }
            };
            if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                debug!("Writer for {} stopped: {}", writer_id, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    let adapter = AgentStreamAdapter::new(Arc::clone(&server.agent));
    let relay = ConnectionRelay::new(connection_id.clone(), adapter, outbound_tx);
    relay.run(text_frames(inbound, connection_id.clone())).await;

    if let Err(e) = writer.await {
        warn!("Writer task for {} failed: {}", connection_id, e);
    }
    info!("Client disconnected: {}", connection_id);
}

/// Text payloads of the inbound socket, ending at close or on a read error
fn text_frames(inbound: SplitStream<WebSocket>, connection_id: String) -> BoxStream<'static, String> {
    stream::unfold((inbound, connection_id), |(mut inbound, connection_id)| async move {
        loop {
            match inbound.next().await? {
                Ok(WsMessage::Text(text)) => {
                    return Some((text.as_str().to_owned(), (inbound, connection_id)));
                }
                Ok(WsMessage::Binary(bytes)) => {
                    let err = ProtocolError::UnsupportedFrame(format!("{} binary bytes", bytes.len()));
                    warn!("Dropping frame from {}: {}", connection_id, err);
                }
                Ok(WsMessage::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => {
                    debug!("Read error on {}: {}", connection_id, e);
                    return None;
                }
            }
        }
    })
    .boxed()
}
