//! WebSocket transport for the client session

use async_trait::async_trait;
use chatrelay_core::error::{Result, TransportError};
use chatrelay_core::{Connector, TransportEvents, TransportHandle};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

const OUTBOUND_BUFFER: usize = 32;

/// Opens a WebSocket to the relay for every connection attempt
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, events: TransportEvents) -> Result<TransportHandle> {
        debug!("Connecting to {}", self.url);
        let (socket, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", self.url, e)))?;
        info!("WebSocket open: {}", self.url);

        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = outbound_rx.recv() => match outbound {
                        Some(text) => {
                            if let Err(e) = sink.send(Message::Text(text.into())).await {
                                events.error(TransportError::SendFailed(e.to_string()).to_string());
                                break;
                            }
                        }
                        None => {
                            // Handle dropped: the session closed this transport.
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    inbound = stream.next() => match inbound {
                        Some(Ok(Message::Text(text))) => {
                            if !events.frame(text.as_str()) {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            events.closed();
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            events.error(e.to_string());
                            break;
                        }
                    },
                }
            }
            debug!("WebSocket transport task finished");
        });

        Ok(TransportHandle::new(outbound_tx))
    }
}
