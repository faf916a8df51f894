//! Per-connection relay actor
//!
//! The relay reads request frames from one client connection, runs at most
//! one agent invocation at a time and forwards the encoded events to the
//! connection's outbound queue. It keeps no transcript state.

use super::encoder::EventEncoder;
use crate::agent::AgentStreamAdapter;
use crate::error::{AgentError, Error, ProtocolError};
use crate::types::{ClientRequest, WireEvent};
use futures::{FutureExt, Stream, StreamExt};
use std::panic::AssertUnwindSafe;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Relay lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Waiting for a request
    Idle,
    /// One invocation is being forwarded
    Streaming,
    /// Transport closed; terminal
    Closed,
}

/// The invocation currently being forwarded
struct ActiveStream {
    id: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Relay for a single client connection
pub struct ConnectionRelay {
    connection_id: String,
    adapter: AgentStreamAdapter,
    outbound: mpsc::Sender<WireEvent>,
    state_tx: watch::Sender<RelayState>,
    active: Option<ActiveStream>,
    next_stream_id: u64,
    finished_tx: mpsc::UnboundedSender<u64>,
    finished_rx: mpsc::UnboundedReceiver<u64>,
}

impl ConnectionRelay {
    pub fn new(
        connection_id: impl Into<String>,
        adapter: AgentStreamAdapter,
        outbound: mpsc::Sender<WireEvent>,
    ) -> Self {
        let (state_tx, _) = watch::channel(RelayState::Idle);
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            connection_id: connection_id.into(),
            adapter,
            outbound,
            state_tx,
            active: None,
            next_stream_id: 1,
            finished_tx,
            finished_rx,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn state(&self) -> RelayState {
        *self.state_tx.borrow()
    }

    /// Observe state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<RelayState> {
        self.state_tx.subscribe()
    }

    /// Drive the relay until the inbound side of the connection ends.
    ///
    /// Each inbound item is one text frame. When the stream ends the relay
    /// moves to `Closed` and cancels any in-flight invocation.
    pub async fn run<S>(mut self, inbound: S)
    where
        S: Stream<Item = String> + Send + Unpin,
    {
        let mut inbound = inbound;
        info!("Relay {} ready (agent: {})", self.connection_id, self.adapter.agent_name());

        loop {
            tokio::select! {
                frame = inbound.next() => match frame {
                    Some(text) => self.handle_frame(&text).await,
                    None => break,
                },
                Some(id) = self.finished_rx.recv() => self.finish_stream(id),
            }
        }

        self.close();
    }

    async fn handle_frame(&mut self, text: &str) {
        // A stream may have ended while we were waiting on the socket.
        while let Ok(id) = self.finished_rx.try_recv() {
            self.finish_stream(id);
        }

        let request = match serde_json::from_str::<ClientRequest>(text) {
            Ok(request) => request,
            Err(e) => {
                let err = ProtocolError::MalformedRequest(e.to_string());
                let snippet = text.chars().take(200).collect::<String>();
                warn!("Dropping request on {} ({}): {}", self.connection_id, err, snippet);
                return;
            }
        };

        match self.state() {
            RelayState::Idle => self.start_stream(request),
            RelayState::Streaming => {
                warn!(
                    "Rejecting request on {}: invocation already in flight",
                    self.connection_id
                );
                let event = WireEvent::error(Error::ConcurrentInvocation.to_string());
                if self.outbound.send(event).await.is_err() {
                    debug!("Outbound queue closed for {}", self.connection_id);
                }
            }
            RelayState::Closed => {
                debug!("Ignoring request on closed relay {}", self.connection_id);
            }
        }
    }

    fn start_stream(&mut self, request: ClientRequest) {
        let id = self.next_stream_id;
        self.next_stream_id += 1;

        info!(
            "Relay {} starting stream {} for session {}",
            self.connection_id, id, request.session_id
        );

        let cancel = CancellationToken::new();
        let forward = forward_stream(
            id,
            self.adapter.clone(),
            request,
            self.outbound.clone(),
            cancel.clone(),
        );
        let outbound = self.outbound.clone();
        let finished = self.finished_tx.clone();
        let task = tokio::spawn(async move {
            // A panicking agent must not leave the relay stuck in Streaming.
            if AssertUnwindSafe(forward).catch_unwind().await.is_err() {
                error!("Stream {} panicked", id);
                let failure = AgentError::InvocationFailed("agent stream panicked".to_string());
                let _ = outbound.send(WireEvent::error(Error::from(failure).to_string())).await;
            }
            let _ = finished.send(id);
        });

        self.active = Some(ActiveStream { id, cancel, task });
        self.state_tx.send_replace(RelayState::Streaming);
    }

    fn finish_stream(&mut self, id: u64) {
        match &self.active {
            Some(active) if active.id == id => {
                debug!("Relay {} stream {} finished", self.connection_id, id);
                self.active = None;
                if self.state() == RelayState::Streaming {
                    self.state_tx.send_replace(RelayState::Idle);
                }
            }
            _ => debug!("Ignoring completion of stale stream {}", id),
        }
    }

    fn close(&mut self) {
        if let Some(active) = self.active.take() {
            info!(
                "Relay {} closed with stream {} in flight, cancelling",
                self.connection_id, active.id
            );
            active.cancel.cancel();
            // Dropping the handle detaches; the task exits at its next await.
            drop(active.task);
        } else {
            info!("Relay {} closed", self.connection_id);
        }
        self.state_tx.send_replace(RelayState::Closed);
    }
}

/// Forward one invocation's fragments until its terminal fragment or
/// cancellation.
async fn forward_stream(
    id: u64,
    adapter: AgentStreamAdapter,
    request: ClientRequest,
    outbound: mpsc::Sender<WireEvent>,
    cancel: CancellationToken,
) {
    let mut fragments = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        stream = adapter.open(&request.content, &request.session_id) => stream,
    };

    let mut encoder = EventEncoder::new();
    loop {
        let fragment = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Stream {} cancelled", id);
                return;
            }
            fragment = fragments.next() => fragment,
        };

        let Some(fragment) = fragment else { break };
        let terminal = fragment.is_terminal();

        if let Some(event) = encoder.encode(fragment) {
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                sent = outbound.send(event) => sent,
            };
            if sent.is_err() {
                debug!("Outbound queue closed, abandoning stream {}", id);
                return;
            }
        }

        if terminal {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentChunk, AgentInvoker, ChunkStream, ScriptedAgent};
    use crate::error::Result;
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Arc;
    use std::task::Poll;
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Agent whose chunks are fed by the test through a channel
    struct ChannelAgent {
        chunks: Mutex<Option<mpsc::UnboundedReceiver<Result<AgentChunk>>>>,
        dropped: Arc<tokio::sync::Notify>,
    }

    struct DropSignal(Arc<tokio::sync::Notify>);

    impl Drop for DropSignal {
        fn drop(&mut self) {
            self.0.notify_one();
        }
    }

    #[async_trait]
    impl AgentInvoker for ChannelAgent {
        fn name(&self) -> &'static str {
            "channel"
        }

        async fn invoke(&self, _request: &str, _session_id: &str) -> Result<ChunkStream> {
            let rx = self
                .chunks
                .lock()
                .await
                .take()
                .ok_or_else(|| Error::Internal("already invoked".to_string()))?;
            let guard = DropSignal(Arc::clone(&self.dropped));
            Ok(stream::unfold((rx, guard), |(mut rx, guard)| async move {
                rx.recv().await.map(|chunk| (chunk, (rx, guard)))
            })
            .boxed())
        }
    }

    fn request(content: &str) -> String {
        serde_json::to_string(&ClientRequest::new(content, "default-session")).unwrap()
    }

    fn spawn_relay(
        invoker: Arc<dyn AgentInvoker>,
    ) -> (
        mpsc::UnboundedSender<String>,
        mpsc::Receiver<WireEvent>,
        watch::Receiver<RelayState>,
        JoinHandle<()>,
    ) {
        let (outbound_tx, outbound_rx) = mpsc::channel(16);
        let relay = ConnectionRelay::new("test", AgentStreamAdapter::new(invoker), outbound_tx);
        let state = relay.subscribe_state();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
        let inbound = stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        })
        .boxed();
        let task = tokio::spawn(relay.run(inbound));
        (inbound_tx, outbound_rx, state, task)
    }

    #[tokio::test]
    async fn test_streams_accumulated_messages_then_idles() {
        let agent = ScriptedAgent::new(vec![
            AgentChunk::text("H"),
            AgentChunk::text("e"),
            AgentChunk::text("llo"),
        ]);
        let (inbound, mut outbound, mut state, _task) = spawn_relay(Arc::new(agent));

        inbound.send(request("hi")).unwrap();

        let mut contents = Vec::new();
        for _ in 0..3 {
            let event = outbound.recv().await.unwrap();
            assert_eq!(event.kind(), "message");
            contents.push(event.content().unwrap().to_string());
        }
        assert_eq!(contents, vec!["H", "He", "Hello"]);

        state.wait_for(|s| *s == RelayState::Idle).await.unwrap();
    }

    #[tokio::test]
    async fn test_agent_failure_becomes_error_event() {
        let agent = ScriptedAgent::new(vec![AgentChunk::text("partial")]).with_failure("boom");
        let (inbound, mut outbound, mut state, _task) = spawn_relay(Arc::new(agent));

        inbound.send(request("hi")).unwrap();

        assert_eq!(outbound.recv().await.unwrap().kind(), "message");
        let error = outbound.recv().await.unwrap();
        assert_eq!(error.kind(), "error");
        assert!(error.content().unwrap().contains("boom"));

        // The connection survives and accepts the next request.
        state.wait_for(|s| *s == RelayState::Idle).await.unwrap();
        inbound.send(request("again")).unwrap();
        assert_eq!(outbound.recv().await.unwrap().content(), Some("partial"));
    }

    /// Agent that yields one chunk, then panics mid-stream
    struct PanickingAgent;

    #[async_trait]
    impl AgentInvoker for PanickingAgent {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn invoke(&self, _request: &str, _session_id: &str) -> Result<ChunkStream> {
            let blow_up = stream::poll_fn(|_| -> Poll<Option<Result<AgentChunk>>> {
                panic!("agent blew up")
            });
            Ok(stream::iter(vec![Ok(AgentChunk::text("partial"))])
                .chain(blow_up)
                .boxed())
        }
    }

    #[tokio::test]
    async fn test_panicking_agent_reports_error_and_idles() {
        let (inbound, mut outbound, mut state, _task) = spawn_relay(Arc::new(PanickingAgent));

        inbound.send(request("hi")).unwrap();
        assert_eq!(outbound.recv().await.unwrap().content(), Some("partial"));
        let error = outbound.recv().await.unwrap();
        assert_eq!(error.kind(), "error");
        assert!(error.content().unwrap().contains("panicked"));

        // The next request is served instead of rejected as concurrent.
        state.wait_for(|s| *s == RelayState::Idle).await.unwrap();
        inbound.send(request("again")).unwrap();
        let next = outbound.recv().await.unwrap();
        assert_eq!(next.kind(), "message");
        assert_eq!(next.content(), Some("partial"));
    }

    #[tokio::test]
    async fn test_second_request_rejected_while_streaming() {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let agent = ChannelAgent {
            chunks: Mutex::new(Some(chunk_rx)),
            dropped: Arc::new(tokio::sync::Notify::new()),
        };
        let (inbound, mut outbound, mut state, _task) = spawn_relay(Arc::new(agent));

        inbound.send(request("first")).unwrap();
        chunk_tx.send(Ok(AgentChunk::text("Hel"))).unwrap();
        assert_eq!(outbound.recv().await.unwrap().content(), Some("Hel"));
        state.wait_for(|s| *s == RelayState::Streaming).await.unwrap();

        inbound.send(request("second")).unwrap();
        let rejection = outbound.recv().await.unwrap();
        assert_eq!(rejection.kind(), "error");
        assert!(rejection.content().unwrap().contains("already in progress"));

        // The first stream carries on unaffected.
        chunk_tx.send(Ok(AgentChunk::text("lo"))).unwrap();
        assert_eq!(outbound.recv().await.unwrap().content(), Some("Hello"));
        drop(chunk_tx);
        state.wait_for(|s| *s == RelayState::Idle).await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_request_is_dropped_silently() {
        let agent = ScriptedAgent::new(vec![AgentChunk::text("ok")]);
        let (inbound, mut outbound, state, _task) = spawn_relay(Arc::new(agent));

        inbound.send("{not json".to_string()).unwrap();
        inbound.send(r#"{"content":"missing session"}"#.to_string()).unwrap();
        inbound.send(request("valid")).unwrap();

        // The first event seen belongs to the valid request.
        assert_eq!(outbound.recv().await.unwrap().content(), Some("ok"));
        assert_ne!(*state.borrow(), RelayState::Closed);
    }

    #[tokio::test]
    async fn test_close_cancels_in_flight_stream() {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let dropped = Arc::new(tokio::sync::Notify::new());
        let agent = ChannelAgent {
            chunks: Mutex::new(Some(chunk_rx)),
            dropped: Arc::clone(&dropped),
        };
        let (inbound, mut outbound, mut state, task) = spawn_relay(Arc::new(agent));

        inbound.send(request("first")).unwrap();
        chunk_tx.send(Ok(AgentChunk::text("partial"))).unwrap();
        assert!(outbound.recv().await.is_some());

        drop(inbound);
        state.wait_for(|s| *s == RelayState::Closed).await.unwrap();
        task.await.unwrap();

        // The agent stream is dropped and nothing more is forwarded.
        tokio::time::timeout(Duration::from_secs(1), dropped.notified())
            .await
            .expect("agent stream should be dropped");
        let _ = chunk_tx.send(Ok(AgentChunk::text("late")));
        assert!(outbound.recv().await.is_none());
    }
}
