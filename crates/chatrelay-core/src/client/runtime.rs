//! Client runtime
//!
//! A single task owns the `Session` and processes every input in arrival
//! order: user commands, transport lifecycle, inbound frames and the reconnect
//! timer. Presentation layers talk to it through a cloneable `SessionHandle`.

use super::assembler::Reduction;
use super::scheduler::ReconnectScheduler;
use super::session::{Session, SessionEffect};
use crate::config::ClientConfig;
use crate::error::{Error, Result, TransportError};
use crate::types::{Notification, SessionSnapshot};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

const NOTIFICATION_CAPACITY: usize = 64;

/// Opens transports for the session runtime.
///
/// Implementations report inbound frames and lifecycle changes through the
/// supplied `TransportEvents` and return a handle for outbound frames.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, events: TransportEvents) -> Result<TransportHandle>;
}

/// Callback side of one transport attempt
#[derive(Debug, Clone)]
pub struct TransportEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<Input>,
}

impl TransportEvents {
    /// Deliver an inbound text frame. Returns false once the runtime is gone.
    pub fn frame(&self, text: impl Into<String>) -> bool {
        self.tx
            .send(Input::Frame {
                generation: self.generation,
                text: text.into(),
            })
            .is_ok()
    }

    pub fn closed(&self) {
        let _ = self.tx.send(Input::Closed {
            generation: self.generation,
            reason: None,
        });
    }

    pub fn error(&self, reason: impl Into<String>) {
        let _ = self.tx.send(Input::Closed {
            generation: self.generation,
            reason: Some(reason.into()),
        });
    }
}

/// Outbound side of an open transport. Dropping it closes the transport.
#[derive(Debug)]
pub struct TransportHandle {
    outbound: mpsc::Sender<String>,
}

impl TransportHandle {
    pub fn new(outbound: mpsc::Sender<String>) -> Self {
        Self { outbound }
    }

    async fn send(&self, text: String) -> Result<()> {
        self.outbound
            .send(text)
            .await
            .map_err(|_| TransportError::Closed.into())
    }
}

#[derive(Debug)]
enum Input {
    Connect,
    Disconnect,
    Send {
        content: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Opened {
        generation: u64,
        result: Result<TransportHandle>,
    },
    Frame {
        generation: u64,
        text: String,
    },
    Closed {
        generation: u64,
        reason: Option<String>,
    },
    ReconnectDue {
        timer: u64,
    },
    Shutdown,
}

/// Cloneable handle to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    input: mpsc::UnboundedSender<Input>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    notify_tx: broadcast::Sender<Notification>,
}

impl SessionHandle {
    pub fn connect(&self) {
        let _ = self.input.send(Input::Connect);
    }

    pub fn disconnect(&self) {
        let _ = self.input.send(Input::Disconnect);
    }

    /// Send a user message. Fails with `NotConnected` unless connected.
    pub async fn send(&self, content: impl Into<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.input
            .send(Input::Send {
                content: content.into(),
                reply,
            })
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notify_tx.subscribe()
    }

    /// Disconnect and stop the runtime task
    pub fn shutdown(&self) {
        let _ = self.input.send(Input::Shutdown);
    }
}

fn stopped() -> Error {
    Error::Internal("session runtime stopped".to_string())
}

/// Spawn the runtime task for one session. Call `connect()` to start.
pub fn spawn_session(config: &ClientConfig, connector: Arc<dyn Connector>) -> SessionHandle {
    let session = Session::new(config.session_id.clone(), config.reconnect_delay());
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
    let (notify_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);

    let runtime = SessionRuntime {
        session,
        connector,
        scheduler: ReconnectScheduler::new(),
        transport: None,
        generation: 0,
        reconnect_timer: 0,
        input_tx: input_tx.clone(),
        snapshot_tx,
        notify_tx: notify_tx.clone(),
    };
    tokio::spawn(runtime.run(input_rx));

    SessionHandle {
        input: input_tx,
        snapshot_rx,
        notify_tx,
    }
}

struct SessionRuntime {
    session: Session,
    connector: Arc<dyn Connector>,
    scheduler: ReconnectScheduler,
    transport: Option<TransportHandle>,
    /// Identifies the current transport attempt; events from older ones are stale.
    generation: u64,
    /// Identifies the armed reconnect timer; earlier firings are stale.
    reconnect_timer: u64,
    input_tx: mpsc::UnboundedSender<Input>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    notify_tx: broadcast::Sender<Notification>,
}

impl SessionRuntime {
    async fn run(mut self, mut input_rx: mpsc::UnboundedReceiver<Input>) {
        info!("Session runtime started: {}", self.session.id());

        while let Some(input) = input_rx.recv().await {
            let effects = match input {
                Input::Connect => self.session.connect(),
                Input::Disconnect => self.session.disconnect(),
                Input::Send { content, reply } => {
                    let result = self.handle_send(content).await;
                    let _ = reply.send(result);
                    Vec::new()
                }
                Input::Opened { generation, result } => self.handle_opened(generation, result),
                Input::Frame { generation, text } => {
                    if generation == self.generation {
                        if let Some(Reduction::Notify(notification)) = self.session.receive(&text) {
                            self.notify(notification);
                        }
                    } else {
                        debug!("Dropping frame from stale transport {}", generation);
                    }
                    Vec::new()
                }
                Input::Closed { generation, reason } => self.handle_closed(generation, reason),
                Input::ReconnectDue { timer } => {
                    if timer == self.reconnect_timer {
                        self.session.reconnect_due()
                    } else {
                        debug!("Ignoring superseded reconnect timer {}", timer);
                        Vec::new()
                    }
                }
                Input::Shutdown => {
                    let effects = self.session.disconnect();
                    self.apply_effects(effects);
                    self.publish();
                    break;
                }
            };

            self.apply_effects(effects);
            self.publish();
        }

        info!("Session runtime stopped: {}", self.session.id());
    }

    async fn handle_send(&mut self, content: String) -> Result<()> {
        if content.trim().is_empty() {
            debug!("Ignoring empty message");
            return Ok(());
        }

        let request = match self.session.send(&content) {
            Ok(request) => request,
            Err(e) => {
                warn!("Send rejected: {}", e);
                self.notify(Notification::Rejected(e.to_string()));
                return Err(e);
            }
        };

        let sent = match (serde_json::to_string(&request), &self.transport) {
            (Ok(payload), Some(transport)) => transport.send(payload).await,
            (Ok(_), None) => Err(TransportError::NotConnected.into()),
            (Err(e), _) => Err(e.into()),
        };

        if let Err(e) = &sent {
            warn!("Send failed: {}", e);
            let effects = self.session.send_failed(e);
            self.apply_effects(effects);
        }
        sent
    }

    fn handle_opened(&mut self, generation: u64, result: Result<TransportHandle>) -> Vec<SessionEffect> {
        if generation != self.generation {
            debug!("Discarding stale transport attempt {}", generation);
            return Vec::new();
        }

        match result {
            Ok(handle) => {
                self.transport = Some(handle);
                self.session.transport_opened()
            }
            Err(e) => {
                debug!("Connection attempt failed: {}", e);
                self.generation += 1;
                self.session.transport_closed()
            }
        }
    }

    fn handle_closed(&mut self, generation: u64, reason: Option<String>) -> Vec<SessionEffect> {
        if generation != self.generation {
            debug!("Ignoring close from stale transport {}", generation);
            return Vec::new();
        }

        if let Some(reason) = reason {
            warn!("Transport error: {}", reason);
        }
        self.transport = None;
        self.generation += 1;
        self.session.transport_closed()
    }

    fn apply_effects(&mut self, effects: Vec<SessionEffect>) {
        for effect in effects {
            match effect {
                SessionEffect::OpenTransport => self.open_transport(),
                SessionEffect::CloseTransport => {
                    // Dropping the handle closes the transport.
                    self.transport = None;
                    self.generation += 1;
                }
                SessionEffect::ScheduleReconnect(delay) => {
                    self.reconnect_timer += 1;
                    let timer = self.reconnect_timer;
                    let tx = self.input_tx.clone();
                    self.scheduler.schedule(delay, move || {
                        let _ = tx.send(Input::ReconnectDue { timer });
                    });
                }
                SessionEffect::CancelReconnect => {
                    // A timer that already fired may still be queued.
                    self.reconnect_timer += 1;
                    if self.scheduler.cancel() {
                        debug!("Pending reconnect cancelled");
                    }
                }
                SessionEffect::Notify(notification) => self.notify(notification),
            }
        }
    }

    fn open_transport(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let events = TransportEvents {
            generation,
            tx: self.input_tx.clone(),
        };
        let connector = Arc::clone(&self.connector);
        let tx = self.input_tx.clone();

        tokio::spawn(async move {
            let result = connector.connect(events).await;
            if tx.send(Input::Opened { generation, result }).is_err() {
                error!("Session runtime gone before transport {} opened", generation);
            }
        });
    }

    fn notify(&self, notification: Notification) {
        // No receivers is fine; notifications are transient.
        let _ = self.notify_tx.send(notification);
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.session.snapshot());
    }
}
