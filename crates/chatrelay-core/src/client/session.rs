//! Client session state machine
//!
//! `Session` owns the connection status, the transcript and the reconnect
//! bookkeeping. It performs no I/O: every transition returns the effects the
//! runtime must carry out.
//!
//! ```text
//!              connect()            transport open
//! Disconnected ─────────► Connecting ─────────────► Connected
//!      ▲  ▲                   │                         │
//!      │  └── close/error ────┴──────── close/error ────┘
//!      │        (schedules reconnect after a fixed delay)
//!      └── disconnect() from any state (cancels the reconnect)
//! ```
//!
//! Reconnects are unbounded and use a fixed delay without backoff. For a
//! single client this keeps the chat available with no operator action.

use super::assembler::{self, Reduction, Transcript};
use crate::error::{Error, ProtocolError, Result, TransportError};
use crate::types::{ClientRequest, ConnectionStatus, Notification, SessionSnapshot, WireEvent};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Side effect requested by a session transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    OpenTransport,
    CloseTransport,
    ScheduleReconnect(Duration),
    CancelReconnect,
    Notify(Notification),
}

/// One logical conversation
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    status: ConnectionStatus,
    transcript: Transcript,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
    reconnect_pending: bool,
    awaiting_response: bool,
}

impl Session {
    pub fn new(id: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            id: id.into(),
            status: ConnectionStatus::Disconnected,
            transcript: Transcript::new(),
            reconnect_attempts: 0,
            reconnect_delay,
            reconnect_pending: false,
            awaiting_response: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn is_reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            status: self.status,
            messages: self.transcript.messages().to_vec(),
            awaiting_response: self.awaiting_response,
            reconnect_attempts: self.reconnect_attempts,
        }
    }

    /// Explicit connect request
    pub fn connect(&mut self) -> Vec<SessionEffect> {
        if self.status != ConnectionStatus::Disconnected {
            debug!("connect() ignored while {:?}", self.status);
            return Vec::new();
        }

        let mut effects = Vec::new();
        if self.reconnect_pending {
            self.reconnect_pending = false;
            effects.push(SessionEffect::CancelReconnect);
        }
        self.status = ConnectionStatus::Connecting;
        effects.push(SessionEffect::OpenTransport);
        effects
    }

    pub fn transport_opened(&mut self) -> Vec<SessionEffect> {
        if self.status != ConnectionStatus::Connecting {
            warn!("Transport opened while {:?}, closing it", self.status);
            return vec![SessionEffect::CloseTransport];
        }

        info!("Session {} connected", self.id);
        self.status = ConnectionStatus::Connected;
        self.reconnect_attempts = 0;
        vec![SessionEffect::Notify(Notification::Connected)]
    }

    /// Transport closed or failed. Schedules the next reconnect attempt.
    pub fn transport_closed(&mut self) -> Vec<SessionEffect> {
        let was = self.status;
        if was == ConnectionStatus::Disconnected {
            debug!("Transport close ignored, already disconnected");
            return Vec::new();
        }

        self.status = ConnectionStatus::Disconnected;
        self.awaiting_response = false;
        self.reconnect_attempts += 1;
        self.reconnect_pending = true;

        let mut effects = Vec::new();
        // Only the first loss is announced; failed retries stay quiet.
        if was == ConnectionStatus::Connected {
            info!("Session {} disconnected", self.id);
            effects.push(SessionEffect::Notify(Notification::Disconnected));
        } else {
            debug!(
                "Connection attempt {} for session {} failed",
                self.reconnect_attempts, self.id
            );
        }
        effects.push(SessionEffect::ScheduleReconnect(self.reconnect_delay));
        effects
    }

    /// The reconnect timer elapsed
    pub fn reconnect_due(&mut self) -> Vec<SessionEffect> {
        if !self.reconnect_pending || self.status != ConnectionStatus::Disconnected {
            debug!("Stale reconnect timer ignored");
            return Vec::new();
        }

        info!(
            "Attempting to reconnect session {} (attempt {})",
            self.id, self.reconnect_attempts
        );
        self.reconnect_pending = false;
        self.status = ConnectionStatus::Connecting;
        vec![SessionEffect::OpenTransport]
    }

    /// Explicit disconnect; never schedules a reconnect
    pub fn disconnect(&mut self) -> Vec<SessionEffect> {
        let mut effects = vec![SessionEffect::CancelReconnect];
        if self.status != ConnectionStatus::Disconnected {
            effects.push(SessionEffect::CloseTransport);
        }
        self.status = ConnectionStatus::Disconnected;
        self.reconnect_pending = false;
        self.awaiting_response = false;
        effects
    }

    /// Record a user message and build the request to transmit.
    ///
    /// Rejected unless connected; nothing is buffered.
    pub fn send(&mut self, content: &str) -> Result<ClientRequest> {
        if self.status != ConnectionStatus::Connected {
            return Err(TransportError::NotConnected.into());
        }

        self.transcript.push_user(content);
        self.awaiting_response = true;
        Ok(ClientRequest::new(content, self.id.clone()))
    }

    /// Undo a `send` whose request never left the client.
    ///
    /// Drops the unsent user message and the loading flag, and reports the
    /// failure to the user.
    pub fn send_failed(&mut self, error: &Error) -> Vec<SessionEffect> {
        if self.transcript.pop_user().is_none() {
            debug!("No unsent user message to retract");
        }
        self.awaiting_response = false;
        vec![SessionEffect::Notify(Notification::Rejected(format!(
            "Message not sent: {}",
            error
        )))]
    }

    /// Apply one inbound text frame. Malformed frames are logged and dropped.
    pub fn receive(&mut self, frame: &str) -> Option<Reduction> {
        match serde_json::from_str::<WireEvent>(frame) {
            Ok(event) => Some(self.apply(event)),
            Err(e) => {
                let err = ProtocolError::MalformedEvent(e.to_string());
                let snippet = frame.chars().take(200).collect::<String>();
                warn!("Dropping inbound frame ({}): {}", err, snippet);
                None
            }
        }
    }

    pub fn apply(&mut self, event: WireEvent) -> Reduction {
        let is_error = matches!(event, WireEvent::Error { .. });
        let reduction = assembler::apply(&mut self.transcript, event);
        if is_error
            || matches!(
                reduction,
                Reduction::MessageOpened { .. } | Reduction::ContentReplaced { .. }
            )
        {
            self.awaiting_response = false;
        }
        reduction
    }
}
