//! Session join/leave and connection status

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::channel::{ChannelError, Inbound, JoinAck, JoinRequest, Publisher, Role, SessionChannel};
use crate::metrics::SyncStats;

/// Connection status shown by the "waiting" indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not joined yet, or the session was not found
    Waiting,
    Connected,
    /// Joined once, then lost or left
    Disconnected,
}

/// Error types for session lifecycle operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("No join acknowledgement for session {session_id} within {timeout_ms}ms")]
    JoinTimeout { session_id: String, timeout_ms: u64 },
    #[error("Connection lost while joining session {0}")]
    ConnectionLost(String),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// A joined session: the publisher plus everything the peer sends after the ack
#[derive(Debug)]
pub struct SessionLink {
    pub ack: JoinAck,
    pub publisher: Publisher,
    pub inbound: mpsc::UnboundedReceiver<Inbound>,
}

/// Joins and leaves one session for one terminal role
pub struct SessionLifecycle {
    channel: Arc<dyn SessionChannel>,
    role: Role,
    user_id: String,
    join_timeout: Duration,
    stats: SyncStats,
    session_id: Option<String>,
    publisher: Option<Publisher>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl SessionLifecycle {
    pub fn new(
        channel: Arc<dyn SessionChannel>,
        role: Role,
        user_id: impl Into<String>,
        join_timeout: Duration,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Waiting);

        Self {
            channel,
            role,
            user_id: user_id.into(),
            join_timeout,
            stats: SyncStats::default(),
            session_id: None,
            publisher: None,
            state_tx,
            state_rx,
        }
    }

    /// Record publishes of joined connections into the given stats
    pub fn with_stats(mut self, stats: SyncStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Follow connection status changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Join a session and wait for its acknowledgement.
    ///
    /// Only events published after the join are observed; no replay is requested.
    pub async fn join_session(&mut self, session_id: &str) -> Result<SessionLink, SessionError> {
        if self.publisher.is_some() {
            self.leave_session();
        }

        self.session_id = Some(session_id.to_string());
        self.set_state(ConnectionState::Waiting);

        let request = JoinRequest::new(session_id, self.role, self.user_id.clone());
        let (publisher, mut inbound) = self.channel.join(request)?.into_parts();
        let publisher = publisher.with_stats(self.stats.clone());

        let wait_for_ack = async {
            loop {
                match inbound.recv().await {
                    Some(Inbound::Joined(ack)) => return Some(ack),
                    Some(Inbound::Event(event)) => {
                        debug!("Dropping {} received before join ack", event.event_type);
                    }
                    Some(Inbound::Closed) | None => return None,
                }
            }
        };

        let ack = match tokio::time::timeout(self.join_timeout, wait_for_ack).await {
            Ok(Some(ack)) => ack,
            Ok(None) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(SessionError::ConnectionLost(session_id.to_string()));
            }
            Err(_) => {
                let _ = publisher.leave();
                self.set_state(ConnectionState::Waiting);
                return Err(SessionError::JoinTimeout {
                    session_id: session_id.to_string(),
                    timeout_ms: self.join_timeout.as_millis() as u64,
                });
            }
        };

        if !ack.success {
            warn!("Session {} not found", session_id);
            self.set_state(ConnectionState::Waiting);
            return Err(SessionError::SessionNotFound(session_id.to_string()));
        }

        info!("Joined session {} as {}", session_id, self.role);
        self.publisher = Some(publisher.clone());
        self.set_state(ConnectionState::Connected);

        Ok(SessionLink {
            ack,
            publisher,
            inbound,
        })
    }

    /// Disconnect from the session. Safe to call any number of times.
    pub fn leave_session(&mut self) {
        let Some(publisher) = self.publisher.take() else {
            return;
        };

        if let Err(e) = publisher.leave() {
            debug!("Leave was not delivered: {}", e);
        }
        info!("Left session {}", publisher.session_id());
        self.set_state(ConnectionState::Disconnected);
    }

    /// The transport reported the connection gone
    pub fn mark_disconnected(&mut self) {
        self.publisher = None;
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }
}
