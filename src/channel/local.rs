//! In-process session hub
//!
//! One actor task owns every session and subscriber. Joins, publishes and
//! leaves all go through the same command queue, so "connected at publish
//! time" and per-publisher ordering are decided by a single total order.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{
    ChannelError, ConnectionHandle, FrameSink, Inbound, JoinAck, JoinRequest, OutboundFrame,
    Publisher, Role, Session, SessionChannel,
};
use crate::event::SyncEvent;

enum HubCommand {
    Join {
        connection_id: String,
        request: JoinRequest,
        inbound: mpsc::UnboundedSender<Inbound>,
    },
    Frame(OutboundFrame),
    Sessions {
        reply: oneshot::Sender<Vec<Session>>,
    },
}

struct HubSink {
    command_tx: mpsc::UnboundedSender<HubCommand>,
}

impl FrameSink for HubSink {
    fn send(&self, frame: OutboundFrame) -> Result<(), ChannelError> {
        self.command_tx
            .send(HubCommand::Frame(frame))
            .map_err(|_| ChannelError::TransportUnavailable("session hub has stopped".to_string()))
    }
}

/// In-process broker implementing [`SessionChannel`]
#[derive(Clone)]
pub struct LocalHub {
    command_tx: mpsc::UnboundedSender<HubCommand>,
}

impl LocalHub {
    /// Spawn the hub actor on the current runtime
    pub fn start() -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_hub(command_rx));
        info!("Session hub started");
        Self { command_tx }
    }

    /// Snapshot of the sessions the hub knows about
    pub async fn sessions(&self) -> Result<Vec<Session>, ChannelError> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(HubCommand::Sessions { reply })
            .map_err(|_| ChannelError::TransportUnavailable("session hub has stopped".to_string()))?;
        response
            .await
            .map_err(|_| ChannelError::TransportUnavailable("session hub has stopped".to_string()))
    }
}

impl SessionChannel for LocalHub {
    fn join(&self, request: JoinRequest) -> Result<ConnectionHandle, ChannelError> {
        let connection_id = Uuid::new_v4().to_string();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let session_id = request.session_id.clone();
        let role = request.role;

        self.command_tx
            .send(HubCommand::Join {
                connection_id: connection_id.clone(),
                request,
                inbound: inbound_tx,
            })
            .map_err(|_| ChannelError::TransportUnavailable("session hub has stopped".to_string()))?;

        let sink = Arc::new(HubSink {
            command_tx: self.command_tx.clone(),
        });
        let publisher = Publisher::new(session_id.clone(), connection_id, sink);

        Ok(ConnectionHandle::new(session_id, role, publisher, inbound_rx))
    }
}

struct Subscriber {
    connection_id: String,
    inbound: mpsc::UnboundedSender<Inbound>,
}

#[derive(Default)]
struct SessionEntry {
    session: Option<Session>,
    operator: Option<Subscriber>,
    display: Option<Subscriber>,
}

impl SessionEntry {
    fn slot_mut(&mut self, role: Role) -> &mut Option<Subscriber> {
        match role {
            Role::Operator => &mut self.operator,
            Role::Display => &mut self.display,
        }
    }
}

#[derive(Default)]
struct HubState {
    sessions: HashMap<String, SessionEntry>,
    /// connection id -> (session id, role)
    connections: HashMap<String, (String, Role)>,
}

async fn run_hub(mut command_rx: mpsc::UnboundedReceiver<HubCommand>) {
    let mut state = HubState::default();

    while let Some(command) = command_rx.recv().await {
        match command {
            HubCommand::Join {
                connection_id,
                request,
                inbound,
            } => state.join(connection_id, request, inbound),
            HubCommand::Frame(OutboundFrame::Publish {
                connection_id,
                event,
            }) => state.publish(&connection_id, event),
            HubCommand::Frame(OutboundFrame::Leave { connection_id }) => {
                state.leave(&connection_id)
            }
            HubCommand::Sessions { reply } => {
                let sessions = state
                    .sessions
                    .values()
                    .filter_map(|entry| entry.session.clone())
                    .collect();
                let _ = reply.send(sessions);
            }
        }
    }

    debug!("Session hub stopped");
}

impl HubState {
    fn join(
        &mut self,
        connection_id: String,
        request: JoinRequest,
        inbound: mpsc::UnboundedSender<Inbound>,
    ) {
        let JoinRequest {
            session_id,
            role,
            user_id,
        } = request;

        // Only the operator opens a consultation; a display must find one.
        let open = self
            .sessions
            .get(&session_id)
            .is_some_and(|entry| entry.session.is_some());
        if !open && role == Role::Display {
            warn!("Display join rejected, session {} not found", session_id);
            let _ = inbound.send(Inbound::Joined(JoinAck {
                session_id,
                role,
                user_id,
                success: false,
            }));
            return;
        }

        let entry = self.sessions.entry(session_id.clone()).or_default();
        if entry.session.is_none() {
            info!("Session {} created", session_id);
            entry.session = Some(Session::new(session_id.clone()));
        }

        if let Some(session) = entry.session.as_mut() {
            match role {
                Role::Operator => session.participants.operator = Some(user_id.clone()),
                Role::Display => session.participants.display = Some(user_id.clone()),
            }
        }

        let ack = Inbound::Joined(JoinAck {
            session_id: session_id.clone(),
            role,
            user_id,
            success: true,
        });
        if inbound.send(ack).is_err() {
            debug!("Connection {} dropped before its join was acknowledged", connection_id);
            return;
        }

        // A rejoin by the same role replaces the previous subscriber.
        let previous = entry.slot_mut(role).replace(Subscriber {
            connection_id: connection_id.clone(),
            inbound,
        });
        if let Some(previous) = previous {
            info!(
                "Replacing {} connection {} in session {}",
                role, previous.connection_id, session_id
            );
            self.connections.remove(&previous.connection_id);
            let _ = previous.inbound.send(Inbound::Closed);
        }

        info!("{} joined session {} ({})", role, session_id, connection_id);
        self.connections.insert(connection_id, (session_id, role));
    }

    fn publish(&mut self, connection_id: &str, event: SyncEvent) {
        let Some((session_id, role)) = self.connections.get(connection_id).cloned() else {
            debug!(
                "Dropping {} from connection {} that is not joined",
                event.event_type, connection_id
            );
            return;
        };

        let Some(entry) = self.sessions.get_mut(&session_id) else {
            return;
        };

        let peer_slot = entry.slot_mut(role.peer());
        let Some(peer) = peer_slot.as_ref() else {
            debug!(
                "No {} connected to session {}, {} not delivered",
                role.peer(),
                session_id,
                event.event_type
            );
            return;
        };

        debug!(
            "Delivering {} from {} to {} in session {}",
            event.event_type,
            role,
            role.peer(),
            session_id
        );

        if peer.inbound.send(Inbound::Event(event)).is_err() {
            warn!(
                "{} connection {} is gone, removing it from session {}",
                role.peer(),
                peer.connection_id,
                session_id
            );
            if let Some(gone) = peer_slot.take() {
                self.connections.remove(&gone.connection_id);
            }
        }
    }

    fn leave(&mut self, connection_id: &str) {
        let Some((session_id, role)) = self.connections.remove(connection_id) else {
            return;
        };

        if let Some(entry) = self.sessions.get_mut(&session_id) {
            let slot = entry.slot_mut(role);
            if slot
                .as_ref()
                .is_some_and(|subscriber| subscriber.connection_id == connection_id)
            {
                slot.take();
            }

            // The next operator join opens the session again.
            if entry.operator.is_none() && entry.display.is_none() {
                self.sessions.remove(&session_id);
                info!("Session {} closed", session_id);
            }
        }

        info!("{} left session {} ({})", role, session_id, connection_id);
    }
}
