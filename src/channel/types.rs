//! Session channel data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::event::{SyncEvent, now_ms};
use crate::metrics::SyncStats;

/// Which terminal a connection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Operator console
    #[serde(rename = "employee")]
    Operator,
    /// Customer-facing display
    #[serde(rename = "customer", alias = "tablet", alias = "customer-tablet")]
    Display,
}

impl Role {
    /// Wire name used in the join handshake
    pub fn as_wire(&self) -> &'static str {
        match self {
            Role::Operator => "employee",
            Role::Display => "customer",
        }
    }

    /// The other terminal of the session
    pub fn peer(&self) -> Role {
        match self {
            Role::Operator => Role::Display,
            Role::Display => Role::Operator,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Operator => f.write_str("operator"),
            Role::Display => f.write_str("display"),
        }
    }
}

/// Logical pairing of one operator terminal and one display for one consultation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub participants: Participants,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            participants: Participants::default(),
            created_at: Utc::now(),
        }
    }
}

/// User ids of the two peers, as last seen in a join
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Participants {
    pub operator: Option<String>,
    pub display: Option<String>,
}

/// `join-session` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub session_id: String,
    #[serde(rename = "userType")]
    pub role: Role,
    #[serde(default)]
    pub user_id: String,
}

impl JoinRequest {
    pub fn new(session_id: impl Into<String>, role: Role, user_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            role,
            user_id: user_id.into(),
        }
    }
}

/// `session-joined` acknowledgement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAck {
    pub session_id: String,
    #[serde(rename = "userType")]
    pub role: Role,
    #[serde(default)]
    pub user_id: String,
    pub success: bool,
}

/// Handshake frames that travel next to sync events on the relay socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlFrame {
    JoinSession(JoinRequest),
    SessionJoined(JoinAck),
    LeaveSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

impl ControlFrame {
    const TYPES: [&'static str; 3] = ["join-session", "session-joined", "leave-session"];
}

/// A decoded relay frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Control(ControlFrame),
    Event(SyncEvent),
}

/// Classify a text frame by its `type` field
pub fn classify_frame(text: &str) -> Result<Frame, ChannelError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ChannelError::FrameError(format!("Failed to parse JSON: {}", e)))?;

    let is_control = value
        .get("type")
        .and_then(|v| v.as_str())
        .map(|t| ControlFrame::TYPES.contains(&t))
        .ok_or_else(|| ChannelError::FrameError("Frame without a type".to_string()))?;

    if is_control {
        serde_json::from_value(value)
            .map(Frame::Control)
            .map_err(|e| ChannelError::FrameError(format!("Failed to parse control frame: {}", e)))
    } else {
        serde_json::from_value(value)
            .map(Frame::Event)
            .map_err(|e| ChannelError::FrameError(format!("Failed to parse sync event: {}", e)))
    }
}

/// What a subscriber receives
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Join acknowledgement
    Joined(JoinAck),
    /// Event published by the peer
    Event(SyncEvent),
    /// The connection is gone; rejoin to resume
    Closed,
}

/// What a publisher hands to the transport
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Publish {
        connection_id: String,
        event: SyncEvent,
    },
    Leave {
        connection_id: String,
    },
}

/// Transport-side queue behind a [`Publisher`]
pub trait FrameSink: Send + Sync {
    fn send(&self, frame: OutboundFrame) -> Result<(), ChannelError>;
}

/// Cloneable publishing side of a connection.
///
/// Publishing only enqueues; frames from one publisher leave in the order they
/// were published.
#[derive(Clone)]
pub struct Publisher {
    session_id: String,
    connection_id: String,
    sink: Arc<dyn FrameSink>,
    stats: SyncStats,
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("session_id", &self.session_id)
            .field("connection_id", &self.connection_id)
            .finish()
    }
}

impl Publisher {
    pub fn new(
        session_id: impl Into<String>,
        connection_id: impl Into<String>,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            connection_id: connection_id.into(),
            sink,
            stats: SyncStats::default(),
        }
    }

    /// Record publish outcomes into the given stats
    pub fn with_stats(mut self, stats: SyncStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Publish an event to the session, stamping session id and timestamp
    pub fn publish(&self, mut event: SyncEvent) -> Result<(), ChannelError> {
        event.session_id = Some(self.session_id.clone());
        if event.timestamp.is_none() {
            event.timestamp = Some(now_ms());
        }

        let result = self.sink.send(OutboundFrame::Publish {
            connection_id: self.connection_id.clone(),
            event,
        });

        match &result {
            Ok(()) => self.stats.record_published(),
            Err(_) => self.stats.record_publish_failure(),
        }
        result
    }

    /// Disconnect this connection from the session
    pub fn leave(&self) -> Result<(), ChannelError> {
        self.sink.send(OutboundFrame::Leave {
            connection_id: self.connection_id.clone(),
        })
    }
}

/// A joined (or joining) connection: the publisher plus the subscription
#[derive(Debug)]
pub struct ConnectionHandle {
    pub session_id: String,
    pub role: Role,
    publisher: Publisher,
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

impl ConnectionHandle {
    pub fn new(
        session_id: impl Into<String>,
        role: Role,
        publisher: Publisher,
        inbound: mpsc::UnboundedReceiver<Inbound>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            role,
            publisher,
            inbound,
        }
    }

    pub fn connection_id(&self) -> &str {
        self.publisher.connection_id()
    }

    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Next inbound message; `None` once the transport dropped the subscription
    pub async fn next_inbound(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }

    pub fn into_parts(self) -> (Publisher, mpsc::UnboundedReceiver<Inbound>) {
        (self.publisher, self.inbound)
    }
}

/// Publish/subscribe transport keyed by session id.
///
/// `join` never blocks: the acknowledgement arrives as [`Inbound::Joined`].
/// Delivery is at-least-once to peers connected at publish time, FIFO per
/// publisher, with no store-and-forward.
pub trait SessionChannel: Send + Sync {
    fn join(&self, request: JoinRequest) -> Result<ConnectionHandle, ChannelError>;
}

/// Error types for channel operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChannelError {
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),
    #[error("Connection error: {0}")]
    ConnectionError(String),
    #[error("Frame error: {0}")]
    FrameError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_frame_wire_shape() {
        let frame = ControlFrame::JoinSession(JoinRequest::new("S-1", Role::Display, "customer"));
        let wire = serde_json::to_value(&frame).unwrap();

        assert_eq!(
            wire,
            json!({
                "type": "join-session",
                "sessionId": "S-1",
                "userType": "customer",
                "userId": "customer"
            })
        );
    }

    #[test]
    fn test_classify_frames() {
        let joined = classify_frame(
            r#"{"type":"session-joined","sessionId":"S-1","userType":"employee","userId":"E-7","success":true}"#,
        )
        .unwrap();
        assert!(matches!(
            joined,
            Frame::Control(ControlFrame::SessionJoined(JoinAck { success: true, .. }))
        ));

        let event = classify_frame(r#"{"type":"product-analysis-close","data":{"timestamp":5}}"#)
            .unwrap();
        match event {
            Frame::Event(event) => assert_eq!(event.event_type, "product-analysis-close"),
            other => panic!("unexpected frame: {:?}", other),
        }

        assert!(classify_frame("not json").is_err());
        assert!(classify_frame(r#"{"data":{}}"#).is_err());
    }

    #[test]
    fn test_tablet_alias_joins_as_display() {
        let request: JoinRequest = serde_json::from_value(json!({
            "sessionId": "S-1",
            "userType": "tablet"
        }))
        .unwrap();

        assert_eq!(request.role, Role::Display);
        assert_eq!(request.user_id, "");
    }
}
