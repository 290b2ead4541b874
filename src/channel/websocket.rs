//! WebSocket client transport for the session relay

use std::sync::Arc;

use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::types::{
    ChannelError, ConnectionHandle, ControlFrame, FrameSink, Inbound, JoinRequest, OutboundFrame,
    Publisher, SessionChannel, classify_frame, Frame,
};

struct WsSink {
    outbound_tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl FrameSink for WsSink {
    fn send(&self, frame: OutboundFrame) -> Result<(), ChannelError> {
        self.outbound_tx
            .send(frame)
            .map_err(|_| ChannelError::TransportUnavailable("relay connection closed".to_string()))
    }
}

/// [`SessionChannel`] speaking to a relay server over WebSocket.
///
/// Each join opens its own socket. The writer drains the publisher queue in
/// order; socket loss surfaces as [`Inbound::Closed`].
#[derive(Debug, Clone)]
pub struct WsChannel {
    url: String,
}

impl WsChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SessionChannel for WsChannel {
    fn join(&self, request: JoinRequest) -> Result<ConnectionHandle, ChannelError> {
        let connection_id = Uuid::new_v4().to_string();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let session_id = request.session_id.clone();
        let role = request.role;

        tokio::spawn(run_connection(
            self.url.clone(),
            request,
            outbound_rx,
            inbound_tx,
        ));

        let publisher = Publisher::new(session_id.clone(), connection_id, Arc::new(WsSink { outbound_tx }));
        Ok(ConnectionHandle::new(session_id, role, publisher, inbound_rx))
    }
}

async fn run_connection(
    url: String,
    request: JoinRequest,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
) {
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            error!("Failed to connect to relay at {}: {}", url, e);
            let _ = inbound_tx.send(Inbound::Closed);
            return;
        }
    };
    info!("Connected to relay at {}", url);

    let (mut write, mut read) = ws_stream.split();

    let join = match serde_json::to_string(&ControlFrame::JoinSession(request.clone())) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode join frame: {}", e);
            let _ = inbound_tx.send(Inbound::Closed);
            return;
        }
    };
    if let Err(e) = write.send(Message::Text(join)).await {
        warn!("Failed to send join frame: {}", e);
        let _ = inbound_tx.send(Inbound::Closed);
        return;
    }

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                match frame {
                    Some(OutboundFrame::Publish { event, .. }) => {
                        let text = match event.to_json() {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("Dropping unencodable event {}: {}", event.event_type, e);
                                continue;
                            }
                        };
                        debug!("Sending {} to relay", event.event_type);
                        if let Err(e) = write.send(Message::Text(text)).await {
                            warn!("Relay write failed: {}", e);
                            break;
                        }
                    }
                    Some(OutboundFrame::Leave { .. }) | None => {
                        let leave = ControlFrame::LeaveSession {
                            session_id: request.session_id.clone(),
                        };
                        if let Ok(text) = serde_json::to_string(&leave) {
                            let _ = write.send(Message::Text(text)).await;
                        }
                        if let Err(e) = write.close().await {
                            debug!("Error closing relay socket: {}", e);
                        }
                        info!("Left session {}", request.session_id);
                        break;
                    }
                }
            }
            message = read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => match classify_frame(&text) {
                        Ok(Frame::Control(ControlFrame::SessionJoined(ack))) => {
                            let _ = inbound_tx.send(Inbound::Joined(ack));
                        }
                        Ok(Frame::Event(event)) => {
                            let _ = inbound_tx.send(Inbound::Event(event));
                        }
                        Ok(Frame::Control(other)) => {
                            debug!("Ignoring control frame from relay: {:?}", other);
                        }
                        Err(e) => warn!("Dropping relay frame: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Relay connection closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Relay connection error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    let _ = inbound_tx.send(Inbound::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Role;
    use crate::event::SyncEvent;
    use tokio_test::block_on;

    #[tokio::test]
    async fn test_unreachable_relay_reports_closed() {
        let channel = WsChannel::new("ws://127.0.0.1:1/ws");
        let mut handle = channel
            .join(JoinRequest::new("S-1", Role::Operator, "E-1"))
            .unwrap();

        assert_eq!(handle.next_inbound().await, Some(Inbound::Closed));
    }

    #[test]
    fn test_publish_after_socket_loss_fails() {
        block_on(async {
            let channel = WsChannel::new("ws://127.0.0.1:1/ws");
            let mut handle = channel
                .join(JoinRequest::new("S-1", Role::Display, "C-1"))
                .unwrap();
            assert_eq!(handle.next_inbound().await, Some(Inbound::Closed));

            let result = handle
                .publisher()
                .publish(SyncEvent::new("modal:calculator:close", serde_json::json!({})));
            assert!(matches!(result, Err(ChannelError::TransportUnavailable(_))));
        });
    }
}
