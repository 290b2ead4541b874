//! WebSocket relay server
//!
//! Accepts terminal connections and bridges their frames to a [`LocalHub`].
//! A socket carries at most one joined connection at a time; a second
//! `join-session` on the same socket replaces the first.

use std::net::SocketAddr;

use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use super::local::LocalHub;
use super::types::{
    ChannelError, ControlFrame, Frame, Inbound, Publisher, SessionChannel, classify_frame,
};

/// Serve relay connections until the listener fails
pub async fn serve(listener: TcpListener, hub: LocalHub) -> Result<(), ChannelError> {
    let local_addr = listener
        .local_addr()
        .map_err(|e| ChannelError::ConnectionError(e.to_string()))?;
    info!("Relay listening on {}", local_addr);

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| ChannelError::ConnectionError(format!("accept failed: {}", e)))?;

        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, hub).await {
                warn!("Relay connection {} ended with error: {}", peer, e);
            }
        });
    }
}

struct Joined {
    publisher: Publisher,
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

async fn next_inbound(joined: &mut Option<Joined>) -> Option<Inbound> {
    match joined {
        Some(joined) => joined.inbound.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    hub: LocalHub,
) -> Result<(), ChannelError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| ChannelError::ConnectionError(format!("handshake failed: {}", e)))?;
    debug!("Relay accepted {}", peer);

    let (mut write, mut read) = ws_stream.split();
    let mut joined: Option<Joined> = None;

    loop {
        tokio::select! {
            message = read.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("Relay read error from {}: {}", peer, e);
                        break;
                    }
                };

                match classify_frame(&text) {
                    Ok(Frame::Control(ControlFrame::JoinSession(request))) => {
                        if let Some(previous) = joined.take() {
                            let _ = previous.publisher.leave();
                        }
                        let (publisher, inbound) = hub.join(request)?.into_parts();
                        joined = Some(Joined { publisher, inbound });
                    }
                    Ok(Frame::Control(ControlFrame::LeaveSession { session_id })) => {
                        if let Some(previous) = joined.take() {
                            debug!("{} left session {}", peer, session_id);
                            let _ = previous.publisher.leave();
                        }
                    }
                    Ok(Frame::Control(ControlFrame::SessionJoined(_))) => {
                        debug!("Ignoring session-joined frame from {}", peer);
                    }
                    Ok(Frame::Event(event)) => match &joined {
                        Some(joined) => {
                            if let Err(e) = joined.publisher.publish(event) {
                                error!("Hub rejected event from {}: {}", peer, e);
                            }
                        }
                        None => warn!("Dropping {} from {} before join", event.event_type, peer),
                    },
                    Err(e) => warn!("Dropping frame from {}: {}", peer, e),
                }
            }
            inbound = next_inbound(&mut joined) => {
                let frame = match inbound {
                    Some(Inbound::Joined(ack)) => {
                        let success = ack.success;
                        let text = serde_json::to_string(&ControlFrame::SessionJoined(ack))
                            .map_err(|e| ChannelError::FrameError(e.to_string()))?;
                        if !success {
                            joined = None;
                        }
                        text
                    }
                    Some(Inbound::Event(event)) => event
                        .to_json()
                        .map_err(|e| ChannelError::FrameError(e.to_string()))?,
                    Some(Inbound::Closed) | None => {
                        info!("Connection for {} replaced or dropped by hub", peer);
                        joined = None;
                        let _ = write.close().await;
                        break;
                    }
                };

                write
                    .send(Message::Text(frame))
                    .await
                    .map_err(|e| ChannelError::ConnectionError(e.to_string()))?;
            }
        }
    }

    if let Some(joined) = joined {
        let _ = joined.publisher.leave();
    }
    debug!("Relay closed {}", peer);
    Ok(())
}
