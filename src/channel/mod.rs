//! Session channel transports

pub mod local;
pub mod relay;
pub mod types;
pub mod websocket;

pub use local::LocalHub;
pub use types::{
    ChannelError, ConnectionHandle, ControlFrame, FrameSink, Inbound, JoinAck, JoinRequest,
    OutboundFrame, Publisher, Role, Session, SessionChannel,
};
pub use websocket::WsChannel;
