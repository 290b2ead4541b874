//! Interactive session management module
//!
//! Joining and leaving a session, routing typed commands, and the event loop
//! that ties a terminal's input, the session channel and its state together.

pub mod action_channel;
pub mod command_router;
pub mod lifecycle;
pub mod runtime;

pub use action_channel::{ActionChannel, TerminalEvent};
pub use command_router::{CommandRouter, TerminalCommand};
pub use lifecycle::{ConnectionState, SessionError, SessionLifecycle, SessionLink};
pub use runtime::{ReconnectPolicy, RuntimeState, Terminal, TerminalRuntime};
