//! Sync event schema
//!
//! The JSON envelope exchanged over a session channel and the typed messages
//! each terminal resolves it into.

pub mod message;
pub mod types;

pub use message::{ScreenUpdate, SessionMessage};
pub use types::*;
