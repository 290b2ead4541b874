//! Action Channel for asynchronous event processing

use anyhow::Result;
use tokio::sync::mpsc;

use crate::display::{SignatureSubmission, SubmissionError, SubmissionReceipt};
use crate::session::command_router::TerminalCommand;

/// Events fed back into a terminal's loop
#[derive(Debug, Clone)]
pub enum TerminalEvent {
    /// User command from interactive input
    UserCommand { command: TerminalCommand },
    /// Input line that did not parse
    InputError { message: String },
    /// A signature submission task finished
    SubmissionFinished {
        submission: SignatureSubmission,
        result: Result<SubmissionReceipt, SubmissionError>,
    },
    /// Shutdown request
    ShutdownRequested,
}

/// Action channel for event processing
pub struct ActionChannel {
    /// Event sender
    event_tx: mpsc::UnboundedSender<TerminalEvent>,
    /// Event receiver
    event_rx: Option<mpsc::UnboundedReceiver<TerminalEvent>>,
}

impl Clone for ActionChannel {
    fn clone(&self) -> Self {
        Self {
            event_tx: self.event_tx.clone(),
            event_rx: None, // Receivers cannot be cloned
        }
    }
}

impl ActionChannel {
    /// Create a new ActionChannel
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Send event to channel
    pub fn send_event(&self, event: TerminalEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .map_err(|e| anyhow::anyhow!("Failed to send event: {}", e))
    }

    /// Get next event from channel
    pub async fn next_event(&mut self) -> Option<TerminalEvent> {
        if let Some(event_rx) = &mut self.event_rx {
            event_rx.recv().await
        } else {
            None
        }
    }

    /// Get event sender for external use
    pub fn event_tx(&self) -> mpsc::UnboundedSender<TerminalEvent> {
        self.event_tx.clone()
    }

    /// Send shutdown request
    pub fn request_shutdown(&self) -> Result<()> {
        self.send_event(TerminalEvent::ShutdownRequested)
    }
}

impl Default for ActionChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_feed_the_original_receiver() {
        let mut channel = ActionChannel::new();
        let clone = channel.clone();

        clone.request_shutdown().unwrap();

        assert!(matches!(
            channel.next_event().await,
            Some(TerminalEvent::ShutdownRequested)
        ));
    }
}
