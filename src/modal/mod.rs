//! Modal orchestration
//!
//! Each terminal owns one [`ModalOrchestrator`]. It is the only place modal
//! visibility lives, and the only place modal transitions become sync events.
//! Remote transitions are applied through the local path without publishing,
//! so an event never bounces back to the terminal that sent it.

pub mod slots;

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::channel::Publisher;
use crate::event::{SessionMessage, SyncEvent};

pub use slots::{DEFAULT_MIRRORED, ModalSlot, SlotState};

/// Per-terminal owner of every modal slot
#[derive(Debug)]
pub struct ModalOrchestrator {
    slots: BTreeMap<ModalSlot, SlotState>,
    mirrored: BTreeSet<ModalSlot>,
    publisher: Option<Publisher>,
}

impl Default for ModalOrchestrator {
    fn default() -> Self {
        Self::new(DEFAULT_MIRRORED)
    }
}

impl ModalOrchestrator {
    pub fn new(mirrored: impl IntoIterator<Item = ModalSlot>) -> Self {
        let slots = ModalSlot::ALL
            .into_iter()
            .map(|slot| (slot, SlotState::default()))
            .collect();

        Self {
            slots,
            mirrored: mirrored.into_iter().collect(),
            publisher: None,
        }
    }

    /// Start mirroring through this session connection
    pub fn attach(&mut self, publisher: Publisher) {
        self.publisher = Some(publisher);
    }

    pub fn detach(&mut self) {
        self.publisher = None;
    }

    pub fn is_mirrored(&self, slot: ModalSlot) -> bool {
        self.mirrored.contains(&slot)
    }

    /// Open a slot, overwriting its data, and mirror it if configured
    pub fn open_modal(&mut self, slot: ModalSlot, data: Value) {
        let event_data = data.clone();
        self.open_local(slot, data);

        if self.is_mirrored(slot) {
            self.publish(SyncEvent::new(slot.open_event_type(), event_data));
        }
    }

    /// Close a slot, keeping its data, and mirror it if configured.
    ///
    /// Closing a slot that is not open changes nothing and publishes nothing.
    pub fn close_modal(&mut self, slot: ModalSlot) {
        if !self.close_local(slot) {
            return;
        }

        if self.is_mirrored(slot) {
            self.publish(SyncEvent::new(slot.close_event_type(), serde_json::json!({})));
        }
    }

    /// Open without publishing
    pub fn open_local(&mut self, slot: ModalSlot, data: Value) {
        let state = self.slots.entry(slot).or_default();
        state.is_open = true;
        state.data = (!data.is_null()).then_some(data);
        debug!("Modal {} opened", slot);
    }

    /// Close without publishing; returns whether the slot was open
    pub fn close_local(&mut self, slot: ModalSlot) -> bool {
        let state = self.slots.entry(slot).or_default();
        if !state.is_open {
            return false;
        }
        state.is_open = false;
        debug!("Modal {} closed", slot);
        true
    }

    /// Close every slot locally
    pub fn close_all(&mut self) {
        for state in self.slots.values_mut() {
            state.is_open = false;
        }
    }

    /// Close the slot and hand the action payload to `handler`.
    ///
    /// Nothing is published; the caller decides whether the action warrants an event.
    pub fn perform_action<F, R>(&mut self, slot: ModalSlot, action: &str, payload: Value, handler: F) -> R
    where
        F: FnOnce(ModalSlot, &str, Value) -> R,
    {
        self.close_local(slot);
        debug!("Modal {} action {}", slot, action);
        handler(slot, action, payload)
    }

    /// Apply a transition received from the peer. Returns whether any slot changed.
    pub fn on_remote_event(&mut self, message: &SessionMessage) -> bool {
        match message {
            SessionMessage::ModalOpened { slot, data } => {
                self.open_local(*slot, data.clone());
                true
            }
            SessionMessage::ModalClosed { slot } => self.close_local(*slot),
            SessionMessage::ShowComparison(view) => {
                let data = serde_json::to_value(view).unwrap_or(Value::Null);
                self.open_local(ModalSlot::ProductAnalysis, data);
                true
            }
            SessionMessage::ProductAnalysisClose(_) => self.close_local(ModalSlot::ProductAnalysis),
            SessionMessage::ProductDetailModal(detail) => {
                let data = serde_json::to_value(detail).unwrap_or(Value::Null);
                self.open_local(ModalSlot::ProductDetail, data);
                true
            }
            SessionMessage::ProductDetailModalClose(_) => self.close_local(ModalSlot::ProductDetail),
            SessionMessage::PrivacyConsent(_) => self.close_local(ModalSlot::PrivacyConsent),
            _ => false,
        }
    }

    pub fn state(&self, slot: ModalSlot) -> SlotState {
        self.slots.get(&slot).cloned().unwrap_or_default()
    }

    pub fn is_open(&self, slot: ModalSlot) -> bool {
        self.slots.get(&slot).is_some_and(|state| state.is_open)
    }

    pub fn data(&self, slot: ModalSlot) -> Option<&Value> {
        self.slots.get(&slot).and_then(|state| state.data.as_ref())
    }

    /// Currently open slots, in slot order
    pub fn open_slots(&self) -> Vec<ModalSlot> {
        self.slots
            .iter()
            .filter(|(_, state)| state.is_open)
            .map(|(slot, _)| *slot)
            .collect()
    }

    pub fn slots(&self) -> &BTreeMap<ModalSlot, SlotState> {
        &self.slots
    }

    fn publish(&self, event: SyncEvent) {
        let Some(publisher) = &self.publisher else {
            warn!(
                "No session connection, {} not mirrored to peer",
                event.event_type
            );
            return;
        };

        if let Err(e) = publisher.publish(event) {
            warn!("Failed to mirror modal transition: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelError, FrameSink, OutboundFrame};
    use crate::event::{CloseNotice, ProductDetail, ProductSummary};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSink {
        frames: Mutex<Vec<OutboundFrame>>,
        fail: bool,
    }

    impl RecordingSink {
        fn event_types(&self) -> Vec<String> {
            self.frames
                .lock()
                .unwrap()
                .iter()
                .filter_map(|frame| match frame {
                    OutboundFrame::Publish { event, .. } => Some(event.event_type.clone()),
                    OutboundFrame::Leave { .. } => None,
                })
                .collect()
        }
    }

    impl FrameSink for RecordingSink {
        fn send(&self, frame: OutboundFrame) -> Result<(), ChannelError> {
            if self.fail {
                return Err(ChannelError::TransportUnavailable("down".to_string()));
            }
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }
    }

    fn attached() -> (ModalOrchestrator, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let mut modals = ModalOrchestrator::default();
        modals.attach(Publisher::new("S-1", "conn-1", sink.clone()));
        (modals, sink)
    }

    #[test]
    fn test_signature_pad_keeps_data_after_close() {
        let (mut modals, sink) = attached();

        modals.open_modal(ModalSlot::SignaturePad, json!({"fieldLabel": "서명"}));
        modals.close_modal(ModalSlot::SignaturePad);

        assert_eq!(
            modals.state(ModalSlot::SignaturePad),
            SlotState {
                is_open: false,
                data: Some(json!({"fieldLabel": "서명"})),
            }
        );
        assert_eq!(
            sink.event_types(),
            vec!["modal:signaturePad:open", "modal:signaturePad:close"]
        );
    }

    #[test]
    fn test_last_call_wins_per_slot() {
        let mut modals = ModalOrchestrator::default();

        modals.open_modal(ModalSlot::Calculator, json!({"a": 1}));
        modals.open_modal(ModalSlot::PrivacyConsent, Value::Null);
        modals.close_modal(ModalSlot::Calculator);
        modals.open_modal(ModalSlot::Simulation, json!({}));
        modals.open_modal(ModalSlot::Calculator, json!({"a": 2}));
        modals.close_modal(ModalSlot::PrivacyConsent);

        assert!(modals.is_open(ModalSlot::Calculator));
        assert_eq!(modals.data(ModalSlot::Calculator), Some(&json!({"a": 2})));
        assert!(!modals.is_open(ModalSlot::PrivacyConsent));
        assert!(modals.is_open(ModalSlot::Simulation));
        assert_eq!(
            modals.open_slots(),
            vec![ModalSlot::Calculator, ModalSlot::Simulation]
        );
    }

    #[test]
    fn test_closing_a_closed_slot_is_silent() {
        let (mut modals, sink) = attached();

        modals.close_modal(ModalSlot::Calculator);

        assert!(!modals.is_open(ModalSlot::Calculator));
        assert!(sink.event_types().is_empty());
    }

    #[test]
    fn test_remote_open_applies_data_without_echo() {
        let (mut modals, sink) = attached();
        let message = SessionMessage::ModalOpened {
            slot: ModalSlot::SignaturePad,
            data: json!({"fieldLabel": "서명"}),
        };

        assert!(modals.on_remote_event(&message));
        assert!(modals.on_remote_event(&SessionMessage::ModalClosed {
            slot: ModalSlot::SignaturePad
        }));
        assert!(modals.on_remote_event(&message));

        assert!(modals.is_open(ModalSlot::SignaturePad));
        assert_eq!(
            modals.data(ModalSlot::SignaturePad),
            Some(&json!({"fieldLabel": "서명"}))
        );
        assert!(sink.event_types().is_empty());
    }

    #[test]
    fn test_unmirrored_slot_stays_local() {
        let (mut modals, sink) = attached();

        modals.open_modal(ModalSlot::EnrollmentSuccess, json!({"ok": true}));
        modals.close_modal(ModalSlot::EnrollmentSuccess);

        assert!(sink.event_types().is_empty());
    }

    #[test]
    fn test_publish_failure_still_transitions() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let mut modals = ModalOrchestrator::default();
        modals.attach(Publisher::new("S-1", "conn-1", sink));

        modals.open_modal(ModalSlot::Calculator, json!({}));
        assert!(modals.is_open(ModalSlot::Calculator));

        modals.detach();
        modals.close_modal(ModalSlot::Calculator);
        assert!(!modals.is_open(ModalSlot::Calculator));
    }

    #[test]
    fn test_product_detail_events_drive_their_slot() {
        let mut modals = ModalOrchestrator::default();
        let detail = ProductDetail::for_product(ProductSummary::new("P1", "정기예금"));

        modals.on_remote_event(&SessionMessage::ProductDetailModal(detail));
        assert!(modals.is_open(ModalSlot::ProductDetail));
        assert_eq!(
            modals.data(ModalSlot::ProductDetail).and_then(|d| d["product"].get("id")),
            Some(&json!("P1"))
        );

        modals.on_remote_event(&SessionMessage::ProductDetailModalClose(CloseNotice::now()));
        assert!(!modals.is_open(ModalSlot::ProductDetail));
    }

    #[test]
    fn test_perform_action_closes_and_forwards() {
        let (mut modals, sink) = attached();
        modals.open_local(ModalSlot::PrivacyConsent, json!({}));

        let forwarded = modals.perform_action(
            ModalSlot::PrivacyConsent,
            "agree",
            json!({"agreed": true}),
            |slot, action, payload| (slot, action.to_string(), payload),
        );

        assert!(!modals.is_open(ModalSlot::PrivacyConsent));
        assert_eq!(
            forwarded,
            (ModalSlot::PrivacyConsent, "agree".to_string(), json!({"agreed": true}))
        );
        assert!(sink.event_types().is_empty());
    }
}
