//! Customer display renderer
//!
//! The display never decides where the consultation goes; it follows the
//! operator's events. Screen changes go through the pure [`screen::reduce`],
//! modal changes through the [`ModalOrchestrator`], and anything that talks to
//! the outside world comes back to the caller as an [`Effect`].

pub mod render;
pub mod screen;
pub mod submission;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::channel::Publisher;
use crate::event::{
    ConsentResponse, Highlight, ScreenType, SessionMessage, SimulationDefaults, SyncEvent,
};
use crate::metrics::SyncStats;
use crate::modal::{DEFAULT_MIRRORED, ModalOrchestrator, ModalSlot, SlotState};

pub use render::render;
pub use screen::{ScreenPayload, ScreenState, reduce};
pub use submission::{
    CompletionRecord, SignatureSubmission, SubmissionClient, SubmissionError, SubmissionReceipt,
};

/// Label shown on the signature capture surface
pub const SIGNATURE_FIELD_LABEL: &str = "서명";

/// Side effect requested by a transition; the runtime carries it out
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// The application form is up; present the signature surface
    ShowSignatureCapture,
    /// Persist the finished consultation (fire-and-forget)
    RecordCompletion(CompletionRecord),
}

/// Message shown to the customer
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub message: String,
    /// Blocking notices must be acknowledged before the customer continues
    pub blocking: bool,
}

impl Notice {
    pub fn blocking(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            blocking: true,
        }
    }
}

/// Error types for display-side actions
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DisplayError {
    #[error("No application form is on screen")]
    NoApplicationForm,
    #[error("Signature is empty")]
    EmptySignature,
    #[error("A signature submission is already in flight")]
    SubmissionInFlight,
    #[error("No consent form is open")]
    NoConsentRequest,
}

/// Snapshot handed to [`render`]
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayView {
    pub session_id: String,
    pub connected: bool,
    pub screen: ScreenState,
    pub open_modals: Vec<(ModalSlot, SlotState)>,
    pub highlights: Vec<Highlight>,
    pub notice: Option<Notice>,
    pub submitting: bool,
}

/// Customer-side state machine driven by inbound events
#[derive(Debug)]
pub struct DisplayRenderer {
    session_id: String,
    customer_id: Option<String>,
    screen: ScreenState,
    modals: ModalOrchestrator,
    publisher: Option<Publisher>,
    highlights: Vec<Highlight>,
    notice: Option<Notice>,
    connected: bool,
    submitting: bool,
    simulation_defaults: SimulationDefaults,
    stats: SyncStats,
}

impl DisplayRenderer {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::with_mirrored(session_id, DEFAULT_MIRRORED)
    }

    pub fn with_mirrored(
        session_id: impl Into<String>,
        mirrored: impl IntoIterator<Item = ModalSlot>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            customer_id: None,
            screen: ScreenState::default(),
            modals: ModalOrchestrator::new(mirrored),
            publisher: None,
            highlights: Vec::new(),
            notice: None,
            connected: false,
            submitting: false,
            simulation_defaults: SimulationDefaults::default(),
            stats: SyncStats::default(),
        }
    }

    /// Customer id from the joined session context, used when the form carries none
    pub fn with_customer_id(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    /// Amount and period shown for comparisons that arrive without them
    pub fn with_simulation_defaults(mut self, amount: u64, period: u32) -> Self {
        self.simulation_defaults = SimulationDefaults { amount, period };
        self
    }

    pub fn with_stats(mut self, stats: SyncStats) -> Self {
        self.stats = stats;
        self
    }

    /// Mirror local modal closes through this connection
    pub fn attach(&mut self, publisher: Publisher) {
        self.modals.attach(publisher.clone());
        self.publisher = Some(publisher);
    }

    pub fn detach(&mut self) {
        self.modals.detach();
        self.publisher = None;
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Handle a raw inbound event. Malformed and unknown events are logged and dropped.
    pub fn handle_event(&mut self, event: &SyncEvent) -> Vec<Effect> {
        self.stats.record_received();

        let message = match SessionMessage::parse_with(event, self.simulation_defaults) {
            Ok(SessionMessage::Unknown { event_type }) => {
                debug!("Ignoring unknown event type {}", event_type);
                self.stats.record_malformed();
                return Vec::new();
            }
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed event: {}", e);
                self.stats.record_malformed();
                return Vec::new();
            }
        };

        self.apply(&message)
    }

    /// Apply a typed message
    pub fn apply(&mut self, message: &SessionMessage) -> Vec<Effect> {
        self.modals.on_remote_event(message);

        match message {
            SessionMessage::ScreenHighlight(highlight) => {
                self.highlights.push(highlight.clone());
            }
            SessionMessage::ResetToMain => {
                self.modals.close_all();
                self.notice = None;
            }
            _ => {}
        }

        match reduce(&self.screen, message) {
            Some(next) => self.replace_screen(next),
            None => Vec::new(),
        }
    }

    fn replace_screen(&mut self, next: ScreenState) -> Vec<Effect> {
        let mut effects = Vec::new();

        self.highlights.clear();
        if next.screen == ScreenType::ApplicationForm {
            self.modals.open_local(
                ModalSlot::SignaturePad,
                json!({ "fieldLabel": SIGNATURE_FIELD_LABEL }),
            );
            effects.push(Effect::ShowSignatureCapture);
        }

        debug!("Display screen {} -> {}", self.screen.screen, next.screen);
        self.screen = next;
        effects
    }

    /// Build the signature submission for the application form on screen
    pub fn prepare_signature(
        &mut self,
        signature_data: &str,
    ) -> Result<SignatureSubmission, DisplayError> {
        if self.submitting {
            return Err(DisplayError::SubmissionInFlight);
        }
        if signature_data.trim().is_empty() {
            return Err(DisplayError::EmptySignature);
        }

        let form = self
            .screen
            .application_form()
            .ok_or(DisplayError::NoApplicationForm)?;

        let submission = SignatureSubmission {
            customer_id: form.customer_id.clone().or_else(|| self.customer_id.clone()),
            session_id: self.session_id.clone(),
            product_id: Some(form.product.id.clone()),
            signature_data: signature_data.to_string(),
        };

        self.submitting = true;
        self.notice = None;
        Ok(submission)
    }

    /// Apply the outcome of a signature submission.
    ///
    /// Results are applied even if the operator has navigated elsewhere in the meantime.
    pub fn apply_submission_result(
        &mut self,
        submission: &SignatureSubmission,
        result: Result<SubmissionReceipt, SubmissionError>,
    ) -> Vec<Effect> {
        self.submitting = false;

        match result {
            Ok(_) => {
                info!("Signature accepted, consultation complete");
                self.modals.close_local(ModalSlot::SignaturePad);
                let mut effects =
                    self.replace_screen(ScreenState::completion(submission.product_id.clone()));
                effects.push(Effect::RecordCompletion(CompletionRecord::for_submission(
                    submission,
                )));
                effects
            }
            Err(e) => {
                warn!("Signature submission failed: {}", e);
                self.notice = Some(Notice::blocking(format!(
                    "서명 처리 중 오류가 발생했습니다. ({})",
                    e
                )));
                Vec::new()
            }
        }
    }

    /// Customer answered the privacy consent form.
    ///
    /// The form closes locally and the answer goes to the operator, whose
    /// console closes its copy when the answer arrives.
    pub fn respond_to_consent(&mut self, agreed: bool) -> Result<ConsentResponse, DisplayError> {
        if !self.modals.is_open(ModalSlot::PrivacyConsent) {
            return Err(DisplayError::NoConsentRequest);
        }

        let action = if agreed { "agree" } else { "decline" };
        let response = self.modals.perform_action(
            ModalSlot::PrivacyConsent,
            action,
            Value::Null,
            |slot, action, _| {
                info!("Customer chose {} on {}", action, slot);
                ConsentResponse::new(action == "agree")
            },
        );

        self.publish(SessionMessage::PrivacyConsent(response.clone()));
        Ok(response)
    }

    fn publish(&self, message: SessionMessage) {
        let event = match message.to_event() {
            Ok(event) => event,
            Err(e) => {
                warn!("Could not encode {}: {}", message.event_type(), e);
                return;
            }
        };

        let Some(publisher) = &self.publisher else {
            warn!("Not joined to a session, {} not sent", event.event_type);
            return;
        };
        if let Err(e) = publisher.publish(event) {
            warn!("Failed to send to session {}: {}", publisher.session_id(), e);
        }
    }

    /// Customer closed a modal on the display
    pub fn close_modal(&mut self, slot: ModalSlot) {
        self.modals.close_modal(slot);
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn screen(&self) -> &ScreenState {
        &self.screen
    }

    pub fn modals(&self) -> &ModalOrchestrator {
        &self.modals
    }

    pub fn highlights(&self) -> &[Highlight] {
        &self.highlights
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn view(&self) -> DisplayView {
        DisplayView {
            session_id: self.session_id.clone(),
            connected: self.connected,
            screen: self.screen.clone(),
            open_modals: self
                .modals
                .slots()
                .iter()
                .filter(|(_, state)| state.is_open)
                .map(|(slot, state)| (*slot, state.clone()))
                .collect(),
            highlights: self.highlights.clone(),
            notice: self.notice.clone(),
            submitting: self.submitting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn event(event_type: &str, data: Value) -> SyncEvent {
        SyncEvent::new(event_type, data).for_session("S-1")
    }

    fn on_application_form(display: &mut DisplayRenderer) -> Vec<Effect> {
        display.handle_event(&event(
            "show-application-form",
            json!({"product": {"ProductID": "P1", "ProductName": "정기예금"}}),
        ))
    }

    #[test]
    fn test_application_form_opens_signature_pad() {
        let mut display = DisplayRenderer::new("S-1");

        let effects = on_application_form(&mut display);

        assert_eq!(effects, vec![Effect::ShowSignatureCapture]);
        assert_eq!(
            display.modals().state(ModalSlot::SignaturePad),
            SlotState {
                is_open: true,
                data: Some(json!({"fieldLabel": "서명"})),
            }
        );
    }

    #[test]
    fn test_successful_signature_completes_locally() {
        let mut display = DisplayRenderer::new("S-1").with_customer_id("C-9");
        on_application_form(&mut display);

        let submission = display.prepare_signature("data:image/png;base64,AAAA").unwrap();
        assert_eq!(submission.customer_id.as_deref(), Some("C-9"));
        assert_eq!(submission.product_id.as_deref(), Some("P1"));
        assert!(display.is_submitting());

        let effects = display.apply_submission_result(&submission, Ok(SubmissionReceipt::default()));

        assert_eq!(display.screen().screen, ScreenType::Completion);
        assert!(!display.modals().is_open(ModalSlot::SignaturePad));
        assert!(matches!(
            effects.as_slice(),
            [Effect::RecordCompletion(record)] if record.product_id.as_deref() == Some("P1")
        ));
    }

    #[test]
    fn test_failed_signature_keeps_modal_open() {
        let mut display = DisplayRenderer::new("S-1");
        on_application_form(&mut display);

        let submission = display.prepare_signature("sig").unwrap();
        let effects = display.apply_submission_result(
            &submission,
            Err(SubmissionError::Status {
                status: 500,
                body: "boom".to_string(),
            }),
        );

        assert!(effects.is_empty());
        assert_eq!(display.screen().screen, ScreenType::ApplicationForm);
        assert!(display.modals().is_open(ModalSlot::SignaturePad));
        assert!(display.notice().is_some_and(|notice| notice.blocking));
        assert!(!display.is_submitting());
    }

    #[test]
    fn test_late_result_applies_after_navigation() {
        let mut display = DisplayRenderer::new("S-1");
        on_application_form(&mut display);
        let submission = display.prepare_signature("sig").unwrap();

        display.handle_event(&event("screen-updated", json!({"type": "welcome"})));
        display.apply_submission_result(&submission, Ok(SubmissionReceipt::default()));

        assert_eq!(display.screen().screen, ScreenType::Completion);
    }

    #[test]
    fn test_signature_requires_form() {
        let mut display = DisplayRenderer::new("S-1");
        assert_eq!(
            display.prepare_signature("sig"),
            Err(DisplayError::NoApplicationForm)
        );

        on_application_form(&mut display);
        assert_eq!(display.prepare_signature("  "), Err(DisplayError::EmptySignature));
    }

    #[test]
    fn test_highlights_cleared_on_screen_change() {
        let mut display = DisplayRenderer::new("S-1");

        display.handle_event(&event(
            "screen-highlight",
            json!({"highlight": {"elementId": "rate", "color": "#ff0000"}}),
        ));
        assert_eq!(display.highlights().len(), 1);
        assert_eq!(display.highlights()[0].color, "#ff0000");

        display.handle_event(&event("screen-updated", json!({"title": "시뮬레이션"})));
        assert!(display.highlights().is_empty());
    }

    #[test]
    fn test_malformed_and_unknown_events_are_dropped() {
        let stats = SyncStats::new();
        let mut display = DisplayRenderer::new("S-1").with_stats(stats.clone());

        display.handle_event(&event("show-application-form", json!(42)));
        display.handle_event(&event("hologram-updated", json!({})));

        assert_eq!(display.screen(), &ScreenState::default());
        assert_eq!(stats.snapshot().events_malformed, 2);
        assert_eq!(stats.snapshot().events_received, 2);
    }

    #[test]
    fn test_reset_to_main_closes_everything() {
        let mut display = DisplayRenderer::new("S-1");
        on_application_form(&mut display);
        display.handle_event(&event("modal:calculator:open", json!({})));

        display.handle_event(&event("reset-to-main", json!({})));

        assert_eq!(display.screen(), &ScreenState::default());
        assert!(display.modals().open_slots().is_empty());
    }

    #[test]
    fn test_comparison_without_amounts_uses_configured_defaults() {
        let mut display = DisplayRenderer::new("S-1").with_simulation_defaults(2_000_000, 24);

        display.handle_event(&event(
            "show-comparison",
            json!({"selectedProducts": [{"id": "P1"}, {"id": "P2"}]}),
        ));

        match &display.screen().payload {
            ScreenPayload::Comparison(view) => {
                assert_eq!(view.simulation_amount, 2_000_000);
                assert_eq!(view.simulation_period, 24);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        let mirrored = display.modals().data(ModalSlot::ProductAnalysis).unwrap();
        assert_eq!(mirrored["simulationAmount"], 2_000_000);
    }

    #[test]
    fn test_consent_answer_requires_open_form() {
        let mut display = DisplayRenderer::new("S-1");
        assert_eq!(
            display.respond_to_consent(true),
            Err(DisplayError::NoConsentRequest)
        );

        display.handle_event(&event("modal:privacyConsent:open", json!({})));
        let response = display.respond_to_consent(false).unwrap();

        assert!(!response.consent_given);
        assert!(!display.modals().is_open(ModalSlot::PrivacyConsent));
    }
}
