//! Operator controller
//!
//! The authoring side of a consultation. Every state change the customer
//! should see is turned into a typed message and published; the operator's
//! own copy of the state is updated first so a dead channel never blocks it.

pub mod selection;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::channel::Publisher;
use crate::event::{
    ApplicationForm, CloseNotice, ComparisonView, DEFAULT_SIMULATION_AMOUNT,
    DEFAULT_SIMULATION_PERIOD, EventError, Highlight, ProductDetail, ProductSummary, ScreenType,
    ScreenUpdate, SessionMessage, SimulationView, SyncEvent,
};
use crate::modal::{DEFAULT_MIRRORED, ModalOrchestrator, ModalSlot};

pub use selection::{ComparisonSelection, MAX_COMPARISON, ToggleOutcome};

/// Products needed before a comparison can be shown
pub const MIN_COMPARISON: usize = 2;

/// Error types for operator actions
#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    #[error("Unknown product: {0}")]
    UnknownProduct(String),
    #[error("Select at least {required} products to compare ({selected} selected)")]
    NotEnoughProducts { selected: usize, required: usize },
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Operator-side state plus the publishing half of the session
#[derive(Debug)]
pub struct OperatorController {
    catalog: Vec<ProductSummary>,
    selection: ComparisonSelection,
    modals: ModalOrchestrator,
    publisher: Option<Publisher>,
    simulation_amount: u64,
    simulation_period: u32,
    consent: Option<bool>,
}

impl OperatorController {
    pub fn new(catalog: Vec<ProductSummary>) -> Self {
        Self::with_mirrored(catalog, DEFAULT_MIRRORED)
    }

    pub fn with_mirrored(
        catalog: Vec<ProductSummary>,
        mirrored: impl IntoIterator<Item = ModalSlot>,
    ) -> Self {
        Self {
            catalog,
            selection: ComparisonSelection::new(),
            modals: ModalOrchestrator::new(mirrored),
            publisher: None,
            simulation_amount: DEFAULT_SIMULATION_AMOUNT,
            simulation_period: DEFAULT_SIMULATION_PERIOD,
            consent: None,
        }
    }

    /// Amount and period used when a comparison request leaves them out
    pub fn with_simulation_defaults(mut self, amount: u64, period: u32) -> Self {
        self.simulation_amount = amount;
        self.simulation_period = period;
        self
    }

    pub fn attach(&mut self, publisher: Publisher) {
        self.modals.attach(publisher.clone());
        self.publisher = Some(publisher);
    }

    pub fn detach(&mut self) {
        self.modals.detach();
        self.publisher = None;
    }

    pub fn catalog(&self) -> &[ProductSummary] {
        &self.catalog
    }

    pub fn selection(&self) -> &ComparisonSelection {
        &self.selection
    }

    pub fn modals(&self) -> &ModalOrchestrator {
        &self.modals
    }

    pub fn product(&self, product_id: &str) -> Result<&ProductSummary, OperatorError> {
        self.catalog
            .iter()
            .find(|product| product.id == product_id)
            .ok_or_else(|| OperatorError::UnknownProduct(product_id.to_string()))
    }

    /// Selected products, in selection order
    pub fn selected_products(&self) -> Vec<ProductSummary> {
        self.selection
            .ids()
            .iter()
            .map(|id| {
                self.product(id)
                    .cloned()
                    .unwrap_or_else(|_| ProductSummary::from_id(id.clone()))
            })
            .collect()
    }

    /// Toggle a product in the comparison selection and publish the full snapshot
    pub fn toggle(&mut self, product_id: &str) -> Result<ToggleOutcome, OperatorError> {
        self.product(product_id)?;

        let outcome = self.selection.toggle(product_id);
        match outcome {
            ToggleOutcome::Full => {
                info!(
                    "Comparison already holds {} products, {} not added",
                    MAX_COMPARISON, product_id
                );
            }
            _ => {
                self.publish(SessionMessage::ProductComparisonUpdated(
                    self.selected_products(),
                ))?;
            }
        }

        Ok(outcome)
    }

    /// Show the side-by-side analysis of the current selection
    pub fn show_comparison(
        &mut self,
        simulation_amount: Option<u64>,
        simulation_period: Option<u32>,
        customer_product: Option<Value>,
    ) -> Result<ComparisonView, OperatorError> {
        if self.selection.len() < MIN_COMPARISON {
            return Err(OperatorError::NotEnoughProducts {
                selected: self.selection.len(),
                required: MIN_COMPARISON,
            });
        }

        let selected = self.selected_products();
        let view = ComparisonView {
            products: selected.clone(),
            selected_products: selected,
            customer_product,
            simulation_amount: simulation_amount.unwrap_or(self.simulation_amount),
            simulation_period: simulation_period.unwrap_or(self.simulation_period),
        };

        let message = SessionMessage::ShowComparison(view.clone());
        self.modals.on_remote_event(&message);
        self.publish(message)?;
        Ok(view)
    }

    pub fn close_product_analysis(&mut self) -> Result<(), OperatorError> {
        self.modals.close_local(ModalSlot::ProductAnalysis);
        self.publish(SessionMessage::ProductAnalysisClose(CloseNotice::now()))
    }

    pub fn show_simulation(&mut self, view: SimulationView) -> Result<(), OperatorError> {
        self.publish(SessionMessage::SimulationUpdated(ScreenUpdate::Simulation(view)))
    }

    /// Publish a simple projection of the current selection, falling back to
    /// the configured amount and period
    pub fn simulate_selection(
        &mut self,
        amount: Option<u64>,
        period: Option<u32>,
    ) -> Result<SimulationView, OperatorError> {
        let view = simple_simulation(
            &self.selected_products(),
            amount.unwrap_or(self.simulation_amount),
            period.unwrap_or(self.simulation_period),
        );
        self.show_simulation(view.clone())?;
        Ok(view)
    }

    pub fn show_application_form(
        &mut self,
        product_id: &str,
        customer_id: Option<String>,
    ) -> Result<(), OperatorError> {
        let product = self.product(product_id)?.clone();
        self.publish(SessionMessage::ShowApplicationForm(ApplicationForm {
            product,
            customer_id,
        }))
    }

    /// Move the display to a screen
    pub fn navigate(&mut self, screen: ScreenType, data: Value) -> Result<(), OperatorError> {
        self.publish(SessionMessage::ScreenUpdated(ScreenUpdate::Generic {
            screen,
            data,
        }))
    }

    pub fn open_product_detail(&mut self, detail: ProductDetail) -> Result<(), OperatorError> {
        let message = SessionMessage::ProductDetailModal(detail);
        self.modals.on_remote_event(&message);
        self.publish(message)
    }

    /// Open the detail modal for a catalog product with no precomputed data
    pub fn open_product_detail_for(&mut self, product_id: &str) -> Result<(), OperatorError> {
        let product = self.product(product_id)?.clone();
        self.open_product_detail(ProductDetail::for_product(product))
    }

    pub fn close_product_detail(&mut self) -> Result<(), OperatorError> {
        self.modals.close_local(ModalSlot::ProductDetail);
        self.publish(SessionMessage::ProductDetailModalClose(CloseNotice::now()))
    }

    pub fn highlight(
        &mut self,
        element_id: impl Into<String>,
        highlight_type: Option<String>,
        color: Option<String>,
    ) -> Result<(), OperatorError> {
        let highlight = Highlight {
            session_id: self
                .publisher
                .as_ref()
                .map(|publisher| publisher.session_id().to_string()),
            element_id: element_id.into(),
            highlight_type: highlight_type.unwrap_or_else(|| "highlight".to_string()),
            color: color.unwrap_or_else(|| "#ffff00".to_string()),
        };
        self.publish(SessionMessage::ScreenHighlight(highlight))
    }

    /// Return the display to the welcome screen and clear the operator's own state
    pub fn reset_display(&mut self) -> Result<(), OperatorError> {
        self.selection.clear();
        self.modals.close_all();
        self.consent = None;
        self.publish(SessionMessage::ResetToMain)
    }

    pub fn open_modal(&mut self, slot: ModalSlot, data: Value) {
        self.modals.open_modal(slot, data);
    }

    pub fn close_modal(&mut self, slot: ModalSlot) {
        self.modals.close_modal(slot);
    }

    /// Customer's latest privacy consent answer, if one has arrived
    pub fn consent(&self) -> Option<bool> {
        self.consent
    }

    /// Apply an event published by the display. Returns whether the operator's
    /// view of the session changed.
    pub fn on_remote_event(&mut self, event: &SyncEvent) -> bool {
        match SessionMessage::parse(event) {
            Ok(SessionMessage::PrivacyConsent(response)) => {
                info!("Customer consent answer: {}", response.consent_given);
                self.modals.close_local(ModalSlot::PrivacyConsent);
                self.consent = Some(response.consent_given);
                true
            }
            Ok(message) => self.modals.on_remote_event(&message),
            Err(e) => {
                warn!("Dropping malformed event from display: {}", e);
                false
            }
        }
    }

    fn publish(&self, message: SessionMessage) -> Result<(), OperatorError> {
        let event = message.to_event()?;

        let Some(publisher) = &self.publisher else {
            warn!("Not joined to a session, {} not published", event.event_type);
            return Ok(());
        };

        debug!("Publishing {}", event.event_type);
        if let Err(e) = publisher.publish(event) {
            warn!("Failed to publish to session {}: {}", publisher.session_id(), e);
        }
        Ok(())
    }
}

/// Simple-interest projection of each product, before tax.
///
/// The real calculators live outside this crate; this only fills the
/// simulation contract so the display has something to show.
pub fn simple_simulation(products: &[ProductSummary], amount: u64, period: u32) -> SimulationView {
    let results: Vec<Value> = products
        .iter()
        .map(|product| {
            let rate = product.base_rate.unwrap_or_default();
            let interest = (amount as f64 * rate / 100.0 * period as f64 / 12.0).round() as u64;
            json!({
                "productId": product.id,
                "productName": product.display_name(),
                "rate": rate,
                "principal": amount,
                "interest": interest,
                "maturityAmount": amount.saturating_add(interest),
            })
        })
        .collect();

    SimulationView {
        title: format!("{} months, {} KRW", period, amount),
        product_info: json!(products),
        results: Value::Array(results),
        preferential_rates: Value::Null,
    }
}

/// Products offered when no catalog is configured
pub fn sample_catalog() -> Vec<ProductSummary> {
    vec![
        ProductSummary::new("P001", "하나 정기예금").with_rate(3.2),
        ProductSummary::new("P002", "내맘대로 적금").with_rate(3.8),
        ProductSummary::new("P003", "주택청약종합저축").with_rate(2.8),
        ProductSummary::new("P004", "급여하나 통장").with_rate(0.1),
        ProductSummary::new("P005", "하나 원큐 적금").with_rate(4.1),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelError, FrameSink, OutboundFrame};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<SyncEvent>>,
    }

    impl FrameSink for RecordingSink {
        fn send(&self, frame: OutboundFrame) -> Result<(), ChannelError> {
            if let OutboundFrame::Publish { event, .. } = frame {
                self.events.lock().unwrap().push(event);
            }
            Ok(())
        }
    }

    fn attached() -> (OperatorController, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let mut operator = OperatorController::new(sample_catalog());
        operator.attach(Publisher::new("S-1", "conn-1", sink.clone()));
        (operator, sink)
    }

    #[test]
    fn test_every_toggle_publishes_full_snapshot() {
        let (mut operator, sink) = attached();

        operator.toggle("P001").unwrap();
        operator.toggle("P002").unwrap();
        operator.toggle("P001").unwrap();

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.event_type == "product-comparison-updated"));
        assert_eq!(events[1].data.as_array().map(Vec::len), Some(2));
        assert_eq!(events[2].data[0]["id"], "P002");
        assert_eq!(events[2].session_id.as_deref(), Some("S-1"));
    }

    #[test]
    fn test_full_selection_publishes_nothing() {
        let (mut operator, sink) = attached();
        for id in ["P001", "P002", "P003"] {
            operator.toggle(id).unwrap();
        }

        assert_eq!(operator.toggle("P004").unwrap(), ToggleOutcome::Full);
        assert_eq!(sink.events.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_product_is_rejected() {
        let (mut operator, sink) = attached();
        assert!(matches!(
            operator.toggle("NOPE"),
            Err(OperatorError::UnknownProduct(_))
        ));
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_comparison_needs_two_products() {
        let (mut operator, _sink) = attached();
        operator.toggle("P001").unwrap();

        assert!(matches!(
            operator.show_comparison(None, None, None),
            Err(OperatorError::NotEnoughProducts { selected: 1, .. })
        ));
    }

    #[test]
    fn test_comparison_uses_defaults_and_opens_analysis() {
        let (mut operator, sink) = attached();
        operator.toggle("P001").unwrap();
        operator.toggle("P002").unwrap();

        let view = operator.show_comparison(None, Some(24), None).unwrap();

        assert_eq!(view.simulation_amount, 1_000_000);
        assert_eq!(view.simulation_period, 24);
        assert!(operator.modals().is_open(ModalSlot::ProductAnalysis));

        let events = sink.events.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.event_type, "show-comparison");
        assert_eq!(last.data["simulationPeriod"], 24);
    }

    #[test]
    fn test_customer_close_reaches_operator_modal() {
        let (mut operator, sink) = attached();
        operator.open_modal(ModalSlot::Calculator, json!({"principal": 100}));

        let changed = operator.on_remote_event(&SyncEvent::new("modal:calculator:close", json!({})));

        assert!(changed);
        assert!(!operator.modals().is_open(ModalSlot::Calculator));
        // Only the operator's own open went out.
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_reset_clears_selection() {
        let (mut operator, sink) = attached();
        operator.toggle("P001").unwrap();
        operator.reset_display().unwrap();

        assert!(operator.selection().is_empty());
        assert_eq!(
            sink.events.lock().unwrap().last().map(|e| e.event_type.clone()),
            Some("reset-to-main".to_string())
        );
    }

    #[test]
    fn test_simple_simulation_figures() {
        let products = vec![ProductSummary::new("P1", "예금").with_rate(3.0)];
        let view = simple_simulation(&products, 1_000_000, 12);

        assert_eq!(view.results[0]["interest"], 30_000);
        assert_eq!(view.results[0]["maturityAmount"], 1_030_000);
    }

    #[test]
    fn test_simple_simulation_saturates_huge_amounts() {
        let products = vec![ProductSummary::new("P1", "예금").with_rate(3.0)];
        let view = simple_simulation(&products, u64::MAX, 12);

        assert_eq!(view.results[0]["maturityAmount"], u64::MAX);
    }

    #[test]
    fn test_selection_simulation_uses_configured_defaults() {
        let sink = Arc::new(RecordingSink::default());
        let mut operator =
            OperatorController::new(sample_catalog()).with_simulation_defaults(2_000_000, 24);
        operator.attach(Publisher::new("S-1", "conn-1", sink.clone()));
        operator.toggle("P001").unwrap();

        let view = operator.simulate_selection(None, None).unwrap();

        assert_eq!(view.results[0]["principal"], 2_000_000);
        assert_eq!(view.title, "24 months, 2000000 KRW");
        assert_eq!(
            sink.events.lock().unwrap().last().map(|e| e.event_type.clone()),
            Some("simulation-updated".to_string())
        );
    }

    #[test]
    fn test_publishing_without_session_is_not_an_error() {
        let mut operator = OperatorController::new(sample_catalog());
        operator.toggle("P001").unwrap();
        operator.navigate(ScreenType::Welcome, Value::Null).unwrap();
    }
}
