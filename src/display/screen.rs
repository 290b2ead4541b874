//! Display screen state and its reducer

use serde_json::Value;

use crate::event::{
    ApplicationForm, ComparisonView, ProductSummary, ScreenType, ScreenUpdate, SessionMessage,
    SimulationView,
};

/// What the active screen shows
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenPayload {
    None,
    ProductList(Vec<ProductSummary>),
    Comparison(ComparisonView),
    Simulation(SimulationView),
    ApplicationForm(ApplicationForm),
    Generic(Value),
    Completion { product_id: Option<String> },
}

/// Exactly one active screen, replaced wholesale by each screen event
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenState {
    pub screen: ScreenType,
    pub payload: ScreenPayload,
}

impl Default for ScreenState {
    fn default() -> Self {
        Self {
            screen: ScreenType::Welcome,
            payload: ScreenPayload::None,
        }
    }
}

impl ScreenState {
    pub fn new(screen: ScreenType, payload: ScreenPayload) -> Self {
        Self { screen, payload }
    }

    pub fn completion(product_id: Option<String>) -> Self {
        Self::new(ScreenType::Completion, ScreenPayload::Completion { product_id })
    }

    /// Application form currently on screen, if any
    pub fn application_form(&self) -> Option<&ApplicationForm> {
        match &self.payload {
            ScreenPayload::ApplicationForm(form) => Some(form),
            _ => None,
        }
    }
}

/// Next screen for an inbound message, or `None` when the message does not
/// touch the screen.
///
/// The prior state is deliberately not consulted: the operator is the only
/// sequencing authority, so back-navigation is always accepted.
pub fn reduce(_state: &ScreenState, message: &SessionMessage) -> Option<ScreenState> {
    let next = match message {
        SessionMessage::ProductComparisonUpdated(products) => ScreenState::new(
            ScreenType::ProductComparison,
            ScreenPayload::ProductList(products.clone()),
        ),
        SessionMessage::ScreenUpdated(update) | SessionMessage::SimulationUpdated(update) => {
            from_update(update)
        }
        SessionMessage::ShowComparison(view) => ScreenState::new(
            ScreenType::ProductComparison,
            ScreenPayload::Comparison(view.clone()),
        ),
        SessionMessage::ShowApplicationForm(form) => ScreenState::new(
            ScreenType::ApplicationForm,
            ScreenPayload::ApplicationForm(form.clone()),
        ),
        SessionMessage::ResetToMain => ScreenState::default(),
        _ => return None,
    };

    Some(next)
}

fn from_update(update: &ScreenUpdate) -> ScreenState {
    match update {
        ScreenUpdate::Simulation(view) => ScreenState::new(
            ScreenType::SimulationResult,
            ScreenPayload::Simulation(view.clone()),
        ),
        ScreenUpdate::Generic { screen, data } => {
            let payload = match screen {
                ScreenType::Welcome if data.is_null() => ScreenPayload::None,
                ScreenType::ApplicationForm => serde_json::from_value(data.clone())
                    .map(ScreenPayload::ApplicationForm)
                    .unwrap_or_else(|_| ScreenPayload::Generic(data.clone())),
                ScreenType::Completion => ScreenPayload::Completion {
                    product_id: data
                        .pointer("/product/id")
                        .or_else(|| data.get("productId"))
                        .and_then(|id| match id {
                            Value::String(id) => Some(id.clone()),
                            Value::Number(id) => Some(id.to_string()),
                            _ => None,
                        }),
                },
                _ => ScreenPayload::Generic(data.clone()),
            };
            ScreenState::new(*screen, payload)
        }
    }
}
