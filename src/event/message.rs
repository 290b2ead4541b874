//! Typed view over sync events
//!
//! Consumers match exhaustively on [`SessionMessage`]; anything not recognized
//! lands in [`SessionMessage::Unknown`] so newer peers never crash older ones.

use serde::Serialize;
use serde_json::{Value, json};

use super::types::{
    ApplicationForm, CloseNotice, ComparisonView, ConsentResponse, EventError, Highlight, ProductDetail,
    ProductSummary, ScreenType, SimulationDefaults, SimulationView, SyncEvent,
};
use crate::modal::ModalSlot;

pub const PRODUCT_COMPARISON_UPDATED: &str = "product-comparison-updated";
pub const SCREEN_UPDATED: &str = "screen-updated";
pub const SIMULATION_UPDATED: &str = "simulation-updated";
pub const SHOW_COMPARISON: &str = "show-comparison";
pub const SHOW_APPLICATION_FORM: &str = "show-application-form";
pub const PRODUCT_DETAIL_MODAL: &str = "product-detail-modal";
pub const PRODUCT_DETAIL_MODAL_CLOSE: &str = "product-detail-modal-close";
pub const PRODUCT_ANALYSIS_CLOSE: &str = "product-analysis-close";
pub const SCREEN_HIGHLIGHT: &str = "screen-highlight";
pub const RESET_TO_MAIN: &str = "reset-to-main";
pub const PRIVACY_CONSENT: &str = "privacy-consent";

const MODAL_PREFIX: &str = "modal:";
const SCREEN_PREFIX: &str = "screen:";

/// Body of `screen-updated` / `simulation-updated`
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenUpdate {
    /// `{title, productInfo, results, preferentialRates}`
    Simulation(SimulationView),
    /// Generic `{type, data}`
    Generic { screen: ScreenType, data: Value },
}

impl ScreenUpdate {
    fn decode(event_type: &str, data: &Value) -> Result<Self, EventError> {
        if let Some(inner) = data.get("type").and_then(Value::as_str) {
            let screen = ScreenType::from_wire(inner).ok_or_else(|| {
                EventError::malformed(event_type, format!("unknown screen type {}", inner))
            })?;
            return Ok(ScreenUpdate::Generic {
                screen,
                data: data.get("data").cloned().unwrap_or(Value::Null),
            });
        }

        if !data.is_object() {
            return Err(EventError::malformed(event_type, "expected an object"));
        }

        Ok(ScreenUpdate::Simulation(decode(event_type, data)?))
    }

    fn encode(&self) -> Result<Value, EventError> {
        match self {
            ScreenUpdate::Simulation(view) => Ok(serde_json::to_value(view)?),
            ScreenUpdate::Generic { screen, data } => Ok(json!({
                "type": screen.as_str(),
                "data": data,
            })),
        }
    }
}

/// Tagged union of every message the two terminals exchange
#[derive(Debug, Clone, PartialEq)]
pub enum SessionMessage {
    /// Full snapshot of the operator's comparison selection
    ProductComparisonUpdated(Vec<ProductSummary>),
    ScreenUpdated(ScreenUpdate),
    SimulationUpdated(ScreenUpdate),
    ShowComparison(ComparisonView),
    ShowApplicationForm(ApplicationForm),
    ProductDetailModal(ProductDetail),
    ProductDetailModalClose(CloseNotice),
    ProductAnalysisClose(CloseNotice),
    ScreenHighlight(Highlight),
    /// Customer agreed to or declined the privacy consent form
    PrivacyConsent(ConsentResponse),
    /// `modal:<slot>:open`
    ModalOpened { slot: ModalSlot, data: Value },
    /// `modal:<slot>:close`
    ModalClosed { slot: ModalSlot },
    /// Return the display to the welcome screen
    ResetToMain,
    /// Unrecognized type (including modal events for slots this build lacks)
    Unknown { event_type: String },
}

impl SessionMessage {
    /// Resolve the typed message for an event.
    ///
    /// Unknown types are not an error; a known type whose `data` does not fit
    /// its shape is.
    pub fn parse(event: &SyncEvent) -> Result<Self, EventError> {
        Self::parse_with(event, SimulationDefaults::default())
    }

    /// [`SessionMessage::parse`] with the receiver's simulation defaults for
    /// comparisons that leave amount or period out
    pub fn parse_with(event: &SyncEvent, defaults: SimulationDefaults) -> Result<Self, EventError> {
        let event_type = event.event_type.as_str();
        let data = &event.data;

        let message = match event_type {
            PRODUCT_COMPARISON_UPDATED => {
                SessionMessage::ProductComparisonUpdated(decode(event_type, data)?)
            }
            SCREEN_UPDATED => SessionMessage::ScreenUpdated(ScreenUpdate::decode(event_type, data)?),
            SIMULATION_UPDATED => {
                SessionMessage::SimulationUpdated(ScreenUpdate::decode(event_type, data)?)
            }
            SHOW_COMPARISON => SessionMessage::ShowComparison(
                ComparisonView::from_data(data, defaults)
                    .map_err(|e| EventError::malformed(event_type, e))?,
            ),
            SHOW_APPLICATION_FORM => SessionMessage::ShowApplicationForm(decode(event_type, data)?),
            PRODUCT_DETAIL_MODAL => SessionMessage::ProductDetailModal(decode(event_type, data)?),
            PRODUCT_DETAIL_MODAL_CLOSE => {
                SessionMessage::ProductDetailModalClose(decode_or_default(event_type, data)?)
            }
            PRODUCT_ANALYSIS_CLOSE => {
                SessionMessage::ProductAnalysisClose(decode_or_default(event_type, data)?)
            }
            SCREEN_HIGHLIGHT => {
                // Older operator builds nest the highlight under `highlight`.
                let body = data.get("highlight").filter(|v| v.is_object()).unwrap_or(data);
                SessionMessage::ScreenHighlight(decode(event_type, body)?)
            }
            RESET_TO_MAIN => SessionMessage::ResetToMain,
            PRIVACY_CONSENT => SessionMessage::PrivacyConsent(decode(event_type, data)?),
            other => {
                if let Some(rest) = other.strip_prefix(MODAL_PREFIX) {
                    parse_modal(other, rest, data)
                } else if let Some(name) = other.strip_prefix(SCREEN_PREFIX) {
                    match ScreenType::from_wire(name) {
                        Some(screen) => SessionMessage::ScreenUpdated(ScreenUpdate::Generic {
                            screen,
                            data: data.clone(),
                        }),
                        None => SessionMessage::Unknown {
                            event_type: other.to_string(),
                        },
                    }
                } else {
                    SessionMessage::Unknown {
                        event_type: other.to_string(),
                    }
                }
            }
        };

        Ok(message)
    }

    /// Wire discriminant for this message
    pub fn event_type(&self) -> String {
        match self {
            SessionMessage::ProductComparisonUpdated(_) => PRODUCT_COMPARISON_UPDATED.to_string(),
            SessionMessage::ScreenUpdated(_) => SCREEN_UPDATED.to_string(),
            SessionMessage::SimulationUpdated(_) => SIMULATION_UPDATED.to_string(),
            SessionMessage::ShowComparison(_) => SHOW_COMPARISON.to_string(),
            SessionMessage::ShowApplicationForm(_) => SHOW_APPLICATION_FORM.to_string(),
            SessionMessage::ProductDetailModal(_) => PRODUCT_DETAIL_MODAL.to_string(),
            SessionMessage::ProductDetailModalClose(_) => PRODUCT_DETAIL_MODAL_CLOSE.to_string(),
            SessionMessage::ProductAnalysisClose(_) => PRODUCT_ANALYSIS_CLOSE.to_string(),
            SessionMessage::ScreenHighlight(_) => SCREEN_HIGHLIGHT.to_string(),
            SessionMessage::PrivacyConsent(_) => PRIVACY_CONSENT.to_string(),
            SessionMessage::ModalOpened { slot, .. } => slot.open_event_type(),
            SessionMessage::ModalClosed { slot } => slot.close_event_type(),
            SessionMessage::ResetToMain => RESET_TO_MAIN.to_string(),
            SessionMessage::Unknown { event_type } => event_type.clone(),
        }
    }

    /// Build the wire event for this message
    pub fn to_event(&self) -> Result<SyncEvent, EventError> {
        let data = match self {
            SessionMessage::ProductComparisonUpdated(products) => encode(products)?,
            SessionMessage::ScreenUpdated(update) | SessionMessage::SimulationUpdated(update) => {
                update.encode()?
            }
            SessionMessage::ShowComparison(view) => encode(view)?,
            SessionMessage::ShowApplicationForm(form) => encode(form)?,
            SessionMessage::ProductDetailModal(detail) => encode(detail)?,
            SessionMessage::ProductDetailModalClose(notice)
            | SessionMessage::ProductAnalysisClose(notice) => encode(notice)?,
            SessionMessage::ScreenHighlight(highlight) => encode(highlight)?,
            SessionMessage::PrivacyConsent(response) => encode(response)?,
            SessionMessage::ModalOpened { data, .. } => data.clone(),
            SessionMessage::ModalClosed { .. } | SessionMessage::ResetToMain => json!({}),
            SessionMessage::Unknown { event_type } => {
                return Err(EventError::malformed(event_type, "cannot encode unknown event"));
            }
        };

        Ok(SyncEvent::new(self.event_type(), data))
    }
}

fn parse_modal(event_type: &str, rest: &str, data: &Value) -> SessionMessage {
    let unknown = || SessionMessage::Unknown {
        event_type: event_type.to_string(),
    };

    let Some((name, action)) = rest.rsplit_once(':') else {
        return unknown();
    };
    let Some(slot) = ModalSlot::parse(name) else {
        return unknown();
    };

    match action {
        "open" => SessionMessage::ModalOpened {
            slot,
            data: data.clone(),
        },
        "close" => SessionMessage::ModalClosed { slot },
        _ => unknown(),
    }
}

fn decode<T: serde::de::DeserializeOwned>(event_type: &str, data: &Value) -> Result<T, EventError> {
    T::deserialize(data).map_err(|e| EventError::malformed(event_type, e))
}

fn decode_or_default<T>(event_type: &str, data: &Value) -> Result<T, EventError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if data.is_null() {
        return Ok(T::default());
    }
    decode(event_type, data)
}

fn encode<T: Serialize>(value: &T) -> Result<Value, EventError> {
    Ok(serde_json::to_value(value)?)
}
