//! Sync event envelope and payload types

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Simulation amount assumed when a comparison request carries none
pub const DEFAULT_SIMULATION_AMOUNT: u64 = 1_000_000;

/// Simulation period (months) assumed when a comparison request carries none
pub const DEFAULT_SIMULATION_PERIOD: u32 = 12;

/// Amount and period a receiver assumes for a comparison that leaves them out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationDefaults {
    pub amount: u64,
    pub period: u32,
}

impl Default for SimulationDefaults {
    fn default() -> Self {
        Self {
            amount: DEFAULT_SIMULATION_AMOUNT,
            period: DEFAULT_SIMULATION_PERIOD,
        }
    }
}

/// Typed, immutable message broadcast on a session-scoped channel.
///
/// `event_type` is the discriminant that fixes the shape of `data`; see
/// [`SessionMessage`](super::SessionMessage) for the typed view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl SyncEvent {
    /// Create an event stamped with the current time
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            session_id: None,
            timestamp: Some(now_ms()),
        }
    }

    /// Attach the session id this event belongs to
    pub fn for_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Serialize to the JSON wire shape
    pub fn to_json(&self) -> Result<String, EventError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from the JSON wire shape
    pub fn from_json(text: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// The active screen on the customer display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScreenType {
    Welcome,
    ProductComparison,
    SimulationResult,
    ApplicationForm,
    Completion,
}

impl ScreenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenType::Welcome => "welcome",
            ScreenType::ProductComparison => "productComparison",
            ScreenType::SimulationResult => "simulationResult",
            ScreenType::ApplicationForm => "applicationForm",
            ScreenType::Completion => "completion",
        }
    }

    /// Resolve a screen name as sent by either terminal, including the kebab-case
    /// names used by older operator builds
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "welcome" => Some(ScreenType::Welcome),
            "productComparison" | "product-comparison" | "product-comparison-updated" => {
                Some(ScreenType::ProductComparison)
            }
            "simulationResult" | "simulation-result" | "simulation" => {
                Some(ScreenType::SimulationResult)
            }
            "applicationForm" | "application-form" => Some(ScreenType::ApplicationForm),
            "completion" => Some(ScreenType::Completion),
            _ => None,
        }
    }
}

impl fmt::Display for ScreenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product summary as exchanged between terminals.
///
/// Accepts the legacy record keys (`ProductID`, `ProductName`, ...) and keeps any
/// field it does not model in `extra`, so the display can render what the
/// operator sent verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    #[serde(alias = "ProductID", alias = "productId", deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(
        default,
        alias = "ProductName",
        alias = "productName",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(
        default,
        alias = "ProductType",
        skip_serializing_if = "Option::is_none"
    )]
    pub product_type: Option<String>,
    #[serde(
        default,
        alias = "BaseInterestRate",
        alias = "baseInterestRate",
        skip_serializing_if = "Option::is_none"
    )]
    pub base_rate: Option<f64>,
    #[serde(
        default,
        alias = "Description",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProductSummary {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            product_type: None,
            base_rate: None,
            description: None,
            extra: Map::new(),
        }
    }

    /// Summary carrying only an identifier (product not in the local catalog)
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            product_type: None,
            base_rate: None,
            description: None,
            extra: Map::new(),
        }
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.base_rate = Some(rate);
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(de::Error::custom(format!("invalid product id: {}", other))),
    }
}

/// Calculated simulation snapshot shown on the display
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationView {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub product_info: Value,
    #[serde(default)]
    pub results: Value,
    #[serde(default)]
    pub preferential_rates: Value,
}

/// Payload of `show-comparison`, normalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonView {
    pub products: Vec<ProductSummary>,
    pub selected_products: Vec<ProductSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_product: Option<Value>,
    pub simulation_amount: u64,
    pub simulation_period: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComparison {
    #[serde(default)]
    products: Option<Vec<ProductSummary>>,
    #[serde(default)]
    selected_products: Option<Vec<ProductSummary>>,
    #[serde(default)]
    customer_product: Option<Value>,
    #[serde(default)]
    product: Option<Value>,
    #[serde(default)]
    simulation_amount: Option<u64>,
    #[serde(default)]
    simulation_period: Option<u32>,
}

impl ComparisonView {
    /// Decode a comparison payload, tolerating the alternate key names.
    ///
    /// `products` wins over `selectedProducts`. A missing or zero amount or
    /// period is replaced from `defaults`.
    pub fn from_data(data: &Value, defaults: SimulationDefaults) -> Result<Self, serde_json::Error> {
        let raw = RawComparison::deserialize(data)?;

        let selected_products = raw
            .products
            .or(raw.selected_products)
            .unwrap_or_default();

        Ok(Self {
            products: selected_products.clone(),
            selected_products,
            customer_product: raw.customer_product.or(raw.product).filter(|v| !v.is_null()),
            simulation_amount: raw
                .simulation_amount
                .filter(|amount| *amount > 0)
                .unwrap_or(defaults.amount),
            simulation_period: raw
                .simulation_period
                .filter(|period| *period > 0)
                .unwrap_or(defaults.period),
        })
    }
}

/// Payload of `show-application-form`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationForm {
    pub product: ProductSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
}

/// Payload of `product-detail-modal`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetail {
    pub product: ProductSummary,
    #[serde(default)]
    pub simulation_data: Value,
    #[serde(default)]
    pub selected_rates: Value,
    #[serde(default)]
    pub chart_data: Value,
    #[serde(default)]
    pub compound_comparison_data: Value,
    #[serde(default)]
    pub rate_options: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl ProductDetail {
    pub fn for_product(product: ProductSummary) -> Self {
        Self {
            product,
            simulation_data: Value::Null,
            selected_rates: Value::Null,
            chart_data: Value::Null,
            compound_comparison_data: Value::Null,
            rate_options: Value::Null,
            timestamp: Some(now_ms()),
        }
    }
}

/// Payload of the `*-close` notifications
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CloseNotice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl CloseNotice {
    pub fn now() -> Self {
        Self {
            timestamp: Some(now_ms()),
        }
    }
}

/// Customer's answer to the privacy consent form, sent display -> operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentResponse {
    pub consent_given: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl ConsentResponse {
    pub fn new(consent_given: bool) -> Self {
        Self {
            consent_given,
            timestamp: Some(now_ms()),
        }
    }
}

/// Payload of `screen-highlight`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub element_id: String,
    #[serde(default = "default_highlight_type")]
    pub highlight_type: String,
    #[serde(default = "default_highlight_color")]
    pub color: String,
}

fn default_highlight_type() -> String {
    "highlight".to_string()
}

fn default_highlight_color() -> String {
    "#ffff00".to_string()
}

/// Errors raised while decoding sync events
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Malformed {event_type} event: {reason}")]
    Malformed { event_type: String, reason: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EventError {
    pub(crate) fn malformed(event_type: &str, reason: impl fmt::Display) -> Self {
        EventError::Malformed {
            event_type: event_type.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
