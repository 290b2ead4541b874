//! Named overlay slots

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One of the fixed overlay regions tracked by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModalSlot {
    PrivacyConsent,
    SignaturePad,
    Calculator,
    Simulation,
    ProductAnalysis,
    ProductDetail,
    EnrollmentSuccess,
}

/// Slots whose open/close is mirrored to the peer unless configured otherwise
pub const DEFAULT_MIRRORED: [ModalSlot; 4] = [
    ModalSlot::PrivacyConsent,
    ModalSlot::SignaturePad,
    ModalSlot::Calculator,
    ModalSlot::Simulation,
];

impl ModalSlot {
    pub const ALL: [ModalSlot; 7] = [
        ModalSlot::PrivacyConsent,
        ModalSlot::SignaturePad,
        ModalSlot::Calculator,
        ModalSlot::Simulation,
        ModalSlot::ProductAnalysis,
        ModalSlot::ProductDetail,
        ModalSlot::EnrollmentSuccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModalSlot::PrivacyConsent => "privacyConsent",
            ModalSlot::SignaturePad => "signaturePad",
            ModalSlot::Calculator => "calculator",
            ModalSlot::Simulation => "simulation",
            ModalSlot::ProductAnalysis => "productAnalysis",
            ModalSlot::ProductDetail => "productDetail",
            ModalSlot::EnrollmentSuccess => "enrollmentSuccess",
        }
    }

    /// Look up a slot by its wire name; unknown names yield `None`
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.as_str() == name)
    }

    /// `modal:<name>:open`
    pub fn open_event_type(&self) -> String {
        format!("modal:{}:open", self.as_str())
    }

    /// `modal:<name>:close`
    pub fn close_event_type(&self) -> String {
        format!("modal:{}:close", self.as_str())
    }
}

impl fmt::Display for ModalSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility and payload of one slot. Data survives a close.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotState {
    pub is_open: bool,
    pub data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_and_unknown_names() {
        for slot in ModalSlot::ALL {
            assert_eq!(ModalSlot::parse(slot.as_str()), Some(slot));
        }
        assert_eq!(ModalSlot::parse("hologram"), None);
        assert_eq!(ModalSlot::parse("SignaturePad"), None);
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(
            ModalSlot::PrivacyConsent.open_event_type(),
            "modal:privacyConsent:open"
        );
        assert_eq!(
            ModalSlot::EnrollmentSuccess.close_event_type(),
            "modal:enrollmentSuccess:close"
        );
    }
}
