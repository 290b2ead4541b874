//! Command Router for interactive command processing

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::channel::Role;
use crate::event::ScreenType;
use crate::modal::ModalSlot;

/// Interactive commands for either terminal
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalCommand {
    /// List catalog products and the current selection
    Catalog,
    /// Toggle a product in the comparison selection
    Toggle { product_id: String },
    /// Show the comparison of the current selection
    Compare {
        amount: Option<u64>,
        period: Option<u32>,
    },
    /// Close the comparison analysis overlay
    CloseCompare,
    /// Publish a simulation of the current selection
    Simulate {
        amount: Option<u64>,
        period: Option<u32>,
    },
    /// Show the application form for a product
    Form {
        product_id: String,
        customer_id: Option<String>,
    },
    /// Move the display to a screen
    Screen { screen: ScreenType, data: Value },
    /// Open (`Some`) or close (`None`) the product detail overlay
    Detail { product_id: Option<String> },
    OpenModal { slot: ModalSlot, data: Value },
    CloseModal { slot: ModalSlot },
    Highlight {
        element_id: String,
        highlight_type: Option<String>,
        color: Option<String>,
    },
    Reset,
    /// Submit a captured signature (display)
    Sign { signature_data: String },
    /// Answer the privacy consent form (display)
    Consent { agreed: bool },
    Status,
    Help,
    Quit,
}

const OPERATOR_HELP: &[&str] = &[
    "Operator commands:",
    "  /catalog                          - List products and current selection",
    "  /toggle <productId>               - Add/remove a product (max 3)",
    "  /compare [amount] [period]        - Show comparison on the display",
    "  /compare close                    - Close the comparison overlay",
    "  /simulate [amount] [period]       - Send a simulation of the selection",
    "  /form <productId> [customerId]    - Show the application form",
    "  /screen <type> [json]             - Move the display to a screen",
    "  /detail <productId> | close       - Open/close product detail",
    "  /modal open <slot> [json]         - Open a modal",
    "  /modal close <slot>               - Close a modal",
    "  /highlight <elementId> [type] [color] - Highlight an element",
    "  /reset                            - Return the display to welcome",
    "  /status                           - Show session status",
    "  /help                             - Show this help",
    "  /quit                             - Leave the session and exit",
];

const DISPLAY_HELP: &[&str] = &[
    "Display commands:",
    "  /sign <data>     - Submit the signature",
    "  /close <slot>    - Close a modal",
    "  /consent agree|decline - Answer the privacy consent form",
    "  /status          - Show session status",
    "  /help            - Show this help",
    "  /quit            - Leave the session and exit",
];

/// Command router for processing interactive commands
#[derive(Debug, Clone, Copy)]
pub struct CommandRouter {
    role: Role,
}

impl CommandRouter {
    /// Create a new CommandRouter for a terminal role
    pub fn new(role: Role) -> Self {
        Self { role }
    }

    pub fn help_messages(&self) -> &'static [&'static str] {
        match self.role {
            Role::Operator => OPERATOR_HELP,
            Role::Display => DISPLAY_HELP,
        }
    }

    /// Parse interactive command from string input
    pub fn parse_interactive_command(&self, input: &str) -> Result<Option<TerminalCommand>> {
        let input = input.trim();

        if input.is_empty() {
            return Ok(None);
        }

        let parts: Vec<&str> = input.split_whitespace().collect();

        match (parts[0], self.role) {
            ("/status", _) => Ok(Some(TerminalCommand::Status)),
            ("/help" | "?", _) => Ok(Some(TerminalCommand::Help)),
            ("/quit" | "/exit" | "/q", _) => Ok(Some(TerminalCommand::Quit)),
            (_, Role::Operator) => self.parse_operator(input, &parts),
            (_, Role::Display) => Self::parse_display(input, &parts),
        }
    }

    fn parse_operator(&self, input: &str, parts: &[&str]) -> Result<Option<TerminalCommand>> {
        match parts[0] {
            "/catalog" | "/list" => Ok(Some(TerminalCommand::Catalog)),
            "/toggle" => {
                let product_id = arg(parts, 1, "Usage: /toggle <productId>")?;
                Ok(Some(TerminalCommand::Toggle { product_id }))
            }
            "/compare" if parts.get(1) == Some(&"close") => Ok(Some(TerminalCommand::CloseCompare)),
            "/compare" => Ok(Some(TerminalCommand::Compare {
                amount: optional_number(parts, 1, "amount")?,
                period: optional_number(parts, 2, "period")?,
            })),
            "/simulate" => Ok(Some(TerminalCommand::Simulate {
                amount: optional_number(parts, 1, "amount")?,
                period: optional_number(parts, 2, "period")?,
            })),
            "/form" => {
                let product_id = arg(parts, 1, "Usage: /form <productId> [customerId]")?;
                Ok(Some(TerminalCommand::Form {
                    product_id,
                    customer_id: parts.get(2).map(|s| s.to_string()),
                }))
            }
            "/screen" => {
                let name = arg(parts, 1, "Usage: /screen <type> [json]")?;
                let screen = ScreenType::from_wire(&name)
                    .ok_or_else(|| anyhow!("Unknown screen type: {}", name))?;
                let data = json_tail(input, 2)?;
                Ok(Some(TerminalCommand::Screen { screen, data }))
            }
            "/detail" => {
                let target = arg(parts, 1, "Usage: /detail <productId> | close")?;
                let product_id = (target != "close").then_some(target);
                Ok(Some(TerminalCommand::Detail { product_id }))
            }
            "/modal" => {
                let usage = "Usage: /modal open <slot> [json] | /modal close <slot>";
                let action = arg(parts, 1, usage)?;
                let slot = slot_arg(parts, 2, usage)?;
                match action.as_str() {
                    "open" => Ok(Some(TerminalCommand::OpenModal {
                        slot,
                        data: json_tail(input, 3)?,
                    })),
                    "close" => Ok(Some(TerminalCommand::CloseModal { slot })),
                    _ => Err(anyhow!(usage)),
                }
            }
            "/highlight" => {
                let element_id = arg(parts, 1, "Usage: /highlight <elementId> [type] [color]")?;
                Ok(Some(TerminalCommand::Highlight {
                    element_id,
                    highlight_type: parts.get(2).map(|s| s.to_string()),
                    color: parts.get(3).map(|s| s.to_string()),
                }))
            }
            "/reset" => Ok(Some(TerminalCommand::Reset)),
            _ => Err(anyhow!(
                "Unknown command: {}. Type '/help' for available commands.",
                parts[0]
            )),
        }
    }

    fn parse_display(input: &str, parts: &[&str]) -> Result<Option<TerminalCommand>> {
        match parts[0] {
            "/sign" => {
                let signature_data = input["/sign".len()..].trim().to_string();
                if signature_data.is_empty() {
                    return Err(anyhow!("Usage: /sign <data>"));
                }
                Ok(Some(TerminalCommand::Sign { signature_data }))
            }
            "/close" => {
                let slot = slot_arg(parts, 1, "Usage: /close <slot>")?;
                Ok(Some(TerminalCommand::CloseModal { slot }))
            }
            "/consent" => match parts.get(1).copied() {
                Some("agree") => Ok(Some(TerminalCommand::Consent { agreed: true })),
                Some("decline") => Ok(Some(TerminalCommand::Consent { agreed: false })),
                _ => Err(anyhow!("Usage: /consent agree|decline")),
            },
            _ => Err(anyhow!(
                "Unknown command: {}. Type '/help' for available commands.",
                parts[0]
            )),
        }
    }
}

fn arg(parts: &[&str], index: usize, usage: &str) -> Result<String> {
    parts
        .get(index)
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("{}", usage))
}

fn slot_arg(parts: &[&str], index: usize, usage: &str) -> Result<ModalSlot> {
    let name = arg(parts, index, usage)?;
    ModalSlot::parse(&name).ok_or_else(|| anyhow!("Unknown modal slot: {}", name))
}

fn optional_number<T: std::str::FromStr>(parts: &[&str], index: usize, name: &str) -> Result<Option<T>> {
    match parts.get(index) {
        Some(raw) => raw
            .replace([',', '_'], "")
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow!("Invalid {}: {}", name, raw)),
        None => Ok(None),
    }
}

/// JSON object starting at the given word, or `null` when absent
fn json_tail(input: &str, skip_words: usize) -> Result<Value> {
    let tail = input
        .splitn(skip_words + 1, char::is_whitespace)
        .nth(skip_words)
        .map(str::trim)
        .unwrap_or_default();

    if tail.is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(tail).map_err(|e| anyhow!("Invalid JSON payload: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_commands() {
        let router = CommandRouter::new(Role::Operator);

        assert_eq!(
            router.parse_interactive_command("/toggle P001").unwrap(),
            Some(TerminalCommand::Toggle {
                product_id: "P001".to_string()
            })
        );
        assert_eq!(
            router.parse_interactive_command("/compare 1,000,000 12").unwrap(),
            Some(TerminalCommand::Compare {
                amount: Some(1_000_000),
                period: Some(12)
            })
        );
        assert_eq!(
            router.parse_interactive_command("/compare close").unwrap(),
            Some(TerminalCommand::CloseCompare)
        );
        assert_eq!(
            router
                .parse_interactive_command(r#"/modal open calculator {"principal": 500}"#)
                .unwrap(),
            Some(TerminalCommand::OpenModal {
                slot: ModalSlot::Calculator,
                data: json!({"principal": 500})
            })
        );
        assert_eq!(
            router.parse_interactive_command("/detail close").unwrap(),
            Some(TerminalCommand::Detail { product_id: None })
        );
        assert_eq!(
            router.parse_interactive_command("/screen application-form").unwrap(),
            Some(TerminalCommand::Screen {
                screen: ScreenType::ApplicationForm,
                data: Value::Null
            })
        );
        assert_eq!(router.parse_interactive_command("   ").unwrap(), None);
    }

    #[test]
    fn test_invalid_operator_input() {
        let router = CommandRouter::new(Role::Operator);

        assert!(router.parse_interactive_command("/toggle").is_err());
        assert!(router.parse_interactive_command("/modal open hologram").is_err());
        assert!(router.parse_interactive_command("/compare lots").is_err());
        assert!(router.parse_interactive_command("/screen lobby").is_err());
        assert!(router.parse_interactive_command("/sign abc").is_err());
    }

    #[test]
    fn test_display_commands() {
        let router = CommandRouter::new(Role::Display);

        assert_eq!(
            router
                .parse_interactive_command("/sign data:image/png;base64,AAAA")
                .unwrap(),
            Some(TerminalCommand::Sign {
                signature_data: "data:image/png;base64,AAAA".to_string()
            })
        );
        assert_eq!(
            router.parse_interactive_command("/close signaturePad").unwrap(),
            Some(TerminalCommand::CloseModal {
                slot: ModalSlot::SignaturePad
            })
        );
        assert_eq!(
            router.parse_interactive_command("/consent decline").unwrap(),
            Some(TerminalCommand::Consent { agreed: false })
        );
        assert!(router.parse_interactive_command("/consent maybe").is_err());
        assert_eq!(
            router.parse_interactive_command("/quit").unwrap(),
            Some(TerminalCommand::Quit)
        );
        assert!(router.parse_interactive_command("/toggle P001").is_err());
    }
}
