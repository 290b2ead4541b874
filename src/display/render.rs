//! Text rendering of the display view

use serde_json::Value;

use super::screen::ScreenPayload;
use super::DisplayView;
use crate::event::{ProductSummary, ScreenType};

/// Render a view as terminal lines. Pure: the same view always yields the same lines.
pub fn render(view: &DisplayView) -> Vec<String> {
    let mut lines = Vec::new();

    let status = if view.connected {
        "connected"
    } else {
        "waiting for consultant..."
    };
    lines.push(format!("[session {}] {}", view.session_id, status));
    lines.push(format!("== {} ==", screen_title(view.screen.screen)));

    match &view.screen.payload {
        ScreenPayload::None => {
            if view.screen.screen == ScreenType::Welcome {
                lines.push("Welcome. Your consultant will guide you shortly.".to_string());
            }
        }
        ScreenPayload::ProductList(products) => {
            lines.push(format!("Comparing {} product(s)", products.len()));
            lines.extend(products.iter().map(product_line));
        }
        ScreenPayload::Comparison(view) => {
            lines.extend(view.selected_products.iter().map(product_line));
            lines.push(format!(
                "Simulation: {} KRW over {} months",
                view.simulation_amount, view.simulation_period
            ));
        }
        ScreenPayload::Simulation(simulation) => {
            if !simulation.title.is_empty() {
                lines.push(simulation.title.clone());
            }
            if !simulation.results.is_null() {
                lines.push(format!("Results: {}", compact(&simulation.results)));
            }
            if !simulation.preferential_rates.is_null() {
                lines.push(format!(
                    "Preferential rates: {}",
                    compact(&simulation.preferential_rates)
                ));
            }
        }
        ScreenPayload::ApplicationForm(form) => {
            lines.push(format!("Application for {}", form.product.display_name()));
        }
        ScreenPayload::Generic(data) => {
            if !data.is_null() {
                lines.push(compact(data));
            }
        }
        ScreenPayload::Completion { product_id } => {
            lines.push("Enrollment complete. Thank you!".to_string());
            if let Some(product_id) = product_id {
                lines.push(format!("Product: {}", product_id));
            }
        }
    }

    for highlight in &view.highlights {
        lines.push(format!(
            "  * {} ({}, {})",
            highlight.element_id, highlight.highlight_type, highlight.color
        ));
    }

    for (slot, state) in &view.open_modals {
        match &state.data {
            Some(data) => lines.push(format!("[modal {}] {}", slot, compact(data))),
            None => lines.push(format!("[modal {}]", slot)),
        }
    }

    if view.submitting {
        lines.push("Submitting signature...".to_string());
    }

    if let Some(notice) = &view.notice {
        let marker = if notice.blocking { "!!" } else { "--" };
        lines.push(format!("{} {}", marker, notice.message));
    }

    lines
}

fn screen_title(screen: ScreenType) -> &'static str {
    match screen {
        ScreenType::Welcome => "Welcome",
        ScreenType::ProductComparison => "Product comparison",
        ScreenType::SimulationResult => "Simulation result",
        ScreenType::ApplicationForm => "Application form",
        ScreenType::Completion => "Completion",
    }
}

fn product_line(product: &ProductSummary) -> String {
    match product.base_rate {
        Some(rate) => format!("  - {} ({:.2}%)", product.display_name(), rate),
        None => format!("  - {}", product.display_name()),
    }
}

fn compact(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() > 120 {
        let head: String = text.chars().take(117).collect();
        format!("{}...", head)
    } else {
        text
    }
}
