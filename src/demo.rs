//! Scripted consultation
//!
//! Runs an operator and a display against an in-process hub and prints what
//! the customer would see after each step. Nothing leaves the process: the
//! signature is accepted locally and the completion record is only printed.

use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::channel::{Inbound, LocalHub, Role};
use crate::config::Config;
use crate::display::{DisplayRenderer, Effect, SubmissionReceipt, render};
use crate::modal::ModalSlot;
use crate::operator::{OperatorController, sample_catalog};
use crate::session::SessionLifecycle;

const SETTLE: Duration = Duration::from_millis(200);

/// Display side of the demo with its inbound queue
struct DemoDisplay {
    renderer: DisplayRenderer,
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

impl DemoDisplay {
    /// Apply everything the operator has published so far
    async fn settle(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();

        while let Ok(Some(inbound)) = tokio::time::timeout(SETTLE, self.inbound.recv()).await {
            if let Inbound::Event(event) = inbound {
                debug!("Display received {}", event.event_type);
                effects.extend(self.renderer.handle_event(&event));
            }
        }
        effects
    }

    fn show(&self) {
        for line in render(&self.renderer.view()) {
            println!("    {}", line);
        }
    }
}

fn step(number: usize, title: &str) {
    println!();
    println!("{} {}", format!("[{}]", number).cyan().bold(), title.bold());
}

fn print_effects(effects: &[Effect]) {
    for effect in effects {
        match effect {
            Effect::ShowSignatureCapture => println!("    {} signature capture shown", "✎".cyan()),
            Effect::RecordCompletion(record) => println!(
                "    {} completion recorded for product {}",
                "✓".green(),
                record.product_id.as_deref().unwrap_or("-")
            ),
        }
    }
}

/// Run the scripted consultation
pub async fn run_demo(config: &Config) -> Result<()> {
    let channel = Arc::new(LocalHub::start());
    let session_id = format!("DEMO-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
    info!("Starting demo session {}", session_id);

    println!("{}", "consultsync demo".bold());
    println!("Session {}", session_id.bold());

    let mut operator_link =
        SessionLifecycle::new(channel.clone(), Role::Operator, "employee", config.channel.join_timeout());
    let mut display_link =
        SessionLifecycle::new(channel, Role::Display, "customer", config.channel.join_timeout());

    let mut operator = OperatorController::with_mirrored(sample_catalog(), config.mirrored_slots())
        .with_simulation_defaults(
            config.simulation.default_amount,
            config.simulation.default_period,
        );
    let link = operator_link.join_session(&session_id).await?;
    operator.attach(link.publisher);
    let mut operator_inbound = link.inbound;

    let link = display_link.join_session(&session_id).await?;
    let mut renderer = DisplayRenderer::with_mirrored(session_id.clone(), config.mirrored_slots())
        .with_simulation_defaults(
            config.simulation.default_amount,
            config.simulation.default_period,
        )
        .with_customer_id("C-1001");
    renderer.attach(link.publisher);
    renderer.set_connected(true);
    let mut display = DemoDisplay {
        renderer,
        inbound: link.inbound,
    };

    step(1, "Customer display joins");
    display.show();

    step(2, "Operator asks for privacy consent");
    operator.open_modal(
        ModalSlot::PrivacyConsent,
        serde_json::json!({ "title": "개인정보 수집·이용 동의" }),
    );
    display.settle().await;
    display.show();

    step(3, "Customer agrees to the consent form");
    display.renderer.respond_to_consent(true)?;
    while let Ok(Some(Inbound::Event(event))) =
        tokio::time::timeout(SETTLE, operator_inbound.recv()).await
    {
        operator.on_remote_event(&event);
    }
    println!(
        "    operator sees consent {:?}, form open: {}",
        operator.consent(),
        operator.modals().is_open(ModalSlot::PrivacyConsent)
    );
    display.show();

    step(4, "Operator selects two products and shows the comparison");
    operator.toggle("P001")?;
    operator.toggle("P003")?;
    operator.show_comparison(None, None, None)?;
    display.settle().await;
    display.show();

    step(5, "Operator sends a simulation and highlights the rate");
    operator.simulate_selection(None, None)?;
    operator.highlight("rate-P001", None, None)?;
    display.settle().await;
    display.show();

    step(6, "Operator opens the application form");
    operator.show_application_form("P001", Some("C-1001".to_string()))?;
    let effects = display.settle().await;
    print_effects(&effects);
    display.show();

    step(7, "Customer signs");
    let submission = display.renderer.prepare_signature("demo-signature")?;
    let effects = display
        .renderer
        .apply_submission_result(&submission, Ok(SubmissionReceipt::default()));
    print_effects(&effects);
    display.show();

    step(8, "Operator returns the display to the welcome screen");
    operator.reset_display()?;
    display.settle().await;
    display.show();

    operator_link.leave_session();
    display_link.leave_session();
    println!();
    println!("{} demo finished", "✓".green());
    Ok(())
}
