//! Operator and display kept in step over an in-process hub

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use consultsync::channel::{Inbound, LocalHub, Role};
use consultsync::display::{DisplayRenderer, ScreenPayload};
use consultsync::event::{ScreenType, SyncEvent};
use consultsync::modal::ModalSlot;
use consultsync::operator::{OperatorController, sample_catalog};
use consultsync::session::{ConnectionState, SessionError, SessionLifecycle};

const QUIET: Duration = Duration::from_millis(150);

fn lifecycle(hub: &LocalHub, role: Role) -> SessionLifecycle {
    SessionLifecycle::new(
        Arc::new(hub.clone()),
        role,
        role.as_wire(),
        Duration::from_secs(2),
    )
}

/// Apply inbound events to the display until the channel goes quiet
async fn settle(display: &mut DisplayRenderer, inbound: &mut mpsc::UnboundedReceiver<Inbound>) -> usize {
    let mut applied = 0;
    while let Ok(Some(message)) = timeout(QUIET, inbound.recv()).await {
        if let Inbound::Event(event) = message {
            display.handle_event(&event);
            applied += 1;
        }
    }
    applied
}

#[tokio::test]
async fn test_comparison_reaches_display() -> Result<()> {
    let hub = LocalHub::start();
    let mut operator_link = lifecycle(&hub, Role::Operator);
    let mut display_link = lifecycle(&hub, Role::Display);

    let link = operator_link.join_session("S-100").await?;
    let mut operator = OperatorController::new(sample_catalog());
    operator.attach(link.publisher);

    let link = display_link.join_session("S-100").await?;
    let mut display = DisplayRenderer::new("S-100");
    display.attach(link.publisher);
    let mut inbound = link.inbound;

    operator.toggle("P001")?;
    operator.toggle("P002")?;
    let sent = operator.show_comparison(Some(5_000_000), Some(24), None)?;
    settle(&mut display, &mut inbound).await;

    assert_eq!(display.screen().screen, ScreenType::ProductComparison);
    match &display.screen().payload {
        ScreenPayload::Comparison(view) => {
            let ids: Vec<&str> = view.selected_products.iter().map(|p| p.id.as_str()).collect();
            assert_eq!(ids, vec!["P001", "P002"]);
            assert_eq!(view.simulation_amount, sent.simulation_amount);
            assert_eq!(view.simulation_period, 24);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
    assert!(display.modals().is_open(ModalSlot::ProductAnalysis));
    Ok(())
}

#[tokio::test]
async fn test_publish_before_display_joins_is_not_replayed() -> Result<()> {
    let hub = LocalHub::start();
    let mut operator_link = lifecycle(&hub, Role::Operator);
    let mut display_link = lifecycle(&hub, Role::Display);

    let link = operator_link.join_session("S-200").await?;
    let mut operator = OperatorController::new(sample_catalog());
    operator.attach(link.publisher);

    operator.navigate(ScreenType::SimulationResult, serde_json::json!({ "amount": 1 }))?;

    let link = display_link.join_session("S-200").await?;
    let mut display = DisplayRenderer::new("S-200");
    let mut inbound = link.inbound;

    assert_eq!(settle(&mut display, &mut inbound).await, 0);
    assert_eq!(display.screen().screen, ScreenType::Welcome);
    Ok(())
}

#[tokio::test]
async fn test_display_cannot_join_unknown_session() {
    let hub = LocalHub::start();
    let mut display_link = lifecycle(&hub, Role::Display);

    let result = display_link.join_session("missing").await;

    assert!(matches!(result, Err(SessionError::SessionNotFound(id)) if id == "missing"));
    assert_eq!(display_link.state(), ConnectionState::Waiting);
}

#[tokio::test]
async fn test_customer_close_is_mirrored_without_echo() -> Result<()> {
    let hub = LocalHub::start();
    let mut operator_link = lifecycle(&hub, Role::Operator);
    let mut display_link = lifecycle(&hub, Role::Display);

    let link = operator_link.join_session("S-300").await?;
    let mut operator = OperatorController::new(sample_catalog());
    operator.attach(link.publisher);
    let mut operator_inbound = link.inbound;

    let link = display_link.join_session("S-300").await?;
    let mut display = DisplayRenderer::new("S-300");
    display.attach(link.publisher);
    let mut display_inbound = link.inbound;

    operator.open_modal(ModalSlot::Calculator, serde_json::json!({ "principal": 1_000_000 }));
    settle(&mut display, &mut display_inbound).await;
    assert!(display.modals().is_open(ModalSlot::Calculator));

    display.close_modal(ModalSlot::Calculator);

    let event = match timeout(Duration::from_secs(1), operator_inbound.recv()).await? {
        Some(Inbound::Event(event)) => event,
        other => panic!("expected close event, got {:?}", other),
    };
    assert_eq!(event.event_type, "modal:calculator:close");
    assert!(operator.on_remote_event(&event));
    assert!(!operator.modals().is_open(ModalSlot::Calculator));

    // The display never hears its own close back
    assert_eq!(settle(&mut display, &mut display_inbound).await, 0);
    Ok(())
}

#[tokio::test]
async fn test_leave_is_idempotent() -> Result<()> {
    let hub = LocalHub::start();
    let mut operator_link = lifecycle(&hub, Role::Operator);

    operator_link.join_session("S-400").await?;
    operator_link.leave_session();
    operator_link.leave_session();

    assert_eq!(operator_link.state(), ConnectionState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn test_signature_flow_after_application_form() -> Result<()> {
    let hub = LocalHub::start();
    let mut operator_link = lifecycle(&hub, Role::Operator);
    let mut display_link = lifecycle(&hub, Role::Display);

    let link = operator_link.join_session("S-500").await?;
    let mut operator = OperatorController::new(sample_catalog());
    operator.attach(link.publisher);

    let link = display_link.join_session("S-500").await?;
    let mut display = DisplayRenderer::new("S-500");
    display.attach(link.publisher);
    let mut inbound = link.inbound;

    operator.show_application_form("P003", Some("C-9".to_string()))?;
    settle(&mut display, &mut inbound).await;

    assert_eq!(display.screen().screen, ScreenType::ApplicationForm);
    assert!(display.modals().is_open(ModalSlot::SignaturePad));

    let submission = display.prepare_signature("sig")?;
    assert_eq!(submission.customer_id.as_deref(), Some("C-9"));
    assert_eq!(submission.product_id.as_deref(), Some("P003"));
    assert_eq!(submission.session_id, "S-500");
    Ok(())
}

#[tokio::test]
async fn test_consent_answer_reaches_operator() -> Result<()> {
    let hub = LocalHub::start();
    let mut operator_link = lifecycle(&hub, Role::Operator);
    let mut display_link = lifecycle(&hub, Role::Display);

    let link = operator_link.join_session("S-600").await?;
    let mut operator = OperatorController::new(sample_catalog());
    operator.attach(link.publisher);
    let mut operator_inbound = link.inbound;

    let link = display_link.join_session("S-600").await?;
    let mut display = DisplayRenderer::new("S-600");
    display.attach(link.publisher);
    let mut display_inbound = link.inbound;

    operator.open_modal(ModalSlot::PrivacyConsent, serde_json::json!({ "title": "동의서" }));
    settle(&mut display, &mut display_inbound).await;
    assert!(display.modals().is_open(ModalSlot::PrivacyConsent));

    let response = display.respond_to_consent(true)?;
    assert!(response.consent_given);
    assert!(!display.modals().is_open(ModalSlot::PrivacyConsent));

    let event = match timeout(Duration::from_secs(1), operator_inbound.recv()).await? {
        Some(Inbound::Event(event)) => event,
        other => panic!("expected consent answer, got {:?}", other),
    };
    assert_eq!(event.event_type, "privacy-consent");
    assert_eq!(event.data["consentGiven"], true);

    assert!(operator.on_remote_event(&event));
    assert_eq!(operator.consent(), Some(true));
    assert!(!operator.modals().is_open(ModalSlot::PrivacyConsent));

    // Exactly one event crossed: no separate close mirror followed the answer
    assert!(timeout(QUIET, operator_inbound.recv()).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_comparison_without_amounts_uses_display_defaults() -> Result<()> {
    let hub = LocalHub::start();
    let mut operator_link = lifecycle(&hub, Role::Operator);
    let mut display_link = lifecycle(&hub, Role::Display);

    let link = operator_link.join_session("S-700").await?;
    let publisher = link.publisher;

    let link = display_link.join_session("S-700").await?;
    let mut display = DisplayRenderer::new("S-700").with_simulation_defaults(2_000_000, 24);
    let mut inbound = link.inbound;

    publisher.publish(SyncEvent::new(
        "show-comparison",
        serde_json::json!({ "selectedProducts": [{ "id": "P001" }, { "id": "P002" }] }),
    ))?;
    settle(&mut display, &mut inbound).await;

    match &display.screen().payload {
        ScreenPayload::Comparison(view) => {
            assert_eq!(view.simulation_amount, 2_000_000);
            assert_eq!(view.simulation_period, 24);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
    Ok(())
}
