//! Terminal runtime: one event loop per operator console or customer display

use anyhow::Result;
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::channel::{Inbound, Publisher, Role, SessionChannel};
use crate::config::{ChannelConfig, Config};
use crate::display::{DisplayRenderer, Effect, SubmissionClient, render};
use crate::event::message::PRIVACY_CONSENT;
use crate::event::{ProductSummary, SyncEvent};
use crate::metrics::SyncStats;
use crate::operator::{OperatorController, ToggleOutcome};

use super::action_channel::{ActionChannel, TerminalEvent};
use super::command_router::{CommandRouter, TerminalCommand};
use super::lifecycle::SessionLifecycle;

/// Runtime state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Starting,
    Running,
    Terminated,
}

/// Exponential rejoin schedule with a bounded number of attempts
pub struct ReconnectPolicy {
    backoff: ExponentialBackoff,
    attempts: u32,
    max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(initial: Duration, max_interval: Duration, max_attempts: u32) -> Self {
        let backoff = ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            max_interval,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        Self {
            backoff,
            attempts: 0,
            max_attempts,
        }
    }

    pub fn from_config(config: &ChannelConfig) -> Self {
        Self::new(
            Duration::from_millis(config.reconnect_interval_ms),
            Duration::from_millis(config.max_reconnect_interval_ms),
            config.max_reconnect_attempts,
        )
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        self.backoff.next_backoff()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
    }
}

/// The state machine a terminal drives
#[derive(Debug)]
pub enum Terminal {
    Operator(OperatorController),
    Display(DisplayRenderer),
}

impl Terminal {
    fn role(&self) -> Role {
        match self {
            Terminal::Operator(_) => Role::Operator,
            Terminal::Display(_) => Role::Display,
        }
    }

    fn attach(&mut self, publisher: Publisher) {
        match self {
            Terminal::Operator(operator) => operator.attach(publisher),
            Terminal::Display(display) => {
                display.attach(publisher);
                display.set_connected(true);
            }
        }
    }

    fn detach(&mut self) {
        match self {
            Terminal::Operator(operator) => operator.detach(),
            Terminal::Display(display) => {
                display.detach();
                display.set_connected(false);
            }
        }
    }
}

/// Interactive terminal bound to one session
pub struct TerminalRuntime {
    session_id: String,
    state: RuntimeState,
    terminal: Terminal,
    lifecycle: SessionLifecycle,
    router: CommandRouter,
    action_channel: ActionChannel,
    submission_client: SubmissionClient,
    stats: SyncStats,
    inbound: Option<mpsc::UnboundedReceiver<Inbound>>,
    reconnect: ReconnectPolicy,
    reconnect_at: Option<Instant>,
}

impl TerminalRuntime {
    /// Operator console for a session it opens
    pub fn operator(
        config: &Config,
        channel: Arc<dyn SessionChannel>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        catalog: Vec<ProductSummary>,
    ) -> Self {
        let operator = OperatorController::with_mirrored(catalog, config.mirrored_slots())
            .with_simulation_defaults(
                config.simulation.default_amount,
                config.simulation.default_period,
            );
        Self::build(
            config,
            channel,
            session_id.into(),
            user_id.into(),
            Terminal::Operator(operator),
            SyncStats::new(),
        )
    }

    /// Customer display joining an existing session
    pub fn display(
        config: &Config,
        channel: Arc<dyn SessionChannel>,
        session_id: impl Into<String>,
        customer_id: Option<String>,
    ) -> Self {
        let session_id = session_id.into();
        let stats = SyncStats::new();
        let mut display = DisplayRenderer::with_mirrored(session_id.clone(), config.mirrored_slots())
            .with_simulation_defaults(
                config.simulation.default_amount,
                config.simulation.default_period,
            )
            .with_stats(stats.clone());
        if let Some(customer_id) = customer_id {
            display = display.with_customer_id(customer_id);
        }

        Self::build(
            config,
            channel,
            session_id,
            "customer".to_string(),
            Terminal::Display(display),
            stats,
        )
    }

    fn build(
        config: &Config,
        channel: Arc<dyn SessionChannel>,
        session_id: String,
        user_id: String,
        terminal: Terminal,
        stats: SyncStats,
    ) -> Self {
        let role = terminal.role();
        let lifecycle = SessionLifecycle::new(channel, role, user_id, config.channel.join_timeout())
            .with_stats(stats.clone());
        let submission_client = SubmissionClient::new(&config.api.base_url, config.api.timeout())
            .with_paths(&config.api.signature_path, &config.api.completion_path);

        Self {
            session_id,
            state: RuntimeState::Starting,
            terminal,
            lifecycle,
            router: CommandRouter::new(role),
            action_channel: ActionChannel::new(),
            submission_client,
            stats,
            inbound: None,
            reconnect: ReconnectPolicy::from_config(&config.channel),
            reconnect_at: None,
        }
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    /// Run until `/quit`, end of input, or Ctrl-C
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "Starting {} terminal for session {}",
            self.terminal.role(),
            self.session_id
        );
        self.print_banner();
        self.spawn_input_reader();

        self.connect().await;
        self.state = RuntimeState::Running;

        while self.state != RuntimeState::Terminated {
            let reconnect_at = self.reconnect_at;

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl-C");
                    self.state = RuntimeState::Terminated;
                }

                Some(event) = self.action_channel.next_event() => {
                    self.handle_event(event);
                }

                inbound = next_inbound(&mut self.inbound) => {
                    self.handle_inbound(inbound);
                }

                _ = sleep_until(reconnect_at) => {
                    self.reconnect_at = None;
                    info!(
                        "Rejoining session {} (attempt {})",
                        self.session_id,
                        self.reconnect.attempts()
                    );
                    self.connect().await;
                }
            }
        }

        self.lifecycle.leave_session();
        info!("Terminal loop terminated");
        Ok(())
    }

    fn spawn_input_reader(&self) {
        let router = self.router;
        let action_channel = self.action_channel.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let event = match router.parse_interactive_command(&line) {
                            Ok(Some(command)) => TerminalEvent::UserCommand { command },
                            Ok(None) => continue,
                            Err(e) => TerminalEvent::InputError {
                                message: e.to_string(),
                            },
                        };
                        if action_channel.send_event(event).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("Input closed");
                        let _ = action_channel.request_shutdown();
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read input: {}", e);
                        let _ = action_channel.request_shutdown();
                        break;
                    }
                }
            }
        });
    }

    async fn connect(&mut self) {
        match self.lifecycle.join_session(&self.session_id).await {
            Ok(link) => {
                self.reconnect.reset();
                self.inbound = Some(link.inbound);
                self.terminal.attach(link.publisher);
                println!(
                    "{} joined session {}",
                    "●".green(),
                    self.session_id.bold()
                );
                self.redraw();
            }
            Err(e) => {
                warn!("Join failed: {}", e);
                println!("{} {} (waiting)", "○".yellow(), e);
                self.schedule_reconnect();
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        match self.reconnect.next_delay() {
            Some(delay) => {
                debug!("Next join attempt in {:?}", delay);
                self.reconnect_at = Some(Instant::now() + delay);
            }
            None => {
                error!(
                    "Giving up on session {} after {} attempts",
                    self.session_id,
                    self.reconnect.attempts()
                );
                println!(
                    "{} not connected; restart the terminal to retry",
                    "✗".red()
                );
            }
        }
    }

    fn handle_inbound(&mut self, inbound: Option<Inbound>) {
        match inbound {
            Some(Inbound::Event(event)) => self.handle_sync_event(event),
            Some(Inbound::Joined(ack)) => {
                debug!("Ignoring repeated join ack for {}", ack.session_id);
            }
            Some(Inbound::Closed) | None => {
                warn!("Connection to session {} lost", self.session_id);
                println!("{} connection lost, rejoining...", "○".yellow());
                self.inbound = None;
                self.lifecycle.mark_disconnected();
                self.terminal.detach();
                self.redraw();
                self.schedule_reconnect();
            }
        }
    }

    fn handle_sync_event(&mut self, event: SyncEvent) {
        match &mut self.terminal {
            Terminal::Operator(operator) => {
                self.stats.record_received();
                if operator.on_remote_event(&event) {
                    println!("{} display: {}", "←".cyan(), event.event_type);
                    if event.event_type == PRIVACY_CONSENT {
                        match operator.consent() {
                            Some(true) => println!("{} customer agreed to data use", "✓".green()),
                            Some(false) => println!("{} customer declined data use", "✗".yellow()),
                            None => {}
                        }
                    }
                }
            }
            Terminal::Display(display) => {
                let effects = display.handle_event(&event);
                self.run_effects(effects);
                self.redraw();
            }
        }
    }

    fn handle_event(&mut self, event: TerminalEvent) {
        match event {
            TerminalEvent::UserCommand { command } => self.handle_command(command),
            TerminalEvent::InputError { message } => println!("{} {}", "✗".red(), message),
            TerminalEvent::SubmissionFinished { submission, result } => {
                if let Terminal::Display(display) = &mut self.terminal {
                    let effects = display.apply_submission_result(&submission, result);
                    self.run_effects(effects);
                    self.redraw();
                }
            }
            TerminalEvent::ShutdownRequested => {
                info!("Shutdown requested");
                self.state = RuntimeState::Terminated;
            }
        }
    }

    fn handle_command(&mut self, command: TerminalCommand) {
        debug!("Handling command: {:?}", command);

        match command {
            TerminalCommand::Status => self.print_status(),
            TerminalCommand::Help => {
                for line in self.router.help_messages() {
                    println!("{}", line);
                }
            }
            TerminalCommand::Quit => {
                info!("User requested quit");
                self.state = RuntimeState::Terminated;
            }
            command => match &mut self.terminal {
                Terminal::Operator(operator) => {
                    if let Err(e) = run_operator_command(operator, command) {
                        println!("{} {}", "✗".red(), e);
                    }
                }
                Terminal::Display(display) => match command {
                    TerminalCommand::Sign { signature_data } => {
                        match display.prepare_signature(&signature_data) {
                            Ok(submission) => {
                                let client = self.submission_client.clone();
                                let action_channel = self.action_channel.clone();
                                tokio::spawn(async move {
                                    let result = client.submit_signature(&submission).await;
                                    let _ = action_channel.send_event(
                                        TerminalEvent::SubmissionFinished { submission, result },
                                    );
                                });
                                self.redraw();
                            }
                            Err(e) => println!("{} {}", "✗".red(), e),
                        }
                    }
                    TerminalCommand::CloseModal { slot } => {
                        display.close_modal(slot);
                        self.redraw();
                    }
                    TerminalCommand::Consent { agreed } => {
                        match display.respond_to_consent(agreed) {
                            Ok(_) => self.redraw(),
                            Err(e) => println!("{} {}", "✗".red(), e),
                        }
                    }
                    other => debug!("Ignoring operator command on display: {:?}", other),
                },
            },
        }
    }

    fn run_effects(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ShowSignatureCapture => {
                    println!("{} please sign: /sign <data>", "✎".cyan());
                }
                Effect::RecordCompletion(record) => {
                    let client = self.submission_client.clone();
                    tokio::spawn(async move {
                        if let Err(e) = client.record_completion(&record).await {
                            warn!("Completion record not written: {}", e);
                        }
                    });
                }
            }
        }
    }

    fn redraw(&self) {
        if let Terminal::Display(display) = &self.terminal {
            println!();
            for line in render(&display.view()) {
                println!("{}", line);
            }
        }
    }

    fn print_banner(&self) {
        let title = match self.terminal.role() {
            Role::Operator => "Consultation console",
            Role::Display => "Customer display",
        };
        println!("{} - session {}", title.bold(), self.session_id.bold());
        println!("Type /help for commands.");
    }

    fn print_status(&self) {
        let stats = self.stats.snapshot();
        println!("{}", "Session status".bold());
        println!("  Version:      {}", env!("CARGO_PKG_VERSION"));
        println!("  Role:         {}", self.terminal.role());
        println!("  Session:      {}", self.session_id);
        println!("  Connection:   {:?}", self.lifecycle.state());
        println!(
            "  Events:       {} published, {} received, {} malformed, {} failed",
            stats.events_published,
            stats.events_received,
            stats.events_malformed,
            stats.publish_failures
        );

        match &self.terminal {
            Terminal::Operator(operator) => {
                println!("  Selection:    {:?}", operator.selection().ids());
                println!("  Open modals:  {:?}", operator.modals().open_slots());
                println!("  Consent:      {:?}", operator.consent());
            }
            Terminal::Display(display) => {
                println!("  Screen:       {}", display.screen().screen);
                println!("  Open modals:  {:?}", display.modals().open_slots());
            }
        }
    }
}

fn run_operator_command(
    operator: &mut OperatorController,
    command: TerminalCommand,
) -> Result<()> {
    match command {
        TerminalCommand::Catalog => {
            for product in operator.catalog() {
                let marker = if operator.selection().contains(&product.id) {
                    "[x]".green()
                } else {
                    "[ ]".normal()
                };
                println!(
                    "  {} {} {} ({:.2}%)",
                    marker,
                    product.id,
                    product.display_name(),
                    product.base_rate.unwrap_or_default()
                );
            }
        }
        TerminalCommand::Toggle { product_id } => match operator.toggle(&product_id)? {
            ToggleOutcome::Added => println!(
                "{} added {} ({} selected)",
                "+".green(),
                product_id,
                operator.selection().len()
            ),
            ToggleOutcome::Removed => println!(
                "{} removed {} ({} selected)",
                "-".yellow(),
                product_id,
                operator.selection().len()
            ),
            ToggleOutcome::Full => println!(
                "{} selection full, {} not added",
                "!".yellow(),
                product_id
            ),
        },
        TerminalCommand::Compare { amount, period } => {
            let view = operator.show_comparison(amount, period, None)?;
            println!(
                "{} comparison of {} products sent",
                "→".cyan(),
                view.selected_products.len()
            );
        }
        TerminalCommand::CloseCompare => operator.close_product_analysis()?,
        TerminalCommand::Simulate { amount, period } => {
            let view = operator.simulate_selection(amount, period)?;
            println!("{} simulation sent: {}", "→".cyan(), view.title);
        }
        TerminalCommand::Form {
            product_id,
            customer_id,
        } => operator.show_application_form(&product_id, customer_id)?,
        TerminalCommand::Screen { screen, data } => operator.navigate(screen, data)?,
        TerminalCommand::Detail { product_id } => match product_id {
            Some(product_id) => operator.open_product_detail_for(&product_id)?,
            None => operator.close_product_detail()?,
        },
        TerminalCommand::OpenModal { slot, data } => operator.open_modal(slot, data),
        TerminalCommand::CloseModal { slot } => operator.close_modal(slot),
        TerminalCommand::Highlight {
            element_id,
            highlight_type,
            color,
        } => operator.highlight(element_id, highlight_type, color)?,
        TerminalCommand::Reset => operator.reset_display()?,
        other => debug!("Ignoring display command on operator: {:?}", other),
    }

    Ok(())
}

async fn next_inbound(inbound: &mut Option<mpsc::UnboundedReceiver<Inbound>>) -> Option<Inbound> {
    match inbound {
        Some(inbound) => inbound.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_policy_is_bounded() {
        let mut policy =
            ReconnectPolicy::new(Duration::from_millis(100), Duration::from_millis(400), 3);

        for _ in 0..3 {
            let delay = policy.next_delay().unwrap();
            assert!(delay <= Duration::from_millis(600));
        }
        assert_eq!(policy.next_delay(), None);

        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert!(policy.next_delay().is_some());
    }

    #[tokio::test]
    async fn test_display_uses_configured_simulation_defaults() {
        let mut config = Config::default();
        config.simulation.default_amount = 2_000_000;
        config.simulation.default_period = 24;

        let channel = Arc::new(crate::channel::LocalHub::start());
        let mut runtime = TerminalRuntime::display(&config, channel, "S-1", None);

        runtime.handle_sync_event(SyncEvent::new(
            "show-comparison",
            serde_json::json!({ "selectedProducts": [{ "id": "P1" }, { "id": "P2" }] }),
        ));

        let Terminal::Display(display) = &runtime.terminal else {
            panic!("expected a display terminal");
        };
        match &display.screen().payload {
            crate::display::ScreenPayload::Comparison(view) => {
                assert_eq!(view.simulation_amount, 2_000_000);
                assert_eq!(view.simulation_period, 24);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
