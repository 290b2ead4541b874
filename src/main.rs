use anyhow::{Context, Result};
use colored::Colorize;
use consultsync::{
    channel::{LocalHub, WsChannel, relay},
    cli::{Cli, Commands},
    config::Config,
    demo::run_demo,
    init_logging,
    operator::sample_catalog,
    session::TerminalRuntime,
};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Load configuration
    let config = Config::load_or_default(&cli.config_file);

    // Interactive terminals log to file so the screen stays readable
    let log_file = cli
        .is_terminal_mode()
        .then(|| Path::new(&config.log.file_path));
    let _log_guard = init_logging(&cli.effective_log_level(), log_file)?;

    tracing::info!("consultsync starting...");
    tracing::debug!("CLI arguments: {:?}", cli);

    match &cli.command {
        Commands::Config { action } => Config::handle_command(&cli.config_file, action)?,
        Commands::Serve { listen } => {
            config.validate()?;
            let addr = listen.as_deref().unwrap_or(&config.channel.listen_addr);
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind relay to {}", addr))?;
            println!("{} relay listening on {}", "●".green(), addr.bold());

            tokio::select! {
                result = relay::serve(listener, LocalHub::start()) => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Relay shutting down"),
            }
        }
        Commands::Operator { session, user } => {
            config.validate()?;
            let session_id = session
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let channel = Arc::new(WsChannel::new(&config.channel.relay_url));

            let mut runtime =
                TerminalRuntime::operator(&config, channel, session_id, user, sample_catalog());
            runtime.run().await?;
        }
        Commands::Display { session, customer } => {
            config.validate()?;
            let channel = Arc::new(WsChannel::new(&config.channel.relay_url));

            let mut runtime =
                TerminalRuntime::display(&config, channel, session, customer.clone());
            runtime.run().await?;
        }
        Commands::Demo => run_demo(&config).await?,
    }

    Ok(())
}
