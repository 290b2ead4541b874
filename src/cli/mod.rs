//! Command Line Interface module
//!
//! Implements the CLI commands and argument parsing for consultsync.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "consultsync")]
#[command(about = "Dual-terminal consultation session sync")]
#[command(
    long_about = "Keeps an operator console and a customer display in step during a live consultation"
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true, default_value = "consultsync.toml")]
    pub config_file: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the session relay server
    Serve {
        /// Listen address (overrides channel.listen_addr)
        #[arg(long)]
        listen: Option<String>,
    },

    /// Start the operator console
    Operator {
        /// Session id to open; a new one is generated when omitted
        #[arg(long)]
        session: Option<String>,

        /// Operator user id
        #[arg(long, default_value = "employee")]
        user: String,
    },

    /// Start the customer display
    Display {
        /// Session id to join
        #[arg(long)]
        session: String,

        /// Customer id used for signature submission
        #[arg(long)]
        customer: Option<String>,
    },

    /// Run a scripted consultation against an in-process hub
    Demo,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the default configuration to the config file
    Reset,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Adjust log level based on verbose flag
    pub fn effective_log_level(&self) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            self.log_level.clone()
        }
    }

    /// Whether this command runs an interactive terminal
    pub fn is_terminal_mode(&self) -> bool {
        matches!(self.command, Commands::Operator { .. } | Commands::Display { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_requires_session() {
        assert!(Cli::try_parse_from(["consultsync", "display"]).is_err());

        let cli = Cli::try_parse_from(["consultsync", "display", "--session", "S-1"]).unwrap();
        assert!(cli.is_terminal_mode());
        assert!(matches!(
            cli.command,
            Commands::Display { ref session, customer: None } if session == "S-1"
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["consultsync", "operator", "--verbose"]).unwrap();
        assert_eq!(cli.effective_log_level(), "debug");
        assert_eq!(cli.config_file, "consultsync.toml");
    }
}
