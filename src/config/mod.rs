//! Configuration management module
//!
//! Handles loading, validation, and management of application configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::event::{DEFAULT_SIMULATION_AMOUNT, DEFAULT_SIMULATION_PERIOD};
use crate::modal::{DEFAULT_MIRRORED, ModalSlot};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Logging level
    pub log_level: String,

    /// File-based logging configuration
    pub log: LogConfig,

    /// Session channel / relay configuration
    pub channel: ChannelConfig,

    /// Signature and completion endpoints
    pub api: ApiConfig,

    /// Modal mirroring
    #[serde(default)]
    pub modal: ModalConfig,

    /// Comparison simulation defaults
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LogConfig {
    /// Absolute or relative path to the rolling log file
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChannelConfig {
    /// Relay WebSocket URL terminals connect to
    pub relay_url: String,

    /// Address the relay server listens on
    pub listen_addr: String,

    /// How long to wait for `session-joined`
    pub join_timeout_ms: u64,

    /// Initial reconnect interval in milliseconds
    pub reconnect_interval_ms: u64,

    /// Upper bound for the reconnect interval in milliseconds
    pub max_reconnect_interval_ms: u64,

    /// Maximum reconnection attempts before giving up
    pub max_reconnect_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Base URL of the consultation backend
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Signature submission path
    pub signature_path: String,

    /// Completion record path
    pub completion_path: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ModalConfig {
    /// Slots whose open/close is propagated to the peer
    pub mirrored: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Amount used when a comparison carries none (KRW)
    pub default_amount: u64,

    /// Period used when a comparison carries none (months)
    pub default_period: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log: LogConfig::default(),
            channel: ChannelConfig::default(),
            api: ApiConfig::default(),
            modal: ModalConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_path: "logs/consultsync.log".to_string(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:9090/ws".to_string(),
            listen_addr: "127.0.0.1:9090".to_string(),
            join_timeout_ms: 5000,
            reconnect_interval_ms: 1000,
            max_reconnect_interval_ms: 30000,
            max_reconnect_attempts: 10,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout_seconds: 10,
            signature_path: "/signature/submit".to_string(),
            completion_path: "/consultation/completion".to_string(),
        }
    }
}

impl Default for ModalConfig {
    fn default() -> Self {
        Self {
            mirrored: DEFAULT_MIRRORED
                .iter()
                .map(|slot| slot.as_str().to_string())
                .collect(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            default_amount: DEFAULT_SIMULATION_AMOUNT,
            default_period: DEFAULT_SIMULATION_PERIOD,
        }
    }
}

impl ChannelConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Config {
    /// Load configuration from file with environment variable overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        // CONSULTSYNC_LOG_LEVEL - logging level
        if let Ok(log_level) = env::var("CONSULTSYNC_LOG_LEVEL") {
            self.log_level = log_level;
        }

        // CONSULTSYNC_LOG_FILE_PATH - logging destination file
        if let Ok(file_path) = env::var("CONSULTSYNC_LOG_FILE_PATH") {
            if !file_path.trim().is_empty() {
                self.log.file_path = file_path;
            }
        }

        // CONSULTSYNC_RELAY_URL - relay WebSocket URL
        if let Ok(relay_url) = env::var("CONSULTSYNC_RELAY_URL") {
            self.channel.relay_url = relay_url;
        }

        // CONSULTSYNC_LISTEN_ADDR - relay listen address
        if let Ok(listen_addr) = env::var("CONSULTSYNC_LISTEN_ADDR") {
            self.channel.listen_addr = listen_addr;
        }

        // CONSULTSYNC_JOIN_TIMEOUT_MS - join acknowledgement timeout
        if let Ok(timeout) = env::var("CONSULTSYNC_JOIN_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.channel.join_timeout_ms = value;
            }
        }

        // CONSULTSYNC_RECONNECT_INTERVAL_MS - initial reconnect interval
        if let Ok(interval) = env::var("CONSULTSYNC_RECONNECT_INTERVAL_MS") {
            if let Ok(value) = interval.parse::<u64>() {
                self.channel.reconnect_interval_ms = value;
            }
        }

        // CONSULTSYNC_MAX_RECONNECT_ATTEMPTS - max reconnect attempts
        if let Ok(attempts) = env::var("CONSULTSYNC_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(value) = attempts.parse::<u32>() {
                self.channel.max_reconnect_attempts = value;
            }
        }

        // CONSULTSYNC_API_BASE_URL - consultation backend
        if let Ok(base_url) = env::var("CONSULTSYNC_API_BASE_URL") {
            self.api.base_url = base_url;
        }

        // CONSULTSYNC_API_TIMEOUT_SECONDS - request timeout
        if let Ok(timeout) = env::var("CONSULTSYNC_API_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.api.timeout_seconds = value;
            }
        }

        // CONSULTSYNC_MIRRORED_MODALS - comma-separated slot names
        if let Ok(mirrored) = env::var("CONSULTSYNC_MIRRORED_MODALS") {
            self.modal.mirrored = mirrored
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load_from_file(path).unwrap_or_else(|err| {
            tracing::warn!("Failed to load config: {}, using defaults", err);
            let mut config = Self::default();
            config.apply_env_overrides();
            config
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.log.file_path.trim().is_empty() {
            anyhow::bail!("Log file path must not be empty");
        }

        if self.channel.relay_url.trim().is_empty() {
            anyhow::bail!("channel.relay_url must not be empty");
        }

        if self.channel.join_timeout_ms == 0 {
            anyhow::bail!("channel.join_timeout_ms must be greater than 0");
        }

        if self.channel.reconnect_interval_ms == 0 {
            anyhow::bail!("channel.reconnect_interval_ms must be greater than 0");
        }

        if self.channel.max_reconnect_interval_ms < self.channel.reconnect_interval_ms {
            anyhow::bail!("channel.max_reconnect_interval_ms must not be below the initial interval");
        }

        if self.api.base_url.trim().is_empty() {
            anyhow::bail!("api.base_url must not be empty");
        }

        if self.api.timeout_seconds == 0 {
            anyhow::bail!("api.timeout_seconds must be greater than 0");
        }

        if self.simulation.default_period == 0 {
            anyhow::bail!("simulation.default_period must be greater than 0");
        }

        for name in &self.modal.mirrored {
            if ModalSlot::parse(name).is_none() {
                anyhow::bail!("Unknown modal slot: {}", name);
            }
        }

        Ok(())
    }

    /// Mirrored slots; names are checked by [`Config::validate`]
    pub fn mirrored_slots(&self) -> Vec<ModalSlot> {
        self.modal
            .mirrored
            .iter()
            .filter_map(|name| ModalSlot::parse(name))
            .collect()
    }

    /// Display formatted configuration
    pub fn display(&self) -> Result<()> {
        println!("Current configuration:");
        println!(
            "{}",
            toml::to_string_pretty(self).context("Failed to serialize configuration")?
        );
        Ok(())
    }

    /// Handle configuration command
    pub fn handle_command(config_file: &str, action: &Option<crate::cli::ConfigAction>) -> Result<()> {
        match action {
            Some(crate::cli::ConfigAction::Show) | None => {
                let config = Config::load_or_default(config_file);
                config.display()?;
            }
            Some(crate::cli::ConfigAction::Reset) => {
                let default_config = Config::default();
                default_config.save_to_file(config_file)?;
                println!("Configuration reset to defaults in {}", config_file);
                default_config.display()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.mirrored_slots(),
            vec![
                ModalSlot::PrivacyConsent,
                ModalSlot::SignaturePad,
                ModalSlot::Calculator,
                ModalSlot::Simulation
            ]
        );
        assert_eq!(config.simulation.default_amount, 1_000_000);
        assert_eq!(config.simulation.default_period, 12);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_config_file_operations() {
        let mut config = Config::default();
        config.channel.join_timeout_ms = 750;
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();

        let loaded_config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded_config.channel.join_timeout_ms, 750);
        assert_eq!(loaded_config.channel.join_timeout(), Duration::from_millis(750));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.modal.mirrored.push("hologram".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.channel.join_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.api.base_url = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_optional_sections_default() {
        let config: Config = toml::from_str(
            r#"
            log_level = "debug"

            [log]
            file_path = "logs/test.log"

            [channel]
            relay_url = "ws://relay:9090/ws"
            listen_addr = "0.0.0.0:9090"
            join_timeout_ms = 2000
            reconnect_interval_ms = 500
            max_reconnect_interval_ms = 8000
            max_reconnect_attempts = 3

            [api]
            base_url = "http://backend/api"
            timeout_seconds = 5
            signature_path = "/signature/submit"
            completion_path = "/consultation/completion"
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.modal, ModalConfig::default());
        assert_eq!(config.simulation, SimulationConfig::default());
    }
}
