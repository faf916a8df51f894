//! Configuration loading
//!
//! Settings come from a TOML file (by default
//! `<config_dir>/chatrelay/config.toml`), then environment overrides.
//! Every field has a default so an absent file is valid.

use crate::error::{ConfigError, Result};
use crate::types::DEFAULT_SESSION_ID;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Which agent the server invokes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Echo,
    Process,
}

impl Default for AgentKind {
    fn default() -> Self {
        Self::Echo
    }
}

/// External agent process settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

/// Relay server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the WebSocket endpoint binds to
    pub bind: String,
    /// Outbound event queue per connection
    pub outbound_buffer: usize,
    pub agent: AgentKind,
    /// Delay between echo agent chunks
    pub echo_delay_ms: u64,
    pub process: Option<ProcessConfig>,
    /// Environment variables that must be set before the server starts
    pub required_env: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            outbound_buffer: 64,
            agent: AgentKind::default(),
            echo_delay_ms: 50,
            process: None,
            required_env: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Check that every required environment variable is set
    pub fn validate_environment(&self) -> Result<()> {
        self.check_env(|name| std::env::var_os(name).is_some())
    }

    fn check_env(&self, is_set: impl Fn(&str) -> bool) -> Result<()> {
        let missing: Vec<String> = self
            .required_env
            .iter()
            .filter(|name| !is_set(name.as_str()))
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingEnv(missing).into())
        }
    }
}

/// Chat client settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub url: String,
    pub session_id: String,
    /// Fixed delay before each reconnect attempt
    pub reconnect_delay_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3000".to_string(),
            session_id: DEFAULT_SESSION_ID.to_string(),
            reconnect_delay_secs: 5,
        }
    }
}

impl ClientConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("chatrelay").join("config.toml"))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        info!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup("CHATRELAY_BIND") {
            self.server.bind = bind;
        }
        if let Some(url) = lookup("CHATRELAY_URL") {
            self.client.url = url;
        }
        if let Some(session_id) = lookup("CHATRELAY_SESSION_ID") {
            self.client.session_id = session_id;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.outbound_buffer == 0 {
            return Err(ConfigError::Invalid {
                key: "server.outbound_buffer".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        if self.client.session_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "client.session_id".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }
        if self.server.agent == AgentKind::Process {
            match &self.server.process {
                Some(p) if !p.command.trim().is_empty() => {}
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "server.process.command".to_string(),
                        reason: "required when server.agent = \"process\"".to_string(),
                    }
                    .into())
                }
            }
        }
        Ok(())
    }
}
