mod env;
pub use env::{apply_env_overrides, apply_overrides};

use crate::provider::{self, ProviderConfig};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Complete connect-flow configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectFlowConfig {
    #[serde(default)]
    pub popup: PopupConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    /// Per-provider settings, keyed by provider name
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

/// Popup window geometry
#[derive(Debug, Clone, Deserialize)]
pub struct PopupConfig {
    #[serde(default = "default_popup_width")]
    pub width: u32,
    #[serde(default = "default_popup_height")]
    pub height: u32,
}

fn default_popup_width() -> u32 {
    600
}

fn default_popup_height() -> u32 {
    600
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            width: default_popup_width(),
            height: default_popup_height(),
        }
    }
}

/// Closed-window polling
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// How often to check whether the popup was closed (milliseconds)
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    500
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
        }
    }
}

/// Cross-window message filtering
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Value of the `type` field that marks a message as a flow message
    #[serde(default = "default_message_type")]
    pub message_type: String,
}

fn default_message_type() -> String {
    "flow".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            message_type: default_message_type(),
        }
    }
}

/// Flow lifetime limits
#[derive(Debug, Clone, Deserialize)]
pub struct FlowConfig {
    /// Give up on a flow after this many seconds (0 = wait forever)
    #[serde(default = "default_max_duration")]
    pub max_duration_seconds: u64,
}

fn default_max_duration() -> u64 {
    600
}

impl FlowConfig {
    pub fn max_duration(&self) -> Option<Duration> {
        match self.max_duration_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_duration_seconds: default_max_duration(),
        }
    }
}

/// Provider settings as written in the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
}

impl ConnectFlowConfig {
    /// Resolve a provider by name: built-in defaults overlaid with file settings.
    ///
    /// Returns `None` when the provider is unknown and the file gives no `auth_url`.
    pub fn provider(&self, name: &str) -> Option<ProviderConfig> {
        let base = provider::builtin(name);
        let Some(settings) = self.providers.get(name) else {
            return base;
        };

        let auth_url = settings
            .auth_url
            .clone()
            .or_else(|| base.as_ref().map(|b| b.auth_url.clone()))?;

        let mut config = ProviderConfig::new(name, auth_url);
        config.allowed_origins = if settings.allowed_origins.is_empty() {
            base.map(|b| b.allowed_origins).unwrap_or_default()
        } else {
            settings.allowed_origins.clone()
        };
        config.query = settings.query.clone();
        Some(config)
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<ConnectFlowConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: ConnectFlowConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}
