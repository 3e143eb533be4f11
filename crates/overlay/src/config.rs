use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::render::OverlayStyle;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub requester: RequesterConfig,
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub overlay: OverlayStyle,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub preferences: PreferencesConfig,
}

/// Which backend to use for translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-compatible `/v1/chat/completions` (llama-server, Ollama, LM Studio).
    ChatCompletions,
    /// `POST {text, target} -> {text}`, as served by `translate-server`.
    Simple,
    /// Offline placeholder that tags each line with the target code.
    Echo,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChatCompletions => write!(f, "chat-completions"),
            Self::Simple => write!(f, "simple"),
            Self::Echo => write!(f, "echo"),
        }
    }
}

fn default_provider_kind() -> ProviderKind { ProviderKind::ChatCompletions }

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,
    /// Tried in order; first success wins.
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Timeout multiplier for the single retry.
    #[serde(default = "default_retry_factor")]
    pub retry_factor: f32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_endpoints() -> Vec<String> {
    vec![
        "http://127.0.0.1:8080/v1/chat/completions".into(),
        "http://localhost:8080/v1/chat/completions".into(),
    ]
}
fn default_model() -> String { "local-model".into() }
fn default_timeout_secs() -> u64 { 30 }
fn default_retry_factor() -> f32 { 1.5 }
fn default_temperature() -> f32 { 0.2 }

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            endpoints: default_endpoints(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            retry_factor: default_retry_factor(),
            temperature: default_temperature(),
        }
    }
}

const MIN_INTERVAL_MS: u64 = 1;

#[derive(Debug, Deserialize, Clone)]
pub struct RequesterConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Only the trailing `max_chars` characters of a caption are sent.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

impl RequesterConfig {
    /// Never zero; tokio intervals reject a zero period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_INTERVAL_MS))
    }
}

fn default_poll_interval_ms() -> u64 { 900 }
fn default_max_chars() -> usize { 800 }
fn default_placeholder() -> String { "Translating…".into() }

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_chars: default_max_chars(),
            placeholder: default_placeholder(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReaderConfig {
    /// Used only when the page offers no mutation signal.
    #[serde(default = "default_rescan_interval_ms")]
    pub rescan_interval_ms: u64,
}

impl ReaderConfig {
    pub fn rescan_interval(&self) -> Duration {
        Duration::from_millis(self.rescan_interval_ms.max(MIN_INTERVAL_MS))
    }
}

fn default_rescan_interval_ms() -> u64 { 750 }

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            rescan_interval_ms: default_rescan_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,
    /// Override log directory. Default: "logs/" next to the config file.
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool { true }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            directory: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PreferencesConfig {
    /// Path of the JSON preference file. Default: "preferences.json" next to the config file.
    pub path: Option<String>,
}

impl Config {
    /// Strict parse; used by tests and callers that want to surface errors.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load `path`, falling back to defaults when it is missing or malformed.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(config) => config,
            Err(ConfigError::Read { .. }) => {
                warn!("{} not found, using defaults", path.display());
                Config::default()
            }
            Err(e) => {
                warn!("Failed to parse {}: {e}", path.display());
                Config::default()
            }
        }
    }
}

/// Resolve a configured path relative to the directory holding the config file.
pub fn resolve_relative(base_dir: &Path, configured: Option<&str>, fallback: &str) -> PathBuf {
    match configured {
        Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
        Some(p) => base_dir.join(p),
        None => base_dir.join(fallback),
    }
}
