use anyhow::{bail, Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::providers::gemini::DEFAULT_MODEL;

const CONFIG_FILE: &str = "config.toml";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level PersonaBot configuration, loaded from `config.toml`.
///
/// Resolution order: `PERSONABOT_CONFIG_DIR` env → `~/.personabot/config.toml`.
/// Environment variables are applied on top of the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// API key for the AI backend. Overridden by `GOOGLE_API_KEY` or `PERSONABOT_API_KEY`.
    pub api_key: Option<String>,
    /// Backend provider ID. Default: `"gemini"`.
    pub default_provider: Option<String>,
    /// Model requested from the provider. Overridden by `DEFAULT_MODEL`.
    pub default_model: Option<String>,
    /// Sampling temperature (0.0 to 2.0). Default: `0.7`.
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,

    /// Telegram bot settings (`[telegram]`).
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Message processing settings (`[runtime]`).
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

fn default_temperature() -> f64 {
    0.7
}

// ── Telegram ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token. Overridden by `TELEGRAM_TOKEN`.
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Bot API base URL.
    #[serde(default = "default_telegram_api_base_url")]
    pub api_base_url: String,
    /// Long-poll timeout passed to `getUpdates`, in seconds.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// HTTP timeout for each Bot API request, in seconds. Must exceed the poll timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Discard updates queued while the bot was offline.
    #[serde(default = "default_true")]
    pub drop_pending_updates: bool,
}

fn default_telegram_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    9
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base_url: default_telegram_api_base_url(),
            poll_timeout_secs: default_poll_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            drop_pending_updates: true,
        }
    }
}

// ── Runtime ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Maximum number of messages processed concurrently.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Seconds to wait for in-flight messages after a shutdown signal.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Capacity of the queue between the transport and the workers.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_max_workers() -> usize {
    100
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let config_dir = default_config_dir().unwrap_or_else(|_| PathBuf::from(".personabot"));

        Self {
            config_path: config_dir.join(CONFIG_FILE),
            api_key: None,
            default_provider: Some("gemini".to_string()),
            default_model: Some(DEFAULT_MODEL.to_string()),
            default_temperature: default_temperature(),
            telegram: TelegramConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".personabot"))
}

fn resolve_config_dir() -> Result<PathBuf> {
    match std::env::var("PERSONABOT_CONFIG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => Ok(PathBuf::from(dir)),
        _ => default_config_dir(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub async fn load() -> Result<Self> {
        let config_dir = resolve_config_dir()?;
        let mut config = Self::load_from(&config_dir.join(CONFIG_FILE)).await?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self {
                config_path: path.to_path_buf(),
                ..Self::default()
            });
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config =
            toml::from_str(&contents).context("Failed to parse config file")?;
        config.config_path = path.to_path_buf();

        tracing::info!(path = %config.config_path.display(), "config loaded");
        Ok(config)
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key-value lookup. Blank values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| keys.iter().find_map(|&key| non_empty(lookup(key)));

        if let Some(token) = first(&["TELEGRAM_TOKEN", "PERSONABOT_TELEGRAM_TOKEN"]) {
            self.telegram.bot_token = Some(token);
        }

        if let Some(key) = first(&["PERSONABOT_API_KEY", "GOOGLE_API_KEY", "GEMINI_API_KEY"]) {
            self.api_key = Some(key);
        }

        if let Some(provider) = first(&["PERSONABOT_PROVIDER"]) {
            self.default_provider = Some(provider);
        }

        if let Some(model) = first(&["DEFAULT_MODEL", "PERSONABOT_MODEL"]) {
            self.default_model = Some(model);
        }

        if let Some(workers) = first(&["PERSONABOT_MAX_WORKERS"]) {
            match workers.trim().parse::<usize>() {
                Ok(n) => self.runtime.max_workers = n,
                Err(_) => tracing::warn!(value = %workers, "ignoring invalid PERSONABOT_MAX_WORKERS"),
            }
        }
    }

    /// Check that everything needed to serve is present and consistent.
    pub fn validate(&self) -> Result<()> {
        if non_empty(self.telegram.bot_token.clone()).is_none() {
            bail!("Telegram bot token is not set (TELEGRAM_TOKEN or [telegram].bot_token)");
        }
        if non_empty(self.api_key.clone()).is_none() {
            bail!("AI backend API key is not set (GOOGLE_API_KEY or api_key)");
        }
        if !(0.0..=2.0).contains(&self.default_temperature) {
            bail!("default_temperature must be between 0.0 and 2.0");
        }
        if self.runtime.max_workers == 0 {
            bail!("runtime.max_workers must be greater than 0");
        }
        if self.runtime.queue_capacity == 0 {
            bail!("runtime.queue_capacity must be greater than 0");
        }
        if self.telegram.request_timeout_secs <= self.telegram.poll_timeout_secs {
            bail!(
                "telegram.request_timeout_secs ({}) must exceed telegram.poll_timeout_secs ({})",
                self.telegram.request_timeout_secs,
                self.telegram.poll_timeout_secs
            );
        }
        Ok(())
    }

    pub fn provider_name(&self) -> &str {
        self.default_provider.as_deref().unwrap_or("gemini")
    }
}
