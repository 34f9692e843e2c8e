//! Configuration for the store, scheduler and delivery channel.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Remote store connection.
    pub store: StoreConfig,
    /// Expiry scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Discord delivery settings.
    pub discord: DiscordConfig,
}

/// Kubernetes ConfigMap store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// API server base URL.
    pub api_url: String,
    /// Namespace holding poll and reminder ConfigMaps.
    pub namespace: String,
    /// File containing the bearer token (None = unauthenticated).
    pub token_path: Option<PathBuf>,
    /// PEM bundle used to verify the API server (None = system roots).
    pub ca_cert_path: Option<PathBuf>,
}

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            api_url: "https://kubernetes.default.svc".to_owned(),
            namespace: "saltbot".to_owned(),
            token_path: Some(PathBuf::from(SERVICE_ACCOUNT_DIR).join("token")),
            ca_cert_path: Some(PathBuf::from(SERVICE_ACCOUNT_DIR).join("ca.crt")),
        }
    }
}

/// Expiry scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between expiry scans.
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 1,
        }
    }
}

/// Discord REST delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token. Overridden by `BOT_TOKEN` when set.
    pub bot_token: String,
    /// REST API base URL.
    pub api_base: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: "https://discord.com/api/v10".to_owned(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::BotError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::BotError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default config file path: `MIRRORBOT_CONFIG_DIR/config.toml` when set,
    /// otherwise `dirs::config_dir()/mirrorbot/config.toml`.
    pub fn default_config_path() -> PathBuf {
        let dir = match std::env::var_os("MIRRORBOT_CONFIG_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .map(|d| d.join("mirrorbot"))
                .unwrap_or_else(|| PathBuf::from("/tmp/mirrorbot-config")),
        };
        dir.join("config.toml")
    }

    /// Apply environment overrides (`BOT_TOKEN`).
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("BOT_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.discord.bot_token = token.trim().to_owned();
        }
    }

    /// Validate without network calls. Returns human-readable problems.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.discord.bot_token.trim().is_empty() {
            problems.push("discord bot token is empty (set BOT_TOKEN)".to_owned());
        }
        if self.store.namespace.trim().is_empty() {
            problems.push("store namespace is empty".to_owned());
        }
        if self.store.api_url.trim().is_empty() {
            problems.push("store api_url is empty".to_owned());
        }
        if self.scheduler.tick_interval_secs == 0 {
            problems.push("scheduler tick_interval_secs must be > 0".to_owned());
        }
        problems
    }
}
