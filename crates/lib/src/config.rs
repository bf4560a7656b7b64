//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `wxbot.json`) and environment.
//! Env vars `BOT_SECRET`, `BOT_PORT`, and `BOT_HOST` override the file values
//! via the `resolve_*` helpers; CLI flags are applied on top by the caller.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Bot credential and webhook signature policy.
    #[serde(default)]
    pub bot: BotConfig,

    /// Weather service settings.
    #[serde(default)]
    pub weather: WeatherConfig,
}

/// Server bind and port settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for the webhook server (default 8443).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0" — the platform delivers from outside).
    #[serde(default = "default_server_host")]
    pub host: String,
}

fn default_server_port() -> u16 {
    8443
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            host: default_server_host(),
        }
    }
}

/// Bot credential and signature settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// Bearer secret for the MAX API; also keys webhook signature checks.
    /// Overridden by BOT_SECRET env. The server refuses to start without one.
    pub secret: Option<String>,

    /// What to do when a webhook arrives without a signature header.
    #[serde(default)]
    pub signature_policy: SignaturePolicy,
}

/// Policy for webhooks that carry no `X-Max-Signature` header. A present
/// header is always verified; this only governs its absence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignaturePolicy {
    /// Log a warning and accept. Matches observed platform deliveries, which
    /// do not always sign.
    #[default]
    WarnAndAllow,

    /// Reject (403) unsigned webhooks when a secret is configured.
    Reject,
}

/// Weather service settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherConfig {
    /// Weather service base URL (default https://wttr.in). Mainly for tests
    /// and self-hosted wttr instances.
    pub base_url: Option<String>,
}

impl Config {
    /// Load config from a JSON file. A missing file yields the defaults so a
    /// fully env-configured deployment needs no file at all.
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            log::debug!("config file not found, using defaults: {}", path.display());
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing config from {}", path.display()))
    }
}

/// Resolve the bot secret: env BOT_SECRET overrides config.
pub fn resolve_bot_secret(config: &Config) -> Option<String> {
    std::env::var("BOT_SECRET")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .bot
                .secret
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the listen port: env BOT_PORT (when it parses) overrides config.
pub fn resolve_port(config: &Config) -> u16 {
    std::env::var("BOT_PORT")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(config.server.port)
}

/// Resolve the bind host: env BOT_HOST overrides config.
pub fn resolve_host(config: &Config) -> String {
    std::env::var("BOT_HOST")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| config.server.host.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_port_and_host() {
        let s = ServerConfig::default();
        assert_eq!(s.port, 8443);
        assert_eq!(s.host, "0.0.0.0");
    }

    #[test]
    fn default_signature_policy_is_warn_and_allow() {
        let b = BotConfig::default();
        assert_eq!(b.signature_policy, SignaturePolicy::WarnAndAllow);
    }

    #[test]
    fn parses_camel_case_config() {
        let config: Config = serde_json::from_str(
            r#"{
                "server": { "port": 9000, "host": "127.0.0.1" },
                "bot": { "secret": "s3cret", "signaturePolicy": "reject" },
                "weather": { "baseUrl": "http://127.0.0.1:7070" }
            }"#,
        )
        .expect("parse config");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.bot.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.bot.signature_policy, SignaturePolicy::Reject);
        assert_eq!(
            config.weather.base_url.as_deref(),
            Some("http://127.0.0.1:7070")
        );
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("wxbot-config-test-does-not-exist.json");
        let config = Config::load(&path).expect("load");
        assert_eq!(config.server.port, 8443);
        assert!(config.bot.secret.is_none());
    }
}
