/// Config schema types (server, remote browser, planner, intent, executor).
use std::collections::HashMap;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    pub server: ServerConfig,
    pub remote: RemoteBrowserConfig,
    pub planner: PlannerConfig,
    pub intent: IntentConfig,
    pub executor: ExecutorConfig,
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    pub port: u16,
    /// How long shutdown waits for best-effort session teardown.
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8787,
            shutdown_grace_ms: 3000,
        }
    }
}

/// Remote browser provisioning (Browserbase-compatible API).
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteBrowserConfig {
    /// Base URL of the session-provisioning API.
    pub api_url: String,
    pub project_id: Option<String>,
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    /// Remote session lifetime in seconds.
    pub session_timeout_secs: u64,
    /// Keep the remote browser alive across control-connection disconnects.
    pub keep_alive: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Anti-automation-detection browser flags sent with session creation.
    pub stealth_args: Vec<String>,
    /// Timeout for REST calls and CDP requests.
    pub request_timeout_ms: u64,
    /// How many times to poll a session still starting up before giving up.
    pub start_poll_attempts: u32,
    pub start_poll_interval_ms: u64,
}

impl std::fmt::Debug for RemoteBrowserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBrowserConfig")
            .field("api_url", &self.api_url)
            .field("project_id", &self.project_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("session_timeout_secs", &self.session_timeout_secs)
            .field("keep_alive", &self.keep_alive)
            .field("viewport_width", &self.viewport_width)
            .field("viewport_height", &self.viewport_height)
            .field("stealth_args", &self.stealth_args)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("start_poll_attempts", &self.start_poll_attempts)
            .field("start_poll_interval_ms", &self.start_poll_interval_ms)
            .finish()
    }
}

pub fn default_stealth_args() -> Vec<String> {
    [
        "--disable-blink-features=AutomationControlled",
        "--disable-features=IsolateOrigins,site-per-process",
        "--disable-infobars",
        "--no-first-run",
        "--no-default-browser-check",
        "--lang=en-US,en",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for RemoteBrowserConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.browserbase.com/v1".into(),
            project_id: None,
            api_key: None,
            session_timeout_secs: 3600,
            keep_alive: true,
            viewport_width: 1280,
            viewport_height: 800,
            stealth_args: default_stealth_args(),
            request_timeout_ms: 30_000,
            start_poll_attempts: 10,
            start_poll_interval_ms: 1000,
        }
    }
}

impl RemoteBrowserConfig {
    /// Both credentials are present and non-empty.
    pub fn has_credentials(&self) -> bool {
        let key_ok = self
            .api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().trim().is_empty());
        let project_ok = self
            .project_id
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty());
        key_ok && project_ok
    }
}

/// Which reasoning-model API the planner talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannerProvider {
    #[default]
    Anthropic,
    #[serde(alias = "openai-compatible")]
    Openai,
}

impl std::fmt::Display for PlannerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::Openai => write!(f, "openai"),
        }
    }
}

/// Reasoning model used by the command parser.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Set to false to always use the deterministic fallback parser.
    pub enabled: bool,
    pub provider: PlannerProvider,
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    /// Base URL override. Provider default when unset.
    pub base_url: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl std::fmt::Debug for PlannerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannerConfig")
            .field("enabled", &self.enabled)
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: PlannerProvider::Anthropic,
            api_key: None,
            base_url: None,
            model: "claude-sonnet-4-20250514".into(),
            max_tokens: 1024,
            timeout_ms: 20_000,
        }
    }
}

impl PlannerConfig {
    pub fn resolved_base_url(&self) -> String {
        if let Some(ref url) = self.base_url {
            return url.trim_end_matches('/').to_string();
        }
        match self.provider {
            PlannerProvider::Anthropic => "https://api.anthropic.com".into(),
            PlannerProvider::Openai => "https://api.openai.com/v1".into(),
        }
    }
}

/// Intent detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    /// Message prefixes that mark an explicit browser command.
    pub prefixes: Vec<String>,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            prefixes: vec![">".into()],
        }
    }
}

/// Backoff shape between retry attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Retry settings for one action type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffKind::Fixed,
            initial_backoff_ms: 500,
            max_backoff_ms: 4000,
        }
    }
}

/// Action names accepted as keys of `executor.retry_overrides`.
pub const RETRY_ACTION_KEYS: &[&str] = &[
    "navigate", "search", "click", "type", "extract", "scroll", "wait",
];

/// Action executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Pause between consecutive actions so DOM mutations can land.
    pub settle_delay_ms: u64,
    /// Duration of a `wait` action that does not specify one.
    pub default_wait_ms: u64,
    /// Upper bound for a single action including its retries.
    pub action_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    pub network_idle_timeout_ms: u64,
    /// Resource count must stay unchanged this long to count as idle.
    pub network_quiet_ms: u64,
    pub load_timeout_ms: u64,
    /// Last step of the settle cascade.
    pub fallback_delay_ms: u64,
    /// Page loaded before a search when the session is still blank.
    pub search_home: String,
    pub retry: RetryConfig,
    /// Per-action retry settings keyed by action name.
    pub retry_overrides: HashMap<String, RetryConfig>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let mut retry_overrides = HashMap::new();
        for name in ["navigate", "search", "click", "extract"] {
            retry_overrides.insert(name.to_string(), RetryConfig {
                max_attempts: 2,
                ..RetryConfig::default()
            });
        }
        Self {
            settle_delay_ms: 500,
            default_wait_ms: 2000,
            action_timeout_ms: 45_000,
            navigation_timeout_ms: 30_000,
            network_idle_timeout_ms: 5000,
            network_quiet_ms: 500,
            load_timeout_ms: 5000,
            fallback_delay_ms: 2000,
            search_home: "https://www.google.com".into(),
            retry: RetryConfig::default(),
            retry_overrides,
        }
    }
}

impl ExecutorConfig {
    /// Retry settings for an action, falling back to the shared default.
    pub fn retry_for(&self, action: &str) -> &RetryConfig {
        self.retry_overrides.get(action).unwrap_or(&self.retry)
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = PilotConfig::default();
        assert_eq!(cfg.remote.session_timeout_secs, 3600);
        assert!(cfg.remote.keep_alive);
        assert_eq!(cfg.executor.settle_delay_ms, 500);
        assert_eq!(cfg.executor.default_wait_ms, 2000);
        assert_eq!(cfg.intent.prefixes, vec![">".to_string()]);
        assert!(!cfg.remote.has_credentials());
    }

    #[test]
    fn retry_for_uses_override_then_default() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.retry_for("navigate").max_attempts, 2);
        assert_eq!(cfg.retry_for("wait").max_attempts, 1);
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = PlannerConfig {
            api_key: Some(Secret::new("sk-very-secret".into())),
            ..Default::default()
        };
        let out = format!("{cfg:?}");
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("sk-very-secret"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: PilotConfig = toml::from_str(
            r#"
            [remote]
            project_id = "proj-1"
            api_key = "bb-key"

            [planner]
            provider = "openai"
            "#,
        )
        .unwrap();
        assert!(cfg.remote.has_credentials());
        assert_eq!(cfg.remote.viewport_width, 1280);
        assert_eq!(cfg.planner.provider, PlannerProvider::Openai);
        assert_eq!(cfg.planner.resolved_base_url(), "https://api.openai.com/v1");
    }
}
