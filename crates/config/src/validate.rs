//! Configuration validation.
//!
//! Missing credentials are never fatal: they are reported here, logged at
//! startup, and the affected features degrade or fail per request.

use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;

use crate::{
    env_subst::has_placeholder,
    loader::{apply_env_overrides, load_config},
    schema::{PilotConfig, RETRY_ACTION_KEYS, RetryConfig},
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "credentials", "degraded", "unknown-field",
    /// "range", "security"
    pub category: &'static str,
    /// Dotted path, e.g. "remote.api_key"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.severity, self.category, self.path, self.message
        )
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Load `path` (with env substitution and overrides) and validate it.
/// Parse failures become a single `syntax` error.
pub fn validate_file(path: &Path) -> ValidationResult {
    match load_config(path) {
        Ok(mut config) => {
            apply_env_overrides(&mut config);
            let mut result = validate(&config);
            result.config_path = Some(path.to_path_buf());
            result
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                e.to_string(),
            )],
            config_path: Some(path.to_path_buf()),
        },
    }
}

/// Check a loaded configuration.
pub fn validate(config: &PilotConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();

    check_remote(config, &mut diagnostics);
    check_planner(config, &mut diagnostics);
    check_executor(config, &mut diagnostics);

    if config.intent.prefixes.iter().any(|p| p.trim().is_empty()) {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "range",
            "intent.prefixes",
            "empty prefix would mark every message as a browser command",
        ));
    }

    if !matches!(config.server.bind.as_str(), "127.0.0.1" | "localhost" | "::1") {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "security",
            "server.bind",
            format!(
                "gateway listens on {} without authentication",
                config.server.bind
            ),
        ));
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_remote(config: &PilotConfig, out: &mut Vec<Diagnostic>) {
    let remote = &config.remote;

    match remote.api_key.as_ref().map(|k| k.expose_secret().trim()) {
        None | Some("") => out.push(Diagnostic::new(
            Severity::Warning,
            "credentials",
            "remote.api_key",
            "not set; browser commands fail until BROWSERBASE_API_KEY is provided",
        )),
        Some(key) if has_placeholder(key) => out.push(Diagnostic::new(
            Severity::Warning,
            "credentials",
            "remote.api_key",
            format!("unresolved placeholder {key}"),
        )),
        Some(_) => {},
    }

    match remote.project_id.as_deref().map(str::trim) {
        None | Some("") => out.push(Diagnostic::new(
            Severity::Warning,
            "credentials",
            "remote.project_id",
            "not set; browser commands fail until BROWSERBASE_PROJECT_ID is provided",
        )),
        Some(project) if has_placeholder(project) => out.push(Diagnostic::new(
            Severity::Warning,
            "credentials",
            "remote.project_id",
            format!("unresolved placeholder {project}"),
        )),
        Some(_) => {},
    }

    if !(remote.api_url.starts_with("https://") || remote.api_url.starts_with("http://")) {
        out.push(Diagnostic::new(
            Severity::Error,
            "range",
            "remote.api_url",
            format!("expected an http(s) URL, got {:?}", remote.api_url),
        ));
    }

    if remote.session_timeout_secs == 0 {
        out.push(Diagnostic::new(
            Severity::Error,
            "range",
            "remote.session_timeout_secs",
            "must be greater than zero",
        ));
    }
}

fn check_planner(config: &PilotConfig, out: &mut Vec<Diagnostic>) {
    let planner = &config.planner;
    if !planner.enabled {
        out.push(Diagnostic::new(
            Severity::Info,
            "degraded",
            "planner.enabled",
            "reasoning model disabled; commands use the pattern parser",
        ));
        return;
    }

    let key = planner.api_key.as_ref().map(|k| k.expose_secret().trim());
    match key {
        None | Some("") => out.push(Diagnostic::new(
            Severity::Info,
            "degraded",
            "planner.api_key",
            format!(
                "no {} key; commands use the pattern parser",
                planner.provider
            ),
        )),
        Some(key) if has_placeholder(key) => out.push(Diagnostic::new(
            Severity::Warning,
            "credentials",
            "planner.api_key",
            format!("unresolved placeholder {key}"),
        )),
        Some(_) => {},
    }

    if planner.model.trim().is_empty() {
        out.push(Diagnostic::new(
            Severity::Error,
            "range",
            "planner.model",
            "model name is empty",
        ));
    }
}

fn check_executor(config: &PilotConfig, out: &mut Vec<Diagnostic>) {
    let executor = &config.executor;

    check_retry("executor.retry", &executor.retry, out);
    let mut keys: Vec<&String> = executor.retry_overrides.keys().collect();
    keys.sort();
    for key in keys {
        let path = format!("executor.retry_overrides.{key}");
        if !RETRY_ACTION_KEYS.contains(&key.as_str()) {
            out.push(Diagnostic::new(
                Severity::Warning,
                "unknown-field",
                path.clone(),
                format!(
                    "unknown action; expected one of {}",
                    RETRY_ACTION_KEYS.join(", ")
                ),
            ));
        }
        if let Some(retry) = executor.retry_overrides.get(key) {
            check_retry(&path, retry, out);
        }
    }

    if executor.settle_delay_ms >= executor.action_timeout_ms {
        out.push(Diagnostic::new(
            Severity::Warning,
            "range",
            "executor.settle_delay_ms",
            "settle delay is not shorter than the per-action timeout",
        ));
    }
}

fn check_retry(path: &str, retry: &RetryConfig, out: &mut Vec<Diagnostic>) {
    if retry.max_attempts == 0 {
        out.push(Diagnostic::new(
            Severity::Error,
            "range",
            format!("{path}.max_attempts"),
            "must be at least 1",
        ));
    }
    if retry.initial_backoff_ms > retry.max_backoff_ms {
        out.push(Diagnostic::new(
            Severity::Warning,
            "range",
            format!("{path}.initial_backoff_ms"),
            "initial backoff exceeds max_backoff_ms and will be clamped",
        ));
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret, std::io::Write};

    fn configured() -> PilotConfig {
        let mut cfg = PilotConfig::default();
        cfg.remote.api_key = Some(Secret::new("bb-key".into()));
        cfg.remote.project_id = Some("proj".into());
        cfg.planner.api_key = Some(Secret::new("sk-ant".into()));
        cfg
    }

    fn paths(result: &ValidationResult) -> Vec<&str> {
        result.diagnostics.iter().map(|d| d.path.as_str()).collect()
    }

    #[test]
    fn fully_configured_is_clean() {
        let result = validate(&configured());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn missing_credentials_are_warnings_not_errors() {
        let result = validate(&PilotConfig::default());
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 2);
        assert!(paths(&result).contains(&"remote.api_key"));
        assert!(paths(&result).contains(&"remote.project_id"));
        // Missing model key is only informational: fallback parser.
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.path == "planner.api_key" && d.severity == Severity::Info)
        );
    }

    #[test]
    fn unresolved_placeholder_is_flagged() {
        let mut cfg = configured();
        cfg.remote.api_key = Some(Secret::new("${BROWSERBASE_API_KEY}".into()));
        let result = validate(&cfg);
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.path == "remote.api_key")
            .unwrap();
        assert!(diag.message.contains("placeholder"));
    }

    #[test]
    fn bad_retry_override_reported() {
        let mut cfg = configured();
        cfg.executor
            .retry_overrides
            .insert("hover".into(), RetryConfig {
                max_attempts: 0,
                ..Default::default()
            });
        let result = validate(&cfg);
        assert!(result.has_errors());
        assert!(paths(&result).contains(&"executor.retry_overrides.hover"));
        assert!(paths(&result).contains(&"executor.retry_overrides.hover.max_attempts"));
    }

    #[test]
    fn public_bind_is_security_warning() {
        let mut cfg = configured();
        cfg.server.bind = "0.0.0.0".into();
        let result = validate(&cfg);
        assert!(result.diagnostics.iter().any(|d| d.category == "security"));
    }

    #[test]
    fn syntax_error_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server\nport = 1").unwrap();
        let result = validate_file(file.path());
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }
}
