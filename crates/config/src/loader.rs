use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    schema::{PilotConfig, PlannerProvider},
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["pilot.toml", "pilot.yaml", "pilot.yml", "pilot.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<PilotConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply environment
/// overrides.
///
/// Search order:
/// 1. `./pilot.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/pilot/pilot.{toml,yaml,yml,json}` (user-global)
///
/// A missing or broken file yields defaults; startup never fails on config.
pub fn discover_and_load() -> PilotConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                PilotConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            PilotConfig::default()
        },
    };
    apply_env_overrides(&mut config);
    config
}

/// Load an explicit file (CLI `--config`) or fall back to discovery.
pub fn load_or_discover(path: Option<&Path>) -> anyhow::Result<PilotConfig> {
    match path {
        Some(path) => {
            let mut config = load_config(path)?;
            apply_env_overrides(&mut config);
            Ok(config)
        },
        None => Ok(discover_and_load()),
    }
}

/// Overlay well-known environment variables onto the loaded config.
pub fn apply_env_overrides(config: &mut PilotConfig) {
    apply_overrides_with(config, |name| std::env::var(name).ok());
}

pub(crate) fn apply_overrides_with(
    config: &mut PilotConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(key) = get("BROWSERBASE_API_KEY") {
        config.remote.api_key = Some(Secret::new(key));
    }
    if let Some(project) = get("BROWSERBASE_PROJECT_ID") {
        config.remote.project_id = Some(project);
    }
    if let Some(url) = get("PILOT_REMOTE_API_URL") {
        config.remote.api_url = url;
    }

    let planner_key_var = match config.planner.provider {
        PlannerProvider::Anthropic => "ANTHROPIC_API_KEY",
        PlannerProvider::Openai => "OPENAI_API_KEY",
    };
    if let Some(key) = get(planner_key_var) {
        config.planner.api_key = Some(Secret::new(key));
    }
    if let Some(model) = get("PILOT_PLANNER_MODEL") {
        config.planner.model = model;
    }

    if let Some(bind) = get("PILOT_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = get("PILOT_PORT") {
        match port.parse() {
            Ok(p) => config.server.port = p,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid PILOT_PORT"),
        }
    }
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .or_else(|| {
            let dir = config_dir()?;
            CONFIG_FILENAMES
                .iter()
                .map(|name| dir.join(name))
                .find(|p| p.exists())
        })
}

/// Returns the user-global config directory (`~/.config/pilot/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "pilot").map(|d| d.config_dir().to_path_buf())
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    find_config_file().unwrap_or_else(|| {
        config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pilot.toml")
    })
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<PilotConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
