//! Configuration loading, env substitution, overrides, and validation.
//!
//! Config files: `pilot.toml`, `pilot.yaml`, or `pilot.json`
//! Searched in `./` then `~/.config/pilot/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in the raw
//! file, and well-known environment variables override file values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, config_dir, discover_and_load, find_config_file,
        find_or_default_config_path, load_config, load_or_discover,
    },
    schema::{
        BackoffKind, ExecutorConfig, IntentConfig, PilotConfig, PlannerConfig, PlannerProvider,
        RemoteBrowserConfig, RetryConfig, ServerConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_file},
};
