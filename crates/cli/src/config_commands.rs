use std::path::{Path, PathBuf};

use {anyhow::Result, clap::Subcommand, secrecy::Secret};

use pilot_config::{PilotConfig, Severity, ValidationResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (file, env substitution, overrides).
    Show {
        /// Print as JSON instead of TOML.
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the path of the config file in use.
    Path,
}

pub fn handle_config(action: ConfigAction, explicit: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show { json } => show(explicit, json),
        ConfigAction::Check { verbose } => check(explicit, verbose),
        ConfigAction::Path => {
            println!("{}", config_path(explicit).display());
            Ok(())
        },
    }
}

fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(pilot_config::find_or_default_config_path)
}

const REDACTED: &str = "********";

/// Replace every secret with a placeholder so `show` never prints keys.
fn redacted(mut config: PilotConfig) -> PilotConfig {
    if config.remote.api_key.is_some() {
        config.remote.api_key = Some(Secret::new(REDACTED.into()));
    }
    if config.planner.api_key.is_some() {
        config.planner.api_key = Some(Secret::new(REDACTED.into()));
    }
    config
}

fn show(explicit: Option<&Path>, json: bool) -> Result<()> {
    let config = redacted(pilot_config::load_or_discover(explicit)?);
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(explicit: Option<&Path>, verbose: bool) -> Result<()> {
    let result = match explicit
        .map(Path::to_path_buf)
        .or_else(pilot_config::find_config_file)
    {
        Some(path) => pilot_config::validate_file(&path),
        None => pilot_config::validate(&pilot_config::discover_and_load()),
    };

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let shown = print_diagnostics(&result, verbose);

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn print_diagnostics(result: &ValidationResult, verbose: bool) -> usize {
    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }
    shown
}
