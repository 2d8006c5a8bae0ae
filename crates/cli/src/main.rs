mod browser_commands;
mod config_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "pilot", about = "Pilot: natural-language remote browser control")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of searching the standard locations.
    #[arg(long, global = true, env = "PILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Gateway,
    /// Run one command in a fresh remote browser and print the result.
    Run {
        /// The natural-language command, e.g. "go to docs.rs".
        command: String,
        /// Conversation id used in logs.
        #[arg(long, default_value = "cli")]
        chat_id: String,
        /// Reject messages the intent detector does not classify as commands.
        #[arg(long)]
        require_intent: bool,
    },
    /// Print the action plan for a command without executing it.
    Plan { command: String },
    /// Show how a message is classified by the intent detector.
    Detect { message: String },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Keep stdout clean for JSON printed by one-shot commands.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "pilot starting");

    let explicit = cli.config.as_deref();
    match cli.command {
        None | Some(Commands::Gateway) => {
            let mut config = pilot_config::load_or_discover(explicit)?;
            if let Some(bind) = cli.bind {
                config.server.bind = bind;
            }
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            pilot_gateway::start_gateway(config).await
        },
        Some(Commands::Run {
            ref command,
            ref chat_id,
            require_intent,
        }) => {
            let config = pilot_config::load_or_discover(explicit)?;
            browser_commands::run(&config, command, chat_id, require_intent).await
        },
        Some(Commands::Plan { ref command }) => {
            let config = pilot_config::load_or_discover(explicit)?;
            browser_commands::plan(&config, command).await
        },
        Some(Commands::Detect { ref message }) => {
            let config = pilot_config::load_or_discover(explicit)?;
            browser_commands::detect(&config, message)
        },
        Some(Commands::Config { action }) => config_commands::handle_config(action, explicit),
    }
}
