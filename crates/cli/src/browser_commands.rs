//! One-shot browser commands that run outside the gateway.

use std::sync::Arc;

use {
    anyhow::Result,
    pilot_config::PilotConfig,
    pilot_gateway::{BrowserServices, Orchestrator},
    pilot_planner::{CommandParser, IntentDetector},
    tracing::info,
};

/// Execute `command` against a fresh remote session, print the response as
/// JSON, and release the session.
pub async fn run(
    config: &PilotConfig,
    command: &str,
    chat_id: &str,
    require_intent: bool,
) -> Result<()> {
    let services = Arc::new(BrowserServices::from_config(config));
    let orchestrator = Orchestrator::new(chat_id, services);

    let response = orchestrator.handle_message(command, require_intent).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if let Some(session_id) = orchestrator.close().await {
        info!(session_id = %session_id, "session released");
    }

    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Print the action plan for `command` without touching a browser.
pub async fn plan(config: &PilotConfig, command: &str) -> Result<()> {
    let parser = CommandParser::from_config(&config.planner);
    let plan = parser.parse(command).await;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

/// Print how the intent detector classifies `message`.
pub fn detect(config: &PilotConfig, message: &str) -> Result<()> {
    let detector = IntentDetector::from(&config.intent);
    let intent = detector.detect(message);
    let categories = detector.matched_categories(message);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "isCommand": intent.is_command,
            "confidence": intent.confidence,
            "command": intent.command,
            "categories": categories,
        }))?
    );
    Ok(())
}
