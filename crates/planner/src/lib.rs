//! Turns chat messages into browser action plans.
//!
//! [`IntentDetector`] decides whether a message is a browser command at all;
//! [`CommandParser`] asks a reasoning model for a JSON plan and falls back to
//! deterministic patterns when the model is unavailable or unhelpful.

pub mod intent;
pub mod json;
pub mod model;
pub mod parser;
pub mod prompt;
pub mod url;

pub use {
    intent::{Intent, IntentDetector},
    json::extract_json_object,
    model::{AnthropicModel, OpenAiModel, ReasoningModel, build_model},
    parser::{CommandParser, fallback_plan, plan_from_value},
    url::normalize_url,
};
