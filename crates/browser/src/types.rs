//! Action plan, result, and session types shared by the parser, executor,
//! and gateway.

use std::fmt;

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::error::BrowserError;

/// Scroll target for [`Action::Scroll`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Top,
    Bottom,
    Up,
    #[default]
    Down,
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Up => "up",
            Self::Down => "down",
        };
        f.write_str(name)
    }
}

/// A single browser operation in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Load a URL.
    Navigate { url: String },

    /// Find the page's search box, fill it, and submit.
    Search { query: String },

    /// Click an element by CSS selector or by a description of it.
    Click {
        #[serde(
            alias = "selector",
            alias = "description",
            alias = "targetDescription",
            alias = "target_description"
        )]
        target: String,
    },

    /// Type text into `selector`, or into the focused element.
    Type {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
    },

    /// Capture the page (screenshot) for downstream reading.
    Extract {},

    Scroll {
        #[serde(default)]
        direction: ScrollDirection,
    },

    /// Pause; `None` means the executor's default wait.
    Wait {
        #[serde(
            default,
            alias = "durationMs",
            alias = "duration",
            skip_serializing_if = "Option::is_none"
        )]
        duration_ms: Option<u64>,
    },

    /// Produced by the parser for actions it could not type-check. Never
    /// deserialized from input; always recorded as a failure.
    #[serde(skip_deserializing)]
    Unsupported { kind: String, reason: String },
}

impl Action {
    /// Stable action name, also used as the retry-override key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::Search { .. } => "search",
            Self::Click { .. } => "click",
            Self::Type { .. } => "type",
            Self::Extract {} => "extract",
            Self::Scroll { .. } => "scroll",
            Self::Wait { .. } => "wait",
            Self::Unsupported { .. } => "unsupported",
        }
    }

    /// Check required fields before anything touches the page.
    pub fn validate(&self) -> Result<(), BrowserError> {
        let missing = |field: &str| {
            Err(BrowserError::InvalidAction(format!(
                "{} requires a non-empty {field}",
                self.name()
            )))
        };
        match self {
            Self::Navigate { url } if url.trim().is_empty() => missing("url"),
            Self::Search { query } if query.trim().is_empty() => missing("query"),
            Self::Click { target } if target.trim().is_empty() => missing("target"),
            Self::Type { text, .. } if text.is_empty() => missing("text"),
            Self::Unsupported { kind, reason } => Err(BrowserError::InvalidAction(format!(
                "unsupported action '{kind}': {reason}"
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigate { url } => write!(f, "navigate({url})"),
            Self::Search { query } => write!(f, "search({query:?})"),
            Self::Click { target } => write!(f, "click({target:?})"),
            Self::Type { text, selector } => match selector {
                Some(s) => write!(f, "type({} chars into {s})", text.chars().count()),
                None => write!(f, "type({} chars)", text.chars().count()),
            },
            Self::Extract {} => write!(f, "extract"),
            Self::Scroll { direction } => write!(f, "scroll({direction})"),
            Self::Wait { duration_ms } => match duration_ms {
                Some(ms) => write!(f, "wait({ms}ms)"),
                None => write!(f, "wait"),
            },
            Self::Unsupported { kind, .. } => write!(f, "unsupported({kind})"),
        }
    }
}

/// Where a plan came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanSource {
    Model,
    #[default]
    Fallback,
}

/// Ordered actions derived from one natural-language command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPlan {
    pub intent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub source: PlanSource,
}

impl ActionPlan {
    pub fn new(intent: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            intent: intent.into(),
            platform: None,
            actions,
            reasoning: None,
            source: PlanSource::Fallback,
        }
    }

    /// Display form of every action, as returned to callers.
    pub fn describe_actions(&self) -> Vec<String> {
        self.actions.iter().map(ToString::to_string).collect()
    }
}

/// Outcome of one executed action. Built once, never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// PNG screenshot, base64 encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub description: String,
    pub timestamp_ms: i64,
    pub duration_ms: u64,
    pub attempts: u32,
}

impl ActionResult {
    pub fn success(description: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            screenshot: None,
            error: None,
            url: None,
            description: description.into(),
            timestamp_ms: Utc::now().timestamp_millis(),
            duration_ms: 0,
            attempts: 1,
        }
    }

    pub fn failure(description: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::success(description)
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_screenshot(mut self, screenshot: String) -> Self {
        self.screenshot = Some(screenshot);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_timing(mut self, duration_ms: u64, attempts: u32) -> Self {
        self.duration_ms = duration_ms;
        self.attempts = attempts;
        self
    }
}

/// Lifecycle state of a remote browser session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Starting,
    Running,
    Proxying,
    Terminated,
}

impl SessionStatus {
    /// Map the provisioning API's status string.
    pub fn from_remote(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "RUNNING" => Self::Running,
            "PROXYING" => Self::Proxying,
            "PENDING" | "STARTING" | "CREATED" => Self::Starting,
            _ => Self::Terminated,
        }
    }

    /// Ready for a control connection.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Running | Self::Proxying)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Proxying => "proxying",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Local view of the remote session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub connect_url: String,
    pub live_view_url: Option<String>,
    pub current_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// Envelope returned for every inbound command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
    pub session_id: Option<String>,
    pub live_view_url: Option<String>,
    pub results: Vec<ActionResult>,
    pub actions: Vec<String>,
}

impl CommandResponse {
    /// A command that failed before any action ran.
    pub fn rejected(message: impl Into<String>, actions: Vec<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            session_id: None,
            live_view_url: None,
            results: Vec::new(),
            actions,
        }
    }
}
