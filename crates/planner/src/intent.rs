//! Cheap pre-filter deciding whether a chat message is a browser command.

use std::sync::LazyLock;

use {
    pilot_config::IntentConfig,
    regex::Regex,
    serde::{Deserialize, Serialize},
};

/// Detection outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub is_command: bool,
    /// In `[0, 1]`.
    pub confidence: f32,
    /// The message with any explicit prefix removed.
    pub command: String,
}

const CATEGORY_WEIGHT: f32 = 0.3;
const THRESHOLD: f32 = 0.2;

const NAVIGATION: &[&str] = &[
    "go to", "open", "navigate", "visit", "browse", "website", "url", "page", "http", "www.",
];
const INTERACTION: &[&str] = &[
    "click", "type", "fill", "press", "scroll", "submit", "select", "button", "log in", "sign in",
];
const SEARCH: &[&str] = &["search", "find", "look up", "lookup", "google", "query"];
const CAPTURE: &[&str] = &[
    "screenshot", "capture", "extract", "read the page", "what's on", "show me",
];
const SITES: &[&str] = &[
    "linkedin", "twitter", "x.com", "github", "youtube", "instagram", "facebook", "reddit",
    "amazon", "wikipedia", ".com", ".org", ".io",
];

/// Compile a regex from a literal in this crate.
#[allow(clippy::expect_used)]
pub(crate) fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("built-in pattern compiles")
}

/// `(?i)` alternation with word boundaries on the alphanumeric edges.
fn keyword_pattern(keywords: &[&str]) -> Regex {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| {
            let mut alt = String::new();
            if k.starts_with(|c: char| c.is_alphanumeric()) {
                alt.push_str(r"\b");
            }
            alt.push_str(&regex::escape(k));
            if k.ends_with(|c: char| c.is_alphanumeric()) {
                alt.push_str(r"\b");
            }
            alt
        })
        .collect();
    pattern(&format!("(?i)(?:{})", alternatives.join("|")))
}

static CATEGORIES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("navigation", keyword_pattern(NAVIGATION)),
        ("interaction", keyword_pattern(INTERACTION)),
        ("search", keyword_pattern(SEARCH)),
        ("capture", keyword_pattern(CAPTURE)),
        ("sites", keyword_pattern(SITES)),
    ]
});

/// Keyword scorer with explicit-prefix override. Pure and deterministic.
#[derive(Debug, Clone)]
pub struct IntentDetector {
    prefixes: Vec<String>,
}

impl Default for IntentDetector {
    fn default() -> Self {
        Self::new(vec![">".into()])
    }
}

impl From<&IntentConfig> for IntentDetector {
    fn from(cfg: &IntentConfig) -> Self {
        Self::new(cfg.prefixes.clone())
    }
}

impl IntentDetector {
    pub fn new(prefixes: Vec<String>) -> Self {
        let prefixes = prefixes
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { prefixes }
    }

    pub fn detect(&self, raw: &str) -> Intent {
        let message = raw.trim();

        if let Some(rest) = self
            .prefixes
            .iter()
            .find_map(|prefix| message.strip_prefix(prefix.as_str()))
        {
            return Intent {
                is_command: true,
                confidence: 1.0,
                command: rest.trim().to_string(),
            };
        }

        let matched = CATEGORIES
            .iter()
            .filter(|(_, re)| re.is_match(message))
            .count();
        let confidence = (CATEGORY_WEIGHT * matched as f32).min(1.0);
        Intent {
            is_command: confidence > THRESHOLD,
            confidence,
            command: message.to_string(),
        }
    }

    /// Names of the keyword categories that match, for diagnostics.
    pub fn matched_categories(&self, raw: &str) -> Vec<&'static str> {
        CATEGORIES
            .iter()
            .filter(|(_, re)| re.is_match(raw))
            .map(|(name, _)| *name)
            .collect()
    }
}
