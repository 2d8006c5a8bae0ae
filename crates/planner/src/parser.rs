//! Natural-language command → [`ActionPlan`].
//!
//! The reasoning model is tried first; anything it gets wrong (transport
//! failure, timeout, no JSON, nothing executable) falls back to a small set
//! of deterministic patterns. [`CommandParser::parse`] never fails.

use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use {
    pilot_browser::{Action, ActionPlan, PlanSource},
    pilot_config::PlannerConfig,
    regex::Regex,
    serde::Deserialize,
    serde_json::Value,
    tracing::{debug, info, warn},
};

use crate::{
    intent::pattern,
    json::extract_json_object,
    model::{ReasoningModel, build_model},
    prompt::{SYSTEM_PROMPT, user_prompt},
    url::normalize_url,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

pub struct CommandParser {
    model: Option<Arc<dyn ReasoningModel>>,
    timeout: Duration,
}

impl CommandParser {
    pub fn new(model: Option<Arc<dyn ReasoningModel>>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// Parser without a model: every command goes through the fallback.
    pub fn fallback_only() -> Self {
        Self::new(None, DEFAULT_TIMEOUT)
    }

    pub fn from_config(cfg: &PlannerConfig) -> Self {
        let model = build_model(cfg);
        match &model {
            Some(m) => info!(provider = %cfg.provider, model = m.name(), "planner model enabled"),
            None => info!("no planner model configured, using fallback parser"),
        }
        Self::new(model, Duration::from_millis(cfg.timeout_ms))
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub async fn parse(&self, command: &str) -> ActionPlan {
        let command = command.trim();
        let Some(model) = &self.model else {
            return fallback_plan(command);
        };

        let reply = tokio::time::timeout(
            self.timeout,
            model.complete(SYSTEM_PROMPT, &user_prompt(command)),
        )
        .await;

        let text = match reply {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(error = %e, "planner model failed, using fallback");
                return fallback_plan(command);
            },
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "planner model timed out, using fallback"
                );
                return fallback_plan(command);
            },
        };

        let Some(value) = extract_json_object(&text) else {
            warn!(reply_len = text.len(), "planner reply had no JSON object, using fallback");
            return fallback_plan(command);
        };

        let plan = plan_from_value(&value, command);
        if plan
            .actions
            .iter()
            .all(|a| matches!(a, Action::Unsupported { .. }))
        {
            warn!(
                actions = plan.actions.len(),
                "planner produced no executable actions, using fallback"
            );
            return fallback_plan(command);
        }
        debug!(actions = ?plan.describe_actions(), "model plan");
        plan
    }
}

/// Build a plan from the model's JSON object. Actions with an unknown type or
/// missing fields become [`Action::Unsupported`]; navigate URLs are
/// normalized.
pub fn plan_from_value(value: &Value, command: &str) -> ActionPlan {
    let text_field = |key: &str| {
        value[key]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    let actions = value["actions"]
        .as_array()
        .map(|items| items.iter().map(action_from_value).collect())
        .unwrap_or_default();

    ActionPlan {
        intent: text_field("intent").unwrap_or_else(|| command.to_string()),
        platform: text_field("platform").map(|p| p.to_lowercase()),
        actions,
        reasoning: text_field("reasoning"),
        source: PlanSource::Model,
    }
}

fn action_from_value(item: &Value) -> Action {
    let kind = item["type"]
        .as_str()
        .map(|t| t.trim().to_lowercase())
        .unwrap_or_default();
    if kind.is_empty() {
        return Action::Unsupported {
            kind: "unknown".into(),
            reason: "action has no type".into(),
        };
    }

    match kind.as_str() {
        "click" => return click_from_value(item),
        "wait" => return wait_from_value(item),
        _ => {},
    }

    let mut normalized = item.clone();
    normalized["type"] = Value::String(kind.clone());
    match serde_json::from_value::<Action>(normalized) {
        Ok(Action::Navigate { url }) => Action::Navigate {
            url: normalize_url(&url),
        },
        Ok(action) => action,
        Err(e) => Action::Unsupported {
            kind,
            reason: e.to_string(),
        },
    }
}

/// Click fields as models send them: any alias may appear, some as null.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClickFields {
    selector: Option<String>,
    target: Option<String>,
    #[serde(alias = "target_description")]
    target_description: Option<String>,
    description: Option<String>,
}

fn click_from_value(item: &Value) -> Action {
    let fields = match ClickFields::deserialize(item) {
        Ok(fields) => fields,
        Err(e) => {
            return Action::Unsupported {
                kind: "click".into(),
                reason: e.to_string(),
            };
        },
    };
    [
        fields.selector,
        fields.target,
        fields.target_description,
        fields.description,
    ]
    .into_iter()
    .flatten()
    .map(|t| t.trim().to_string())
    .find(|t| !t.is_empty())
    .map(|target| Action::Click { target })
    .unwrap_or_else(|| Action::Unsupported {
        kind: "click".into(),
        reason: "click needs a selector or targetDescription".into(),
    })
}

#[derive(Deserialize)]
struct WaitFields {
    #[serde(rename = "durationMs", alias = "duration_ms", alias = "duration")]
    duration_ms: Option<f64>,
}

fn wait_from_value(item: &Value) -> Action {
    let unsupported = |reason: String| Action::Unsupported {
        kind: "wait".into(),
        reason,
    };
    match WaitFields::deserialize(item) {
        Ok(WaitFields { duration_ms: None }) => Action::Wait { duration_ms: None },
        Ok(WaitFields {
            duration_ms: Some(ms),
        }) if ms.is_finite() && ms >= 0.0 => Action::Wait {
            duration_ms: Some(ms.round() as u64),
        },
        Ok(_) => unsupported("durationMs must be a non-negative number".into()),
        Err(e) => unsupported(e.to_string()),
    }
}

struct Platform {
    name: &'static str,
    aliases: &'static [&'static str],
    search_url: &'static str,
    home_url: &'static str,
}

const PLATFORMS: &[Platform] = &[
    Platform {
        name: "linkedin",
        aliases: &["linkedin"],
        search_url: "https://www.linkedin.com/search/results/all/",
        home_url: "https://www.linkedin.com",
    },
    Platform {
        name: "twitter",
        aliases: &["twitter", "x"],
        search_url: "https://x.com/explore",
        home_url: "https://x.com",
    },
    Platform {
        name: "github",
        aliases: &["github"],
        search_url: "https://github.com/search",
        home_url: "https://github.com",
    },
    Platform {
        name: "instagram",
        aliases: &["instagram"],
        search_url: "https://www.instagram.com/explore/",
        home_url: "https://www.instagram.com",
    },
    Platform {
        name: "facebook",
        aliases: &["facebook"],
        search_url: "https://www.facebook.com/search/top",
        home_url: "https://www.facebook.com",
    },
    Platform {
        name: "youtube",
        aliases: &["youtube"],
        search_url: "https://www.youtube.com",
        home_url: "https://www.youtube.com",
    },
];

fn platform(alias: &str) -> Option<&'static Platform> {
    let alias = alias.to_lowercase();
    PLATFORMS
        .iter()
        .find(|p| p.aliases.contains(&alias.as_str()))
}

const PLATFORM_NAMES: &str = "linkedin|twitter|x|github|instagram|facebook|youtube";
const TAIL: &str = r"\s*[.!?]*$";

static LEADING_VERB: LazyLock<Regex> = LazyLock::new(|| {
    pattern(
        r"(?i)^(?:please\s+)?(?:find|show(?:\s+me)?|open|search(?:\s+for)?|look\s+up|go\s+to|visit|pull\s+up|get)\s+",
    )
});

/// Each pattern captures `name` and `platform`.
static PLATFORM_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // "<name>'s linkedin [profile]"
        r"^(?P<name>.+?)['’]s\s+(?P<platform>{P})(?:\s+(?:profile|page|account))?",
        // "linkedin profile of <name>"
        r"^(?P<platform>{P})\s+(?:page|profile)\s+(?:of|for)\s+(?P<name>.+?)",
        // "<name> linkedin profile"
        r"^(?P<name>.+?)\s+(?P<platform>{P})\s+(?:profile|page)",
        // "<name> on linkedin", once the leading verb is gone
        r"^(?P<name>.+?)\s+on\s+(?P<platform>{P})",
    ]
    .iter()
    .map(|re| pattern(&format!("(?i){}{TAIL}", re.replace("{P}", PLATFORM_NAMES))))
    .collect()
});

static SEARCH: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)^(?:please\s+)?(?:search\s+for|search|find|look\s+up|google)\s+(?P<query>.+)$")
});

static NAVIGATE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)^(?:please\s+)?(?:go\s+to|open|navigate\s+to|visit|browse\s+to)\s+(?P<target>.+)$")
});

/// Words that cannot stand alone as a person's name.
const NON_NAMES: &[&str] = &["the", "a", "my", "your", "their", "our", "his", "her"];

fn clean_fragment(s: &str) -> String {
    s.trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”' | '.' | '!' | '?' | ','))
        .trim()
        .to_string()
}

fn platform_plan(subject: &str) -> Option<ActionPlan> {
    PLATFORM_PATTERNS.iter().find_map(|re| {
        let caps = re.captures(subject)?;
        let target = platform(caps.name("platform")?.as_str())?;
        let name = clean_fragment(caps.name("name")?.as_str());
        if name.is_empty() || NON_NAMES.contains(&name.to_lowercase().as_str()) {
            return None;
        }

        let mut plan = ActionPlan::new(format!("find {name} on {}", target.name), vec![
            Action::Navigate {
                url: target.search_url.to_string(),
            },
            Action::Search { query: name },
            Action::Click {
                target: "first profile result".into(),
            },
        ]);
        plan.platform = Some(target.name.to_string());
        Some(plan)
    })
}

/// Deterministic plan for `command`, used whenever the model path is
/// unavailable or unusable. Every action it emits carries its required
/// field, so a blank command is the only input that yields an empty plan.
pub fn fallback_plan(command: &str) -> ActionPlan {
    let command = command.trim();
    if command.is_empty() {
        return ActionPlan::new("", Vec::new());
    }

    let subject = LEADING_VERB.replace(command, "");
    if let Some(plan) = platform_plan(&subject) {
        return plan;
    }

    if let Some(query) = SEARCH
        .captures(command)
        .and_then(|c| c.name("query"))
        .map(|m| clean_fragment(m.as_str()))
        .filter(|q| !q.is_empty())
    {
        return ActionPlan::new(format!("search for {query}"), vec![Action::Search {
            query,
        }]);
    }

    if let Some(url) = NAVIGATE
        .captures(command)
        .and_then(|c| c.name("target"))
        .map(|m| m.as_str().trim().trim_end_matches(['.', '!', '?', ',', ';']))
        .map(|target| match platform(&clean_fragment(target)) {
            Some(p) => p.home_url.to_string(),
            None => normalize_url(target),
        })
        .filter(|url| !url.is_empty())
    {
        return ActionPlan::new(format!("navigate to {url}"), vec![Action::Navigate {
            url,
        }]);
    }

    ActionPlan::new(format!("search for {command}"), vec![Action::Search {
        query: command.to_string(),
    }])
}
