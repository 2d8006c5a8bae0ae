/// System prompt constraining the model to the action-plan schema.
pub const SYSTEM_PROMPT: &str = r#"You convert a user's request into browser actions for a remote Chrome session.

Respond with ONE JSON object and nothing else:
{
  "intent": "short summary of what the user wants",
  "platform": "linkedin | twitter | github | instagram | facebook | youtube (omit if none)",
  "actions": [ ... ],
  "reasoning": "one sentence on why these actions"
}

Each action is an object with a "type" field:
- {"type": "navigate", "url": "https://..."}          load a page
- {"type": "search", "query": "..."}                  type into the page's search box and submit
- {"type": "click", "target": "..."}                  CSS selector or a description such as "first profile result"
- {"type": "type", "text": "...", "selector": "..."}  selector is optional; omit it to type into the focused field
- {"type": "scroll", "direction": "up | down | top | bottom"}
- {"type": "wait", "durationMs": 2000}
- {"type": "extract"}                                 capture the current page

Rules:
- Use full URLs with https://.
- Prefer a site's own search page over a general web search when the user names a site.
- Keep plans short; do not invent credentials or log in.
- Never include comments or trailing commas in the JSON."#;

/// User turn for a command.
pub fn user_prompt(command: &str) -> String {
    format!("Request: {}", command.trim())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_every_action_type() {
        for kind in [
            "navigate", "search", "click", "type", "scroll", "wait", "extract",
        ] {
            assert!(
                SYSTEM_PROMPT.contains(&format!("\"type\": \"{kind}\"")),
                "missing {kind}"
            );
        }
    }

    #[test]
    fn user_prompt_trims() {
        assert_eq!(user_prompt("  go to x.com \n"), "Request: go to x.com");
    }
}
