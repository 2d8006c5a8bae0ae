//! `${VAR}` and `${VAR:-fallback}` expansion for raw config text.

/// Expand placeholders against the process environment.
///
/// Unset variables without a fallback keep their placeholder so validation
/// can point at them later.
pub fn substitute_env(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

/// Expansion with an injectable lookup so tests don't touch the real env.
pub(crate) fn expand_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated, emit the remainder verbatim.
            out.push_str(&rest[start..]);
            return out;
        };

        let body = &after[..end];
        let (name, fallback) = match body.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (body, None),
        };

        let value = if name.is_empty() {
            None
        } else {
            lookup(name)
                .filter(|v| !v.is_empty())
                .or_else(|| fallback.map(String::from))
        };

        match value {
            Some(value) => out.push_str(&value),
            None => {
                out.push_str("${");
                out.push_str(body);
                out.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// True when the value still contains an unexpanded `${...}` placeholder.
pub fn has_placeholder(value: &str) -> bool {
    value
        .find("${")
        .is_some_and(|start| value[start..].contains('}'))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "PILOT_TEST_KEY" => Some("bb_live_123".into()),
            "PILOT_EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn expands_known_variable() {
        assert_eq!(
            expand_with("api_key = \"${PILOT_TEST_KEY}\"", lookup),
            "api_key = \"bb_live_123\""
        );
    }

    #[test]
    fn keeps_unknown_placeholder() {
        assert_eq!(expand_with("${PILOT_MISSING}", lookup), "${PILOT_MISSING}");
        assert!(has_placeholder("${PILOT_MISSING}"));
    }

    #[test]
    fn uses_fallback_for_missing_or_empty() {
        assert_eq!(expand_with("${PILOT_MISSING:-8787}", lookup), "8787");
        assert_eq!(expand_with("${PILOT_EMPTY:-x}", lookup), "x");
    }

    #[test]
    fn unterminated_is_literal() {
        assert_eq!(expand_with("a ${OOPS", lookup), "a ${OOPS");
        assert!(!has_placeholder("a ${OOPS"));
    }

    #[test]
    fn plain_text_untouched() {
        assert_eq!(substitute_env("bind = \"127.0.0.1\""), "bind = \"127.0.0.1\"");
    }
}
