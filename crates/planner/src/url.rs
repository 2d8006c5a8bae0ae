use std::sync::LazyLock;

use regex::Regex;

static SCHEME: LazyLock<Regex> = LazyLock::new(|| crate::intent::pattern(r"^[a-zA-Z][a-zA-Z0-9+.-]*://"));

/// Turn a user- or model-supplied target into a navigable URL.
///
/// Leading noise (quotes, brackets) is dropped together with its closing
/// partner. Anything with an explicit scheme is otherwise kept as-is; a bare
/// host also loses trailing sentence punctuation and gets `https://`.
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    let start = trimmed
        .find(|c: char| c.is_alphanumeric())
        .unwrap_or(trimmed.len());
    let (noise, mut rest) = trimmed.split_at(start);
    for opener in noise.chars().rev() {
        if let Some(closer) = closing_partner(opener) {
            rest = rest.strip_suffix(closer).unwrap_or(rest);
        }
    }

    if SCHEME.is_match(rest) || rest.starts_with("about:") {
        return rest.to_string();
    }

    let host = rest.trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '"', '\'', '>', ']']);
    if host.is_empty() {
        return String::new();
    }
    format!("https://{host}")
}

fn closing_partner(opener: char) -> Option<char> {
    match opener {
        '<' => Some('>'),
        '(' => Some(')'),
        '[' => Some(']'),
        '"' => Some('"'),
        '\'' => Some('\''),
        '“' => Some('”'),
        _ => None,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_https_to_bare_domain() {
        assert_eq!(normalize_url("openai.com"), "https://openai.com");
        assert_eq!(normalize_url("  github.com/rust-lang  "), "https://github.com/rust-lang");
    }

    #[test]
    fn keeps_existing_scheme() {
        assert_eq!(normalize_url("https://x.com"), "https://x.com");
        assert_eq!(normalize_url("http://localhost:3000"), "http://localhost:3000");
        assert_eq!(normalize_url("about:blank"), "about:blank");
    }

    #[test]
    fn schemed_url_keeps_trailing_characters() {
        assert_eq!(
            normalize_url("https://en.wikipedia.org/wiki/Rust_(programming_language)"),
            "https://en.wikipedia.org/wiki/Rust_(programming_language)"
        );
        assert_eq!(
            normalize_url("https://example.com/search?q=a:"),
            "https://example.com/search?q=a:"
        );
        assert_eq!(
            normalize_url("(https://example.com/a_(b))"),
            "https://example.com/a_(b)"
        );
    }

    #[test]
    fn strips_noise_and_punctuation() {
        assert_eq!(normalize_url("\"openai.com\"."), "https://openai.com");
        assert_eq!(normalize_url("<https://example.org>"), "https://example.org");
        assert_eq!(normalize_url("wikipedia.org!"), "https://wikipedia.org");
    }

    #[test]
    fn port_without_scheme_is_not_a_scheme() {
        assert_eq!(normalize_url("localhost:8080"), "https://localhost:8080");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(normalize_url("  ..  "), "");
    }
}
