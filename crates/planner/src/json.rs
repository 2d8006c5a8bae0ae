//! JSON object extraction from free-form model output.

use serde_json::Value;

/// Return the first balanced `{...}` in `text` that parses as a JSON object.
///
/// Brace matching ignores braces inside strings and honors escapes. A
/// balanced candidate that fails to parse is skipped and the scan resumes
/// after it.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let mut offset = 0;
    while let Some(found) = text[offset..].find('{') {
        let start = offset + found;
        match balanced_len(&text[start..]) {
            Some(len) => {
                let candidate = &text[start..start + len];
                if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
                    return Some(value);
                }
                offset = start + len;
            },
            // Never closes; a later brace might still open a complete object.
            None => offset = start + 1,
        }
    }
    None
}

/// Byte length of the balanced object starting at `s[0] == '{'`.
fn balanced_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {},
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            },
            _ => {},
        }
    }
    None
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_from_prose() {
        let text = "Here is the plan:\n```json\n{\"intent\": \"open\", \"actions\": []}\n```\nDone.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["intent"], "open");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_matching() {
        let text = r#"{"intent": "type {curly} \"quoted }\"", "actions": [{"type": "extract"}]}"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["intent"], "type {curly} \"quoted }\"");
        assert_eq!(value["actions"][0]["type"], "extract");
    }

    #[test]
    fn skips_unparseable_candidate() {
        let text = r#"{not json} then {"intent": "ok", "actions": []}"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["intent"], "ok");
    }

    #[test]
    fn unterminated_object_yields_none() {
        assert!(extract_json_object(r#"{"intent": "open", "actions": ["#).is_none());
        assert!(extract_json_object("no braces at all").is_none());
    }

    #[test]
    fn multibyte_text_is_handled() {
        let text = "Plan → {\"intent\": \"café ☕\", \"actions\": []}";
        assert_eq!(extract_json_object(text).unwrap()["intent"], "café ☕");
    }
}
