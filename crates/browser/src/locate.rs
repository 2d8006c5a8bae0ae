//! Element resolution strategies.
//!
//! A target is turned into an ordered list of [`Locator`]s that a single
//! page script walks in order. The first visible (and, when asked, editable)
//! match wins; it is scrolled into view and its center is returned for the
//! mouse click.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One way of finding an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Locator {
    Css { selector: String },
    /// Exact visible text (whitespace-normalized, case-insensitive).
    Text { text: String },
    AriaLabel { label: String },
    Title { title: String },
    /// Button whose text contains the value.
    ButtonText { text: String },
    /// Link whose text contains the value.
    LinkText { text: String },
    /// The `index`-th visible match of `selector`.
    Nth { selector: String, index: usize },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css {
            selector: selector.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css { selector } => f.write_str(selector),
            Self::Text { text } => write!(f, "text={text:?}"),
            Self::AriaLabel { label } => write!(f, "[aria-label={label:?}]"),
            Self::Title { title } => write!(f, "[title={title:?}]"),
            Self::ButtonText { text } => write!(f, "button:has-text({text:?})"),
            Self::LinkText { text } => write!(f, "a:has-text({text:?})"),
            Self::Nth { selector, index } => write!(f, "{selector} >> nth={index}"),
        }
    }
}

/// What the resolve script does with the winning element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Any visible element; caller clicks it.
    Click,
    /// Editable element; focused.
    Focus,
    /// Editable element; focused and emptied.
    FocusClear,
}

impl ResolveMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Focus => "focus",
            Self::FocusClear => "clear",
        }
    }
}

/// Output of [`resolve_script`].
#[derive(Debug, Clone, Deserialize)]
pub struct Resolved {
    pub found: bool,
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// One `<input>`/`<textarea>` on the page, reported when no search box
/// could be found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputInfo {
    pub selector: String,
    #[serde(default, rename = "type")]
    pub input_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub aria_label: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub readonly: bool,
}

impl fmt::Display for InputInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (type={:?} name={:?} id={:?} placeholder={:?} aria-label={:?} visible={} disabled={} readonly={})",
            self.selector,
            self.input_type,
            self.name,
            self.id,
            self.placeholder,
            self.aria_label,
            self.visible,
            self.disabled,
            self.readonly
        )
    }
}

/// Search-box strategies, most specific first.
pub const SEARCH_INPUT_SELECTORS: &[&str] = &[
    r#"input[name="q"]"#,
    r#"input[type="search"]"#,
    r#"input[placeholder*="search" i]"#,
    r#"input[aria-label*="search" i]"#,
    r#"[role="searchbox"]"#,
    r#"[role="combobox"]"#,
    r#"input[class*="search" i]"#,
    r#"input[id*="search" i]"#,
    r#"textarea[name="q"]"#,
    "textarea",
];

pub fn search_input_locators() -> Vec<Locator> {
    SEARCH_INPUT_SELECTORS
        .iter()
        .map(|s| Locator::css(*s))
        .collect()
}

/// Result-list patterns for ordinal clicks on common search and profile pages.
const RESULT_PATTERNS: &[&str] = &[
    "#search a h3",
    r#"[data-testid="result"] a[data-testid="result-title-a"]"#,
    "li.b_algo h2 a",
    "ytd-video-renderer a#video-title",
    ".search-result a",
    "main a[href] h3",
];

const PROFILE_PATTERNS: &[&str] = &[
    r#".search-results-container a[href*="/in/"]"#,
    r#"a[href*="/in/"]"#,
    r#"[data-testid="UserCell"] a"#,
    r#"a[data-hovercard-type="user"]"#,
    r#"a[href*="/channel/"], a[href*="/@"]"#,
];

const HTML_TAGS: &[&str] = &[
    "a", "article", "aside", "body", "button", "div", "footer", "form", "h1", "h2", "h3", "h4",
    "header", "iframe", "img", "input", "label", "li", "main", "nav", "ol", "option", "p",
    "section", "select", "span", "svg", "table", "tbody", "td", "textarea", "th", "tr", "ul",
];

/// Heuristic: does `target` read like a CSS selector rather than prose?
///
/// Selector punctuation (`.`, `#`, `[`, `>`) counts immediately. Otherwise
/// every whitespace-separated token has to be a bare HTML tag name.
pub fn looks_like_selector(target: &str) -> bool {
    let target = target.trim();
    if target.is_empty() {
        return false;
    }
    if target.contains(['.', '#', '[', '>']) {
        return true;
    }
    target
        .split_whitespace()
        .all(|token| HTML_TAGS.contains(&token.to_ascii_lowercase().as_str()))
}

const ORDINALS: &[(&str, usize)] = &[
    ("first", 0),
    ("1st", 0),
    ("second", 1),
    ("2nd", 1),
    ("third", 2),
    ("3rd", 2),
    ("fourth", 3),
    ("4th", 3),
    ("fifth", 4),
    ("5th", 4),
];

/// Ordinal position named in a phrase like "second link" or "first profile
/// result".
pub fn ordinal_index(target: &str) -> Option<usize> {
    let lower = target.to_ascii_lowercase();
    lower.split_whitespace().find_map(|word| {
        ORDINALS
            .iter()
            .find(|(name, _)| *name == word)
            .map(|(_, index)| *index)
    })
}

/// Ordered candidates for a click target.
pub fn click_locators(target: &str) -> Vec<Locator> {
    let target = target.trim();
    let mut locators = Vec::new();

    if looks_like_selector(target) {
        locators.push(Locator::css(target));
    }

    if let Some(index) = ordinal_index(target) {
        let lower = target.to_ascii_lowercase();
        let patterns = if lower.contains("profile") || lower.contains("user") {
            PROFILE_PATTERNS.iter().chain(RESULT_PATTERNS)
        } else {
            RESULT_PATTERNS.iter().chain(PROFILE_PATTERNS)
        };
        locators.extend(patterns.map(|selector| Locator::Nth {
            selector: (*selector).to_string(),
            index,
        }));
        if lower.contains("link") {
            locators.push(Locator::Nth {
                selector: "main a[href], #content a[href], a[href]".into(),
                index,
            });
        }
    }

    for label in text_labels(target) {
        locators.push(Locator::Text {
            text: label.clone(),
        });
        locators.push(Locator::AriaLabel {
            label: label.clone(),
        });
        locators.push(Locator::Title {
            title: label.clone(),
        });
        locators.push(Locator::ButtonText {
            text: label.clone(),
        });
        locators.push(Locator::LinkText { text: label });
    }

    locators.dedup();
    locators
}

/// The target itself plus a variant without quotes, a leading "the", and a
/// trailing element noun ("Sign in button" → "Sign in").
fn text_labels(target: &str) -> Vec<String> {
    let unquoted = target.trim_matches(|c| c == '"' || c == '\'').trim();
    let mut labels = vec![unquoted.to_string()];

    let mut short = unquoted;
    if let Some(rest) = strip_prefix_ignore_case(short, "the ") {
        short = rest;
    }
    for noun in [" button", " link", " tab", " icon"] {
        if let Some(rest) = strip_suffix_ignore_case(short, noun) {
            short = rest;
            break;
        }
    }
    let short = short.trim();
    if !short.is_empty() && short != unquoted {
        labels.push(short.to_string());
    }
    labels
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &s[prefix.len()..])
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let start = s.len().checked_sub(suffix.len())?;
    let tail = s.get(start..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &s[..start])
}

const RESOLVE_TEMPLATE: &str = r#"/* pilot:resolve */
(() => {
  const locators = __LOCATORS__;
  const mode = "__MODE__";
  const visible = (el) => {
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    return rect.width > 0 && rect.height > 0
      && style.visibility !== 'hidden' && style.display !== 'none';
  };
  const editable = (el) => {
    if (el.isContentEditable) return true;
    if (el.tagName !== 'INPUT' && el.tagName !== 'TEXTAREA') return false;
    return !el.disabled && !el.readOnly;
  };
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
  const all = (sel) => {
    try { return Array.from(document.querySelectorAll(sel)); } catch (_) { return []; }
  };
  const byText = (sel, want, exact) => all(sel).filter((el) => {
    const text = norm(el.innerText || el.value || '');
    return exact ? text === want : text.includes(want);
  });
  const byAttr = (attr, want) => all(`[${attr}]`).filter((el) => {
    const value = norm(el.getAttribute(attr));
    return value === want || value.includes(want);
  });
  const candidates = (loc) => {
    switch (loc.kind) {
      case 'css': return all(loc.selector);
      case 'nth': {
        const els = all(loc.selector).filter(visible);
        return els[loc.index] ? [els[loc.index]] : [];
      }
      case 'text': return byText(
        'a, button, [role="button"], [role="link"], input[type="submit"], input[type="button"], label, li, h1, h2, h3, span, div',
        norm(loc.text), true);
      case 'ariaLabel': return byAttr('aria-label', norm(loc.label));
      case 'title': return byAttr('title', norm(loc.title));
      case 'buttonText': return byText(
        'button, [role="button"], input[type="submit"], input[type="button"]', norm(loc.text), false);
      case 'linkText': return byText('a, [role="link"]', norm(loc.text), false);
      default: return [];
    }
  };
  for (let i = 0; i < locators.length; i++) {
    const el = candidates(locators[i]).find((el) => visible(el) && (mode === 'click' || editable(el)));
    if (!el) continue;
    el.scrollIntoView({ block: 'center', inline: 'center' });
    if (mode !== 'click') {
      el.focus();
      if (mode === 'clear') {
        if ('value' in el) {
          el.value = '';
          el.dispatchEvent(new Event('input', { bubbles: true }));
        } else {
          el.textContent = '';
        }
      }
    }
    const rect = el.getBoundingClientRect();
    return { found: true, index: i, x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 };
  }
  return { found: false };
})()"#;

/// Script that walks `locators` and returns a [`Resolved`].
pub fn resolve_script(locators: &[Locator], mode: ResolveMode) -> String {
    let encoded = serde_json::to_string(locators).unwrap_or_else(|_| "[]".into());
    RESOLVE_TEMPLATE
        .replace("__LOCATORS__", &encoded)
        .replace("__MODE__", mode.as_str())
}

/// Script listing every input and textarea as [`InputInfo`] records.
pub const INPUT_INVENTORY_SCRIPT: &str = r#"/* pilot:inputs */
(() => Array.from(document.querySelectorAll('input, textarea')).map((el) => {
  const rect = el.getBoundingClientRect();
  const style = window.getComputedStyle(el);
  let selector = el.tagName.toLowerCase();
  if (el.id) selector += `#${el.id}`;
  else if (el.name) selector += `[name="${el.name}"]`;
  return {
    selector,
    type: el.getAttribute('type') || (el.tagName === 'TEXTAREA' ? 'textarea' : 'text'),
    name: el.name || '',
    id: el.id || '',
    placeholder: el.getAttribute('placeholder') || '',
    ariaLabel: el.getAttribute('aria-label') || '',
    visible: rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none',
    disabled: !!el.disabled,
    readonly: !!el.readOnly,
  };
}))()"#;

/// Script returning whether the focused element accepts typing.
pub const ACTIVE_EDITABLE_SCRIPT: &str = r#"/* pilot:active-editable */
(() => {
  const el = document.activeElement;
  if (!el || el === document.body) return false;
  if (el.isContentEditable) return true;
  return (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA') && !el.disabled && !el.readOnly;
})()"#;

/// Script returning `{ readyState, resources }` for network-idle polling.
pub const NETWORK_PROBE_SCRIPT: &str = r#"/* pilot:network */
({ readyState: document.readyState, resources: performance.getEntriesByType('resource').length })"#;

pub const TITLE_SCRIPT: &str = "/* pilot:title */ document.title";
