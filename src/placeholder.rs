//! Placeholder marker syntax
//!
//! `{{name}}` substitutes inline, `{{name}}` alone in a block or row may open a
//! loop that `{{/name}}` closes, and names may be dotted paths or `this`.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

/// Text rendered for a placeholder that resolves to nothing printable
pub const FALLBACK: &str = "-";

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").unwrap());

static SOLE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\{\{\s*(/?)\s*([^{}/\s][^{}]*?)\s*\}\}\s*$").unwrap());

/// One placeholder occurrence inside a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderMatch {
    /// Byte range of the whole `{{...}}` marker
    pub range: Range<usize>,
    pub name: String,
}

/// A block-level marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker<'a> {
    /// `{{name}}`; a loop start when the name resolves to a set
    Start(&'a str),
    /// `{{/name}}`
    End(&'a str),
}

impl<'a> Marker<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Marker::Start(name) | Marker::End(name) => name,
        }
    }
}

/// Inline placeholders in order of appearance; end markers are left out
pub fn find_placeholders(text: &str) -> Vec<PlaceholderMatch> {
    PLACEHOLDER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str();
            if name.starts_with('/') {
                return None;
            }
            Some(PlaceholderMatch {
                range: whole.range(),
                name: name.to_string(),
            })
        })
        .collect()
}

pub fn has_placeholder(text: &str) -> bool {
    !find_placeholders(text).is_empty()
}

/// Classify a text consisting of exactly one marker
pub fn sole_marker(text: &str) -> Option<Marker<'_>> {
    let caps = SOLE_MARKER.captures(text)?;
    let name = caps.get(2)?.as_str();
    if caps.get(1).is_some_and(|slash| !slash.as_str().is_empty()) {
        Some(Marker::End(name))
    } else {
        Some(Marker::Start(name))
    }
}

/// Replace every inline placeholder independently
///
/// `resolve` returns `Ok(None)` for names with no printable value; those
/// render as `fallback`. Errors abort the replacement.
pub fn replace_inline<E, F>(text: &str, fallback: &str, mut resolve: F) -> Result<String, E>
where
    F: FnMut(&str) -> Result<Option<String>, E>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for found in find_placeholders(text) {
        out.push_str(&text[last..found.range.start]);
        match resolve(&found.name)? {
            Some(value) => out.push_str(&value),
            None => out.push_str(fallback),
        }
        last = found.range.end;
    }
    out.push_str(&text[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lookup(name: &str) -> Result<Option<String>, ()> {
        Ok(match name {
            "name" => Some("World".to_string()),
            "a.b" => Some("deep".to_string()),
            _ => None,
        })
    }

    #[test]
    fn test_inline_replacement() {
        let out = replace_inline("Hello {{name}}", FALLBACK, lookup).unwrap();
        assert_eq!(out, "Hello World");
    }

    #[test]
    fn test_each_occurrence_is_independent() {
        let out = replace_inline("{{name}}/{{ a.b }}/{{missing}}/{{name}}", FALLBACK, lookup).unwrap();
        assert_eq!(out, "World/deep/-/World");
    }

    #[test]
    fn test_end_markers_are_not_substituted() {
        let out = replace_inline("x {{/items}} y", FALLBACK, lookup).unwrap();
        assert_eq!(out, "x {{/items}} y");
    }

    #[test]
    fn test_sole_marker() {
        assert_eq!(sole_marker("{{items}}"), Some(Marker::Start("items")));
        assert_eq!(sole_marker("  {{ items }} "), Some(Marker::Start("items")));
        assert_eq!(sole_marker("{{/items}}"), Some(Marker::End("items")));
        assert_eq!(sole_marker("{{ / items }}"), Some(Marker::End("items")));
        assert_eq!(sole_marker("Total {{items}}"), None);
        assert_eq!(sole_marker("{{a}} {{b}}"), None);
    }

    #[test]
    fn test_match_ranges() {
        let found = find_placeholders("ab{{x}}cd");
        assert_eq!(
            found,
            vec![PlaceholderMatch {
                range: 2..7,
                name: "x".to_string()
            }]
        );
    }
}
