//! Ways to locate an element on the host page.
//!
//! The host UI's structural identifiers and text are an unstable, versioned
//! external contract; callers build ordered strategy chains out of these
//! variants rather than relying on any single one.

use serde::{Deserialize, Serialize};

/// A single lookup criterion, or a `Chain` narrowing through descendants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "arg", rename_all = "snake_case")]
pub enum Selector {
    /// Match by element tag name (custom elements included).
    Tag(String),
    /// Match by element id.
    Id(String),
    /// Match elements carrying all of the space-separated class names.
    Class(String),
    /// Match by attribute name/value pair.
    Attr { name: String, value: String },
    /// Match elements whose text content contains the string.
    Text(String),
    /// Filter the current matches by visibility (rendered, non-zero size).
    Visible(bool),
    /// Narrow each step through the descendants of the previous step's
    /// matches.
    Chain(Vec<Selector>),
    /// An unparseable selector string, kept with the reason.
    Invalid(String),
}

impl Selector {
    /// The parse-failure reason, if this selector (or any chain step)
    /// is unusable. Backends reject these before querying.
    pub fn invalid_reason(&self) -> Option<&str> {
        match self {
            Selector::Invalid(reason) => Some(reason),
            Selector::Chain(parts) => parts.iter().find_map(Selector::invalid_reason),
            _ => None,
        }
    }

    /// Descend into a further criterion, flattening chains.
    pub fn then(self, next: impl Into<Selector>) -> Selector {
        let mut parts = match self {
            Selector::Chain(parts) => parts,
            single => vec![single],
        };
        match next.into() {
            Selector::Chain(mut more) => parts.append(&mut more),
            single => parts.push(single),
        }
        Selector::Chain(parts)
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();

        // Chained selectors first
        let parts: Vec<&str> = s.split(">>").map(|p| p.trim()).collect();
        if parts.len() > 1 {
            return Selector::Chain(parts.into_iter().map(Selector::from).collect());
        }

        match s {
            _ if s.starts_with("tag:") => Selector::Tag(s[4..].to_string()),
            _ if s.starts_with("id:") => Selector::Id(s[3..].to_string()),
            _ if s.starts_with('#') => Selector::Id(s[1..].to_string()),
            _ if s.starts_with("class:") => Selector::Class(s[6..].to_string()),
            _ if s.starts_with('.') => Selector::Class(s[1..].to_string()),
            _ if s.starts_with("text:") => Selector::Text(s[5..].to_string()),
            _ if s.starts_with("attr:") => {
                let body = &s[5..];
                match body.split_once('=') {
                    Some((name, value)) => Selector::Attr {
                        name: name.trim().to_string(),
                        value: value.trim().to_string(),
                    },
                    None => Selector::Invalid(format!(
                        "attr selector needs name=value, got {body:?}"
                    )),
                }
            }
            _ if s.to_lowercase().starts_with("visible:") => {
                Selector::Visible(s[8..].trim().eq_ignore_ascii_case("true"))
            }
            // Bare words are tag names; the host page is full of custom
            // elements, so this is the common case.
            _ if !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '-') => {
                Selector::Tag(s.to_string())
            }
            _ => Selector::Invalid(format!(
                "unknown selector format {s:?}; use 'tag:', '#id', '.class', 'attr:name=value', 'text:' or 'visible:'"
            )),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_word_is_tag() {
        assert_eq!(
            Selector::from("ytcp-dropdown-trigger"),
            Selector::Tag("ytcp-dropdown-trigger".into())
        );
    }

    #[test]
    fn hash_and_dot_shorthands() {
        assert_eq!(Selector::from("#apply-button"), Selector::Id("apply-button".into()));
        assert_eq!(Selector::from(".line-series"), Selector::Class("line-series".into()));
    }

    #[test]
    fn attr_selector_parses_pair() {
        assert_eq!(
            Selector::from("attr:test-id=fixed"),
            Selector::Attr {
                name: "test-id".into(),
                value: "fixed".into()
            }
        );
    }

    #[test]
    fn chain_splits_on_double_angle() {
        let sel = Selector::from("ytcp-date-period-picker >> #start-date >> tag:input");
        assert_eq!(
            sel,
            Selector::Chain(vec![
                Selector::Tag("ytcp-date-period-picker".into()),
                Selector::Id("start-date".into()),
                Selector::Tag("input".into()),
            ])
        );
    }

    #[test]
    fn then_flattens_chains() {
        let sel = Selector::from("svg").then(Selector::from(".x axis >> .tick"));
        assert_eq!(
            sel,
            Selector::Chain(vec![
                Selector::Tag("svg".into()),
                Selector::Class("x axis".into()),
                Selector::Class("tick".into()),
            ])
        );
    }

    #[test]
    fn garbage_becomes_invalid() {
        assert!(matches!(Selector::from("%%nope"), Selector::Invalid(_)));
    }
}
