//! Wildcard pattern compilation and matching.
//!
//! `*` matches any run of characters, including none. Matching is
//! case-insensitive unless the pattern starts with `(?-i)`; a leading `(?i)`
//! is accepted and stripped.

use meterlink_core::error::{MeterlinkError, Result};

const CASE_SENSITIVE_PREFIX: &str = "(?-i)";
const CASE_INSENSITIVE_PREFIX: &str = "(?i)";

/// Compiled wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardMatcher {
    raw: String,
    case_sensitive: bool,
    /// Literal pieces between `*`; lowercased when case-insensitive.
    parts: Vec<String>,
}

impl WildcardMatcher {
    pub fn compile(raw: &str) -> Result<Self> {
        let (case_sensitive, body) = if let Some(rest) = raw.strip_prefix(CASE_SENSITIVE_PREFIX) {
            (true, rest)
        } else if let Some(rest) = raw.strip_prefix(CASE_INSENSITIVE_PREFIX) {
            (false, rest)
        } else {
            (false, raw)
        };

        if body.is_empty() {
            return Err(MeterlinkError::BadConfig(format!(
                "invalid disable_metrics entry: {raw:?} (empty pattern)"
            )));
        }

        let parts = body
            .split('*')
            .map(|p| if case_sensitive { p.to_string() } else { p.to_lowercase() })
            .collect();

        Ok(Self { raw: raw.to_string(), case_sensitive, parts })
    }

    /// The pattern as written in config.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, s: &str) -> bool {
        let lowered;
        let text = if self.case_sensitive {
            s
        } else {
            lowered = s.to_lowercase();
            lowered.as_str()
        };

        // no '*' at all
        let [first, middle @ .., last] = self.parts.as_slice() else {
            return self.parts.first().is_some_and(|p| p == text);
        };

        if text.len() < first.len() + last.len() {
            return false;
        }
        let Some(rest) = text.strip_prefix(first.as_str()) else { return false; };
        let Some(mut rest) = rest.strip_suffix(last.as_str()) else { return false; };

        for part in middle {
            match rest.find(part.as_str()) {
                Some(i) => rest = &rest[i + part.len()..],
                None => return false,
            }
        }
        true
    }
}
