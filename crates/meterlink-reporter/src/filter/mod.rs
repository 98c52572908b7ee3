//! Disabled-metric filter.
//!
//! Compiles `reporter.disable_metrics` into an ordered deny-list. The
//! collector consults it once per meter per tick.

pub mod wildcard;

use meterlink_core::error::Result;

pub use wildcard::WildcardMatcher;

/// Ordered deny-list of wildcard patterns. First match wins.
#[derive(Debug, Clone, Default)]
pub struct MetricFilter {
    rules: Vec<WildcardMatcher>,
}

impl MetricFilter {
    pub fn compile(raw: &[String]) -> Result<Self> {
        let mut rules = Vec::with_capacity(raw.len());
        for s in raw {
            rules.push(WildcardMatcher::compile(s)?);
        }
        Ok(Self { rules })
    }

    /// First pattern matching `name`, if any.
    pub fn first_match(&self, name: &str) -> Option<&WildcardMatcher> {
        self.rules.iter().find(|r| r.matches(name))
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.first_match(name).is_some()
    }

    /// A meter is disabled when a pattern matches either its name as
    /// registered or its sanitized export name.
    pub fn is_meter_disabled(&self, raw_name: &str, sanitized: &str) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        self.is_disabled(raw_name) || (raw_name != sanitized && self.is_disabled(sanitized))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
