//! Meter and registry capability contracts.
//!
//! The reporter never owns meters. It only observes registries through the
//! [`MeterRegistry`] trait and reads values through [`Meter::measure`]. Hosts
//! can bring their own implementations or use the in-memory ones in
//! [`simple`] and [`composite`].

pub mod composite;
pub mod simple;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ReadError;

pub use composite::CompositeRegistry;
pub use simple::{
    Counter, DistributionSummary, FunctionMeter, LongTaskTimer, LongTaskTimerSample, SimpleRegistry,
    Timer,
};

/// Tag set with set semantics: keys are unique and order is irrelevant.
///
/// Backed by a `BTreeMap` so equality, hashing and iteration are
/// deterministic regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build from borrowed pairs. A repeated key keeps the last value.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Meter identity: name plus tag set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeterId {
    pub name: String,
    pub tags: TagSet,
}

impl MeterId {
    pub fn new(name: impl Into<String>, tags: TagSet) -> Self {
        Self { name: name.into(), tags }
    }
}

impl fmt::Display for MeterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.tags.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (i, (k, v)) in self.tags.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}")
    }
}

/// Kind tag carried by every meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterKind {
    Counter,
    FunctionCounter,
    Gauge,
    TimeGauge,
    Timer,
    FunctionTimer,
    LongTaskTimer,
    DistributionSummary,
}

impl MeterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MeterKind::Counter => "counter",
            MeterKind::FunctionCounter => "function_counter",
            MeterKind::Gauge => "gauge",
            MeterKind::TimeGauge => "time_gauge",
            MeterKind::Timer => "timer",
            MeterKind::FunctionTimer => "function_timer",
            MeterKind::LongTaskTimer => "long_task_timer",
            MeterKind::DistributionSummary => "distribution_summary",
        }
    }
}

/// Counting discipline of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountingMode {
    /// Monotonic, never reset.
    #[default]
    Cumulative,
    /// Only the most recently closed window; accumulators reset on read.
    Step,
}

/// Unit used by function timers to report their total time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
}

impl TimeUnit {
    pub fn to_micros(self, amount: f64) -> f64 {
        match self {
            TimeUnit::Nanoseconds => amount / 1_000.0,
            TimeUnit::Microseconds => amount,
            TimeUnit::Milliseconds => amount * 1_000.0,
            TimeUnit::Seconds => amount * 1_000_000.0,
        }
    }
}

/// One read of a meter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    /// Counters and gauges: a single value.
    Value(f64),
    /// Timers and long-task timers. Total is in microseconds.
    Timed { count: f64, total_micros: f64 },
    /// Distribution summaries. Total is unit-less.
    Summary { count: f64, total: f64 },
}

/// A named, tagged measurement source.
pub trait Meter: Send + Sync {
    fn id(&self) -> &MeterId;

    fn kind(&self) -> MeterKind;

    /// Read the current value.
    ///
    /// With [`CountingMode::Step`] accumulating meters hand out the value of
    /// the window being closed and restart from zero. Gauges ignore the mode.
    fn measure(&self, mode: CountingMode) -> Result<Measurement, ReadError>;
}

/// A container of meters, or (composite) of child registries.
pub trait MeterRegistry: Send + Sync {
    /// Child registries when this is a composite, `None` for a leaf.
    fn children(&self) -> Option<Vec<Arc<dyn MeterRegistry>>> {
        None
    }

    /// Meters currently present. Composites own none.
    fn meters(&self) -> Vec<Arc<dyn Meter>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_set_ignores_insertion_order() {
        let a = TagSet::from_pairs(&[("foo", "bar"), ("baz", "qux")]);
        let b = TagSet::from_pairs(&[("baz", "qux"), ("foo", "bar")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn tag_set_keys_are_unique() {
        let t = TagSet::from_pairs(&[("foo", "one"), ("foo", "two")]);
        assert_eq!(t.len(), 1);
        assert_eq!(t.get("foo"), Some("two"));
    }

    #[test]
    fn meter_id_display() {
        let id = MeterId::new("http.requests", TagSet::from_pairs(&[("uri", "/"), ("code", "200")]));
        assert_eq!(id.to_string(), "http.requests{code=200,uri=/}");
        assert_eq!(MeterId::new("up", TagSet::new()).to_string(), "up");
    }

    #[test]
    fn time_unit_conversion() {
        assert_eq!(TimeUnit::Milliseconds.to_micros(2.0), 2_000.0);
        assert_eq!(TimeUnit::Nanoseconds.to_micros(3_000.0), 3.0);
        assert_eq!(TimeUnit::Seconds.to_micros(1.5), 1_500_000.0);
    }
}
