//! Tick collector.
//!
//! A tick runs in two phases. `plan` decides, under the reporter's tick
//! lock, which leaf registries are read and which are still inside an open
//! step window; it never calls host code. `collect` then walks the plan
//! with no engine lock held: it filters and sanitizes names, reads each
//! meter behind a guard, and groups the surviving samples into metric sets
//! keyed by exact tag-set equality. A failing meter only loses its own
//! samples; the rest of the tick goes on.
//!
//! When two meters produce the same sample name under the same tag set, the
//! one from the earlier registered registry wins and the other is counted as
//! shadowed.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use meterlink_core::meter::{CountingMode, Measurement, Meter, MeterRegistry, TagSet};
use meterlink_core::protocol::record::{MetricSetRecord, SampleValue};
use meterlink_core::ReadError;

use crate::failure::{FailureTracker, MeterKey};
use crate::filter::MetricFilter;
use crate::registrar::{RegistryKey, RegistryRegistrar};
use crate::sanitize::Sanitizer;
use crate::step::{StepConfigResolver, StepWindows};

const COUNT_SUFFIX: &str = ".count";
const SUM_SUFFIX: &str = ".sum";
const SUM_MICROS_SUFFIX: &str = ".sum.us";

/// Samples sharing one exact tag set, built fresh every tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSet {
    /// Sanitized tag key -> original value.
    pub tags: BTreeMap<String, String>,
    /// Sample name -> finite value.
    pub samples: BTreeMap<String, f64>,
}

impl MetricSet {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Wire record stamped with `now_ms` (encoded as epoch microseconds).
    pub fn to_record(&self, now_ms: u64) -> MetricSetRecord {
        MetricSetRecord {
            tags: self.tags.clone(),
            samples: self
                .samples
                .iter()
                .map(|(k, v)| (k.clone(), SampleValue { value: *v }))
                .collect(),
            timestamp: now_ms.saturating_mul(1_000),
        }
    }
}

/// Outcome counters of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Records handed to the sink.
    pub sets: usize,
    /// Samples across those records.
    pub samples: usize,
    /// Meters whose read failed.
    pub failed: usize,
    /// Meters skipped by the disabled-metrics filter.
    pub disabled: usize,
    /// Meters skipped because their step window is still open.
    pub gated: usize,
    /// Meters whose samples lost to an earlier meter with the same sample
    /// name and tags.
    pub shadowed: usize,
}

/// Metric sets of one tick plus what happened along the way. `sets` and
/// `samples` of the summary are left for the emitter to fill in.
#[derive(Debug, Default)]
pub struct Collection {
    pub sets: Vec<MetricSet>,
    pub summary: TickSummary,
}

/// What one tick does with one tracked leaf registry.
pub struct LeafPlan {
    pub key: RegistryKey,
    pub registry: Arc<dyn MeterRegistry>,
    pub mode: CountingMode,
    /// Step window still open: nothing is read this tick.
    pub gated: bool,
}

/// Per-tick view over the reporter's components.
pub struct Collector<'a> {
    pub global_interval_ms: u64,
    pub sanitizer: Sanitizer,
    pub filter: &'a MetricFilter,
    pub registrar: &'a RegistryRegistrar,
    pub steps: &'a StepConfigResolver,
    pub failures: &'a FailureTracker,
}

impl Collector<'_> {
    /// Resolve every tracked leaf and close the step windows that are due.
    /// `seed_ms` starts the window of a step registry seen for the first time.
    pub fn plan(&self, windows: &mut StepWindows, seed_ms: u64, now_ms: u64) -> Vec<LeafPlan> {
        let plan: Vec<LeafPlan> = self
            .registrar
            .leaves()
            .into_iter()
            .map(|(key, registry)| {
                let cfg = self.steps.resolve(key, self.global_interval_ms);
                let gated = cfg.mode == CountingMode::Step
                    && !windows.try_close(key, cfg.step_ms, seed_ms, now_ms);
                LeafPlan { key, registry, mode: cfg.mode, gated }
            })
            .collect();
        windows.retain(|k| plan.iter().any(|p| p.key == k));
        plan
    }

    /// Read and group everything `plan` lets through.
    pub fn collect(&self, plan: &[LeafPlan], now_ms: u64) -> Collection {
        let mut summary = TickSummary::default();
        let mut groups: HashMap<TagSet, BTreeMap<String, f64>> = HashMap::new();
        let mut seen: HashSet<MeterKey> = HashSet::new();

        for leaf in plan {
            let meters = leaf.registry.meters();

            if leaf.gated {
                summary.gated += meters.len();
                seen.extend(meters.iter().map(|m| (leaf.key, m.id().clone())));
                continue;
            }

            for meter in &meters {
                let id = meter.id();
                seen.insert((leaf.key, id.clone()));

                let name = self.sanitizer.sanitize(&id.name);
                if self.filter.is_meter_disabled(&id.name, &name) {
                    summary.disabled += 1;
                    continue;
                }

                match read_guarded(meter.as_ref(), leaf.mode) {
                    Ok(m) => {
                        self.failures.record_success(leaf.key, id);
                        let samples = groups.entry(id.tags.clone()).or_default();
                        if !push_samples(samples, &name, m) {
                            summary.shadowed += 1;
                            tracing::debug!(meter = %id, "sample name already taken in this metric set; dropped");
                        }
                    }
                    Err(e) => {
                        self.failures.record_failure(leaf.key, id, e, now_ms);
                        summary.failed += 1;
                    }
                }
            }
        }

        self.failures.retain_seen(&seen);

        let mut sets: Vec<MetricSet> = groups
            .into_iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(tags, samples)| MetricSet { tags: self.sanitize_tags(&tags), samples })
            .collect();
        sets.sort_by(|a, b| a.tags.cmp(&b.tags));

        Collection { sets, summary }
    }

    fn sanitize_tags(&self, tags: &TagSet) -> BTreeMap<String, String> {
        tags.iter()
            .map(|(k, v)| (self.sanitizer.sanitize(k).into_owned(), v.to_string()))
            .collect()
    }
}

/// Read a meter, turning a panic in host code into a `ReadError`.
pub fn read_guarded(meter: &dyn Meter, mode: CountingMode) -> Result<Measurement, ReadError> {
    match panic::catch_unwind(AssertUnwindSafe(|| meter.measure(mode))) {
        Ok(res) => res,
        Err(payload) => Err(ReadError::new(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Map one measurement to its samples. Non-finite values produce nothing;
/// a count and its total are kept or dropped together. Returns false when
/// a sample name is already taken, in which case nothing is inserted.
fn push_samples(out: &mut BTreeMap<String, f64>, name: &str, m: Measurement) -> bool {
    match m {
        Measurement::Value(v) => {
            if !v.is_finite() {
                return true;
            }
            if out.contains_key(name) {
                return false;
            }
            out.insert(name.to_string(), v);
            true
        }
        Measurement::Timed { count, total_micros } => {
            push_pair(out, name, count, SUM_MICROS_SUFFIX, total_micros)
        }
        Measurement::Summary { count, total } => push_pair(out, name, count, SUM_SUFFIX, total),
    }
}

fn push_pair(out: &mut BTreeMap<String, f64>, name: &str, count: f64, suffix: &str, total: f64) -> bool {
    if !(count.is_finite() && total.is_finite()) {
        return true;
    }
    let count_name = format!("{name}{COUNT_SUFFIX}");
    let total_name = format!("{name}{suffix}");
    if out.contains_key(&count_name) || out.contains_key(&total_name) {
        return false;
    }
    out.insert(count_name, count);
    out.insert(total_name, total);
    true
}
