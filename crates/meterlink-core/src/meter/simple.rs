//! In-memory leaf registry and its meters.
//!
//! Accumulators are atomics so hosts can record from any thread while the
//! reporter reads. A step-mode read swaps the accumulator back to zero.

use std::ops::AddAssign;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::{CountingMode, Measurement, Meter, MeterId, MeterKind, MeterRegistry, TagSet, TimeUnit};
use crate::error::ReadError;

/// f64 stored as raw bits. All-zero bits are `0.0`.
#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn add(&self, v: f64) {
        // The closure always returns Some, so this never fails.
        let _ = self.0.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
            Some((f64::from_bits(cur) + v).to_bits())
        });
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn take(&self) -> f64 {
        f64::from_bits(self.0.swap(0, Ordering::Relaxed))
    }
}

/// Event count and running total, updated and drained as one unit so a
/// step read never splits an event across two windows.
#[derive(Debug, Default)]
struct Tally<T> {
    inner: Mutex<(u64, T)>,
}

impl<T: Copy + Default + AddAssign> Tally<T> {
    fn record(&self, amount: T) {
        let mut g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        g.0 = g.0.saturating_add(1);
        g.1 += amount;
    }

    fn load(&self) -> (u64, T) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self, mode: CountingMode) -> (u64, T) {
        let mut g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match mode {
            CountingMode::Cumulative => *g,
            CountingMode::Step => std::mem::take(&mut *g),
        }
    }
}

fn read_f64(cell: &AtomicF64, mode: CountingMode) -> f64 {
    match mode {
        CountingMode::Cumulative => cell.load(),
        CountingMode::Step => cell.take(),
    }
}

/// Monotonic counter.
#[derive(Debug)]
pub struct Counter {
    id: MeterId,
    value: AtomicF64,
}

impl Counter {
    pub fn new(id: MeterId) -> Self {
        Self { id, value: AtomicF64::default() }
    }

    pub fn increment(&self) {
        self.add(1.0);
    }

    pub fn add(&self, amount: f64) {
        self.value.add(amount);
    }

    /// Current accumulated count (does not reset).
    pub fn count(&self) -> f64 {
        self.value.load()
    }
}

impl Meter for Counter {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn kind(&self) -> MeterKind {
        MeterKind::Counter
    }

    fn measure(&self, mode: CountingMode) -> Result<Measurement, ReadError> {
        Ok(Measurement::Value(read_f64(&self.value, mode)))
    }
}

/// Event timer: count and total time.
#[derive(Debug)]
pub struct Timer {
    id: MeterId,
    /// count, total nanoseconds
    tally: Tally<u64>,
}

impl Timer {
    pub fn new(id: MeterId) -> Self {
        Self { id, tally: Tally::default() }
    }

    pub fn record(&self, d: Duration) {
        self.tally.record(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
    }

    /// Run `f` and record how long it took.
    pub fn record_with<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let out = f();
        self.record(start.elapsed());
        out
    }

    pub fn count(&self) -> u64 {
        self.tally.load().0
    }

    pub fn total_time(&self) -> Duration {
        Duration::from_nanos(self.tally.load().1)
    }
}

impl Meter for Timer {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn kind(&self) -> MeterKind {
        MeterKind::Timer
    }

    fn measure(&self, mode: CountingMode) -> Result<Measurement, ReadError> {
        let (count, nanos) = self.tally.read(mode);
        Ok(Measurement::Timed {
            count: count as f64,
            total_micros: TimeUnit::Nanoseconds.to_micros(nanos as f64),
        })
    }
}

/// Distribution of unit-less amounts: count and total.
#[derive(Debug)]
pub struct DistributionSummary {
    id: MeterId,
    tally: Tally<f64>,
}

impl DistributionSummary {
    pub fn new(id: MeterId) -> Self {
        Self { id, tally: Tally::default() }
    }

    pub fn record(&self, amount: f64) {
        self.tally.record(amount);
    }

    pub fn count(&self) -> u64 {
        self.tally.load().0
    }

    pub fn total(&self) -> f64 {
        self.tally.load().1
    }
}

impl Meter for DistributionSummary {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn kind(&self) -> MeterKind {
        MeterKind::DistributionSummary
    }

    fn measure(&self, mode: CountingMode) -> Result<Measurement, ReadError> {
        let (count, total) = self.tally.read(mode);
        Ok(Measurement::Summary { count: count as f64, total })
    }
}

/// Tracks tasks that are still running: active count and their combined
/// elapsed time. Behaves like a gauge, so counting mode does not apply.
#[derive(Debug)]
pub struct LongTaskTimer {
    id: MeterId,
    active: DashMap<u64, Instant>,
    seq: AtomicU64,
}

impl LongTaskTimer {
    pub fn new(id: MeterId) -> Self {
        Self { id, active: DashMap::new(), seq: AtomicU64::new(1) }
    }

    /// Start tracking a task. Dropping the sample without `stop` keeps the
    /// task active.
    pub fn start(self: &Arc<Self>) -> LongTaskTimerSample {
        let task = self.seq.fetch_add(1, Ordering::Relaxed);
        self.active.insert(task, Instant::now());
        LongTaskTimerSample { timer: Arc::clone(self), task }
    }

    pub fn active_tasks(&self) -> usize {
        self.active.len()
    }

    /// Combined elapsed time of all active tasks.
    pub fn duration(&self) -> Duration {
        self.active.iter().map(|e| e.value().elapsed()).sum()
    }
}

impl Meter for LongTaskTimer {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn kind(&self) -> MeterKind {
        MeterKind::LongTaskTimer
    }

    fn measure(&self, _mode: CountingMode) -> Result<Measurement, ReadError> {
        Ok(Measurement::Timed {
            count: self.active_tasks() as f64,
            total_micros: self.duration().as_micros() as f64,
        })
    }
}

/// Handle to one running long task.
#[derive(Debug)]
pub struct LongTaskTimerSample {
    timer: Arc<LongTaskTimer>,
    task: u64,
}

impl LongTaskTimerSample {
    /// Stop the task and return how long it ran.
    pub fn stop(self) -> Duration {
        self.timer
            .active
            .remove(&self.task)
            .map(|(_, started)| started.elapsed())
            .unwrap_or_default()
    }
}

type ReadFn = Box<dyn Fn() -> Result<Measurement, ReadError> + Send + Sync>;

/// Meter backed by a caller-supplied value function (gauges, function
/// counters, function timers, time gauges). The host owns the underlying
/// state, so counting mode does not apply.
pub struct FunctionMeter {
    id: MeterId,
    kind: MeterKind,
    read: ReadFn,
}

impl FunctionMeter {
    pub fn new<F>(id: MeterId, kind: MeterKind, read: F) -> Self
    where
        F: Fn() -> Result<Measurement, ReadError> + Send + Sync + 'static,
    {
        Self { id, kind, read: Box::new(read) }
    }
}

impl std::fmt::Debug for FunctionMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionMeter")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Meter for FunctionMeter {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn kind(&self) -> MeterKind {
        self.kind
    }

    fn measure(&self, _mode: CountingMode) -> Result<Measurement, ReadError> {
        (self.read)()
    }
}

fn meter_id(name: &str, tags: &[(&str, &str)]) -> MeterId {
    MeterId::new(name, TagSet::from_pairs(tags))
}

/// Leaf registry. Asking twice for the same name and tags returns the
/// meter registered first.
#[derive(Debug, Default)]
pub struct SimpleRegistry {
    counters: DashMap<MeterId, Arc<Counter>>,
    timers: DashMap<MeterId, Arc<Timer>>,
    summaries: DashMap<MeterId, Arc<DistributionSummary>>,
    long_tasks: DashMap<MeterId, Arc<LongTaskTimer>>,
    functions: DashMap<MeterId, Arc<FunctionMeter>>,
}

impl SimpleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str, tags: &[(&str, &str)]) -> Arc<Counter> {
        let id = meter_id(name, tags);
        self.counters
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Counter::new(id)))
            .clone()
    }

    pub fn timer(&self, name: &str, tags: &[(&str, &str)]) -> Arc<Timer> {
        let id = meter_id(name, tags);
        self.timers
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Timer::new(id)))
            .clone()
    }

    pub fn summary(&self, name: &str, tags: &[(&str, &str)]) -> Arc<DistributionSummary> {
        let id = meter_id(name, tags);
        self.summaries
            .entry(id.clone())
            .or_insert_with(|| Arc::new(DistributionSummary::new(id)))
            .clone()
    }

    pub fn long_task_timer(&self, name: &str, tags: &[(&str, &str)]) -> Arc<LongTaskTimer> {
        let id = meter_id(name, tags);
        self.long_tasks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(LongTaskTimer::new(id)))
            .clone()
    }

    /// Gauge sampled from `f` on every read.
    pub fn gauge<F>(&self, name: &str, tags: &[(&str, &str)], f: F) -> Arc<FunctionMeter>
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.function(meter_id(name, tags), MeterKind::Gauge, move || Ok(Measurement::Value(f())))
    }

    /// Gauge whose value function may fail.
    pub fn try_gauge<F>(&self, name: &str, tags: &[(&str, &str)], f: F) -> Arc<FunctionMeter>
    where
        F: Fn() -> Result<f64, ReadError> + Send + Sync + 'static,
    {
        self.function(meter_id(name, tags), MeterKind::Gauge, move || f().map(Measurement::Value))
    }

    pub fn time_gauge<F>(&self, name: &str, tags: &[(&str, &str)], f: F) -> Arc<FunctionMeter>
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.function(meter_id(name, tags), MeterKind::TimeGauge, move || {
            Ok(Measurement::Value(f()))
        })
    }

    /// Counter whose count is owned by the host and read through `f`.
    pub fn function_counter<F>(&self, name: &str, tags: &[(&str, &str)], f: F) -> Arc<FunctionMeter>
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.function(meter_id(name, tags), MeterKind::FunctionCounter, move || {
            Ok(Measurement::Value(f()))
        })
    }

    /// Timer whose count and total are owned by the host. `total` is
    /// reported in `unit` and converted to microseconds.
    pub fn function_timer<C, T>(
        &self,
        name: &str,
        tags: &[(&str, &str)],
        count: C,
        total: T,
        unit: TimeUnit,
    ) -> Arc<FunctionMeter>
    where
        C: Fn() -> f64 + Send + Sync + 'static,
        T: Fn() -> f64 + Send + Sync + 'static,
    {
        self.function(meter_id(name, tags), MeterKind::FunctionTimer, move || {
            Ok(Measurement::Timed { count: count(), total_micros: unit.to_micros(total()) })
        })
    }

    /// Register an arbitrary value-function meter.
    pub fn function<F>(&self, id: MeterId, kind: MeterKind, read: F) -> Arc<FunctionMeter>
    where
        F: Fn() -> Result<Measurement, ReadError> + Send + Sync + 'static,
    {
        self.functions
            .entry(id.clone())
            .or_insert_with(|| Arc::new(FunctionMeter::new(id, kind, read)))
            .clone()
    }

    /// Remove every meter with this id. Returns whether anything was removed.
    pub fn remove(&self, id: &MeterId) -> bool {
        let mut removed = self.counters.remove(id).is_some();
        removed |= self.timers.remove(id).is_some();
        removed |= self.summaries.remove(id).is_some();
        removed |= self.long_tasks.remove(id).is_some();
        removed |= self.functions.remove(id).is_some();
        removed
    }
}

impl MeterRegistry for SimpleRegistry {
    fn meters(&self) -> Vec<Arc<dyn Meter>> {
        let mut out: Vec<Arc<dyn Meter>> = Vec::new();
        out.extend(self.counters.iter().map(|e| e.value().clone() as Arc<dyn Meter>));
        out.extend(self.timers.iter().map(|e| e.value().clone() as Arc<dyn Meter>));
        out.extend(self.summaries.iter().map(|e| e.value().clone() as Arc<dyn Meter>));
        out.extend(self.long_tasks.iter().map(|e| e.value().clone() as Arc<dyn Meter>));
        out.extend(self.functions.iter().map(|e| e.value().clone() as Arc<dyn Meter>));
        out
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::*;

    #[test]
    fn counter_step_read_drains() {
        let reg = SimpleRegistry::new();
        let c = reg.counter("counter", &[]);
        c.add(3.0);

        assert_eq!(c.measure(CountingMode::Cumulative).unwrap(), Measurement::Value(3.0));
        assert_eq!(c.measure(CountingMode::Step).unwrap(), Measurement::Value(3.0));
        assert_eq!(c.count(), 0.0);
    }

    #[test]
    fn same_id_returns_same_meter() {
        let reg = SimpleRegistry::new();
        let a = reg.counter("c", &[("foo", "bar")]);
        let b = reg.counter("c", &[("foo", "bar")]);
        a.increment();
        assert_eq!(b.count(), 1.0);
        assert_eq!(reg.meters().len(), 1);
    }

    #[test]
    fn timer_reports_micros() {
        let reg = SimpleRegistry::new();
        let t = reg.timer("timer", &[]);
        t.record(Duration::from_micros(1));
        t.record(Duration::from_micros(2));

        let m = t.measure(CountingMode::Cumulative).unwrap();
        assert_eq!(m, Measurement::Timed { count: 2.0, total_micros: 3.0 });
    }

    #[test]
    fn step_read_drains_count_and_total_together() {
        let reg = SimpleRegistry::new();
        let s = reg.summary("bytes", &[]);
        s.record(2.0);
        s.record(3.0);

        assert_eq!(s.measure(CountingMode::Step).unwrap(), Measurement::Summary { count: 2.0, total: 5.0 });
        assert_eq!(s.measure(CountingMode::Step).unwrap(), Measurement::Summary { count: 0.0, total: 0.0 });
    }

    #[test]
    fn concurrent_step_reads_never_split_an_event() {
        let reg = SimpleRegistry::new();
        let t = reg.timer("timer", &[]);

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let t = Arc::clone(&t);
                std::thread::spawn(move || {
                    for _ in 0..5_000 {
                        t.record(Duration::from_micros(5));
                    }
                })
            })
            .collect();

        let mut seen = 0.0;
        let drain = |seen: &mut f64| match t.measure(CountingMode::Step).unwrap() {
            Measurement::Timed { count, total_micros } => {
                assert_eq!(total_micros, count * 5.0);
                *seen += count;
            }
            other => panic!("unexpected measurement {other:?}"),
        };
        while writers.iter().any(|w| !w.is_finished()) {
            drain(&mut seen);
        }
        for w in writers {
            w.join().unwrap();
        }
        drain(&mut seen);
        assert_eq!(seen, 20_000.0);
    }

    #[test]
    fn long_task_timer_tracks_active_tasks() {
        let reg = SimpleRegistry::new();
        let ltt = reg.long_task_timer("job", &[]);
        let a = ltt.start();
        let _b = ltt.start();
        assert_eq!(ltt.active_tasks(), 2);

        a.stop();
        assert_eq!(ltt.active_tasks(), 1);
    }

    #[test]
    fn try_gauge_surfaces_read_error() {
        let reg = SimpleRegistry::new();
        let g = reg.try_gauge("broken", &[], || Err(ReadError::new("boom")));
        assert_eq!(g.measure(CountingMode::Cumulative).unwrap_err().reason, "boom");
    }

    #[test]
    fn remove_drops_meter() {
        let reg = SimpleRegistry::new();
        let g = reg.gauge("g", &[], || 1.0);
        assert!(reg.remove(g.id()));
        assert!(reg.meters().is_empty());
        assert!(!reg.remove(g.id()));
    }
}
