//! Metrics reporter: the engine a scheduler (or a test) drives with `run`.
//!
//! Construct once, share via `Arc`. Registration, step association and
//! config updates can happen from any thread while a tick is in flight.
//! Only one tick runs at a time: a `run` that starts while another is in
//! flight returns an empty summary. The rolling time state is locked only
//! while a tick plans and commits; meters and the sink are called with no
//! engine lock held, so value functions may call back into the reporter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use meterlink_core::error::Result;
use meterlink_core::meter::MeterRegistry;

use crate::collector::{Collector, TickSummary};
use crate::config::ReporterSection;
use crate::emit::{Emitter, Sink};
use crate::failure::{FailureRecord, FailureTracker};
use crate::filter::MetricFilter;
use crate::registrar::{flatten_leaves, RegistryKey, RegistryRegistrar};
use crate::sanitize::Sanitizer;
use crate::step::{StepConfig, StepConfigResolver, StepWindows};

/// Compiled runtime settings. Replaced as a whole on config update; each
/// tick works on the snapshot it read at its start.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Global export interval; 0 disables collection.
    pub interval_ms: u64,
    pub sanitizer: Sanitizer,
    pub filter: MetricFilter,
}

impl Settings {
    pub fn from_section(section: &ReporterSection) -> Result<Self> {
        section.validate()?;
        Ok(Self {
            interval_ms: section.metrics_interval_ms,
            sanitizer: Sanitizer::new(section.dedot_custom_metrics),
            filter: MetricFilter::compile(&section.disable_metrics)?,
        })
    }
}

#[derive(Debug, Default)]
struct TickState {
    last_run: Option<u64>,
    windows: StepWindows,
}

/// Marks a tick in flight; cleared on drop, unwinding included.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct MetricsReporter {
    settings: RwLock<Arc<Settings>>,
    registrar: RegistryRegistrar,
    steps: StepConfigResolver,
    failures: FailureTracker,
    emitter: Emitter,
    state: Mutex<TickState>,
    in_flight: AtomicBool,
}

impl MetricsReporter {
    pub fn new(section: &ReporterSection, sink: Arc<dyn Sink>) -> Result<Self> {
        Ok(Self::with_settings(Settings::from_section(section)?, sink))
    }

    pub fn with_settings(settings: Settings, sink: Arc<dyn Sink>) -> Self {
        Self {
            settings: RwLock::new(Arc::new(settings)),
            registrar: RegistryRegistrar::new(),
            steps: StepConfigResolver::new(),
            failures: FailureTracker::new(),
            emitter: Emitter::new(sink),
            state: Mutex::new(TickState::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, TickState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> Arc<Settings> {
        Arc::clone(&self.settings.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in new settings; takes effect from the next tick.
    pub fn update_config(&self, section: &ReporterSection) -> Result<()> {
        let next = Arc::new(Settings::from_section(section)?);
        tracing::info!(
            interval_ms = next.interval_ms,
            dedot = next.sanitizer.dedot(),
            disabled_patterns = next.filter.len(),
            "reporter config updated"
        );
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = next;
        Ok(())
    }

    /// Run one collection cycle at wall-clock `now_ms`.
    ///
    /// Never fails: meter-level errors are recorded and the cycle goes on.
    pub fn run(&self, now_ms: u64) -> TickSummary {
        let settings = self.settings();
        if settings.interval_ms == 0 {
            tracing::debug!("metrics interval is 0; collection disabled");
            return TickSummary::default();
        }
        let Some(_flight) = InFlight::claim(&self.in_flight) else {
            tracing::debug!(now_ms, "metrics tick already in flight; skipped");
            return TickSummary::default();
        };

        let collector = Collector {
            global_interval_ms: settings.interval_ms,
            sanitizer: settings.sanitizer,
            filter: &settings.filter,
            registrar: &self.registrar,
            steps: &self.steps,
            failures: &self.failures,
        };
        let plan = {
            let mut state = self.state();
            let seed_ms = state.last_run.unwrap_or(now_ms);
            collector.plan(&mut state.windows, seed_ms, now_ms)
        };
        let collection = collector.collect(&plan, now_ms);

        let mut summary = collection.summary;
        for set in &collection.sets {
            if self.emitter.emit(set, now_ms) {
                summary.sets += 1;
                summary.samples += set.samples.len();
            }
        }
        self.state().last_run = Some(now_ms);

        tracing::debug!(
            now_ms,
            sets = summary.sets,
            samples = summary.samples,
            failed = summary.failed,
            disabled = summary.disabled,
            gated = summary.gated,
            shadowed = summary.shadowed,
            "metrics tick done"
        );
        summary
    }

    /// Force the last-run time without collecting.
    pub fn reset_now(&self, now_ms: u64) {
        self.state().last_run = Some(now_ms);
    }

    pub fn last_run(&self) -> Option<u64> {
        self.state().last_run
    }

    /// Track `registry`, or every leaf below it when it is a composite.
    pub fn register_registry(&self, registry: Arc<dyn MeterRegistry>) {
        self.registrar.register(registry);
    }

    /// Stop tracking `registry` (or its leaves) and forget their step state.
    pub fn unregister_registry(&self, registry: &Arc<dyn MeterRegistry>) {
        let removed = self.registrar.unregister(registry);
        if removed.is_empty() {
            return;
        }
        let mut state = self.state();
        for key in removed {
            self.steps.dissociate(key);
            state.windows.forget(key);
        }
    }

    /// Give `registry` (or every leaf below a composite) its own counting
    /// mode and step. The window restarts at the next tick's previous run.
    pub fn associate_step_config(&self, registry: &Arc<dyn MeterRegistry>, config: StepConfig) -> Result<()> {
        self.associate(registry, config, None)
    }

    /// Like [`associate_step_config`](Self::associate_step_config), with the
    /// first window starting at `now_ms`.
    pub fn associate_step_config_at(
        &self,
        registry: &Arc<dyn MeterRegistry>,
        config: StepConfig,
        now_ms: u64,
    ) -> Result<()> {
        self.associate(registry, config, Some(now_ms))
    }

    fn associate(&self, registry: &Arc<dyn MeterRegistry>, config: StepConfig, start_ms: Option<u64>) -> Result<()> {
        config.validate()?;
        let mut state = self.state();
        for leaf in flatten_leaves(registry) {
            let key = RegistryKey::of(&leaf);
            self.steps.associate(key, config)?;
            match start_ms {
                Some(at) => state.windows.seed(key, at),
                None => state.windows.forget(key),
            }
        }
        Ok(())
    }

    pub fn is_tracked(&self, registry: &Arc<dyn MeterRegistry>) -> bool {
        self.registrar.is_tracked(registry)
    }

    /// Currently tracked leaf registries.
    pub fn tracked_registries(&self) -> Vec<Arc<dyn MeterRegistry>> {
        self.registrar.leaves().into_iter().map(|(_, r)| r).collect()
    }

    /// Meters whose read failed in the most recent tick.
    pub fn failed_meters(&self) -> Vec<FailureRecord> {
        self.failures.snapshot()
    }
}
