//! Per-registry step configuration and window bookkeeping.
//!
//! A registry without an association is cumulative and follows the global
//! export interval. A step-mode registry is only read once its own window
//! has closed, independently of how often the reporter ticks.

use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use meterlink_core::error::{MeterlinkError, Result};
use meterlink_core::meter::CountingMode;

use crate::registrar::RegistryKey;

/// Counting mode and window length of one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    #[serde(default)]
    pub mode: CountingMode,
    pub step_ms: u64,
}

impl StepConfig {
    pub fn step(step_ms: u64) -> Self {
        Self { mode: CountingMode::Step, step_ms }
    }

    pub fn cumulative(step_ms: u64) -> Self {
        Self { mode: CountingMode::Cumulative, step_ms }
    }

    pub fn validate(&self) -> Result<()> {
        if self.mode == CountingMode::Step && self.step_ms == 0 {
            return Err(MeterlinkError::BadConfig("step_ms must be > 0 in step mode".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct StepConfigResolver {
    configs: DashMap<RegistryKey, StepConfig>,
}

impl StepConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn associate(&self, key: RegistryKey, config: StepConfig) -> Result<()> {
        config.validate()?;
        self.configs.insert(key, config);
        Ok(())
    }

    pub fn dissociate(&self, key: RegistryKey) {
        self.configs.remove(&key);
    }

    /// Effective config: the association, or cumulative at `global_interval_ms`.
    pub fn resolve(&self, key: RegistryKey, global_interval_ms: u64) -> StepConfig {
        self.configs
            .get(&key)
            .map(|c| *c.value())
            .unwrap_or_else(|| StepConfig::cumulative(global_interval_ms))
    }
}

/// Last rollover time per step-mode registry. Owned by the tick state.
#[derive(Debug, Default)]
pub struct StepWindows {
    last_rollover: HashMap<RegistryKey, u64>,
}

impl StepWindows {
    /// Close the current window if at least `step_ms` elapsed since the last
    /// rollover. A registry seen for the first time starts its window at
    /// `seed_ms`. The rollover advances by whole steps so windows stay aligned.
    pub fn try_close(&mut self, key: RegistryKey, step_ms: u64, seed_ms: u64, now_ms: u64) -> bool {
        if step_ms == 0 {
            return true;
        }
        let last = *self.last_rollover.entry(key).or_insert(seed_ms);
        let elapsed = now_ms.saturating_sub(last);
        if elapsed < step_ms {
            return false;
        }
        let closed = elapsed / step_ms;
        self.last_rollover.insert(key, last + closed * step_ms);
        true
    }

    pub fn last_rollover(&self, key: RegistryKey) -> Option<u64> {
        self.last_rollover.get(&key).copied()
    }

    /// Start the window of `key` at `at_ms`, replacing any earlier state.
    pub fn seed(&mut self, key: RegistryKey, at_ms: u64) {
        self.last_rollover.insert(key, at_ms);
    }

    pub fn forget(&mut self, key: RegistryKey) {
        self.last_rollover.remove(&key);
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(RegistryKey) -> bool,
    {
        self.last_rollover.retain(|k, _| keep(*k));
    }
}
