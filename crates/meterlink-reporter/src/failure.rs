//! Failed-meter bookkeeping.
//!
//! Diagnostic only: a recorded failure never stops the next tick from
//! reading the meter again. Entries reflect the most recent tick; a clean
//! read clears the entry and meters that disappear are pruned.
//!
//! A meter is identified by its leaf registry plus its id, so equal ids in
//! two registries are tracked apart.

use std::collections::HashSet;

use dashmap::DashMap;

use meterlink_core::meter::MeterId;
use meterlink_core::ReadError;

use crate::registrar::RegistryKey;

/// Identity of one meter in one tracked leaf registry.
pub type MeterKey = (RegistryKey, MeterId);

/// Meter whose value function failed in the most recent tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub registry: RegistryKey,
    pub id: MeterId,
    pub error: ReadError,
    /// Tick time (ms) of the first failure in the current streak.
    pub first_failed_ms: u64,
    pub last_failed_ms: u64,
    /// Consecutive failed ticks, starting at 1.
    pub consecutive: u32,
}

#[derive(Debug, Default)]
pub struct FailureTracker {
    failed: DashMap<MeterKey, FailureRecord>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed read. Returns the length of the failure streak.
    pub fn record_failure(&self, registry: RegistryKey, id: &MeterId, error: ReadError, now_ms: u64) -> u32 {
        let mut entry = self.failed.entry((registry, id.clone())).or_insert_with(|| FailureRecord {
            registry,
            id: id.clone(),
            error: error.clone(),
            first_failed_ms: now_ms,
            last_failed_ms: now_ms,
            consecutive: 0,
        });
        entry.consecutive = entry.consecutive.saturating_add(1);
        entry.last_failed_ms = now_ms;
        entry.error = error;

        let streak = entry.consecutive;
        if streak == 1 {
            tracing::warn!(meter = %id, error = %entry.error, "meter read failed; excluding it from this tick");
        } else {
            tracing::debug!(meter = %id, error = %entry.error, streak, "meter read still failing");
        }
        streak
    }

    /// Clear the failure flag after a clean read.
    pub fn record_success(&self, registry: RegistryKey, id: &MeterId) {
        if let Some((_, rec)) = self.failed.remove(&(registry, id.clone())) {
            tracing::info!(meter = %id, failed_ticks = rec.consecutive, "meter read recovered");
        }
    }

    pub fn is_known_failed(&self, registry: RegistryKey, id: &MeterId) -> bool {
        self.failed.contains_key(&(registry, id.clone()))
    }

    /// Drop entries for meters not visited in the current tick.
    pub fn retain_seen(&self, seen: &HashSet<MeterKey>) {
        self.failed.retain(|key, _| seen.contains(key));
    }

    /// Failure records sorted by meter id, then registry.
    pub fn snapshot(&self) -> Vec<FailureRecord> {
        let mut out: Vec<FailureRecord> = self.failed.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id).then(a.registry.cmp(&b.registry)));
        out
    }

    pub fn len(&self) -> usize {
        self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failed.is_empty()
    }
}
