//! Registry registrar.
//!
//! Composite registries are flattened to their leaves at registration time
//! and never stored themselves. Leaves are keyed by identity, so registering
//! the same registry twice (directly or through several composites) tracks
//! it once.
//!
//! Membership is a `DashMap`: hosts may register while a tick enumerates.
//! A registration racing a tick shows up on that tick or the next one.
//! Leaves are enumerated in the order they were first registered.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use meterlink_core::meter::MeterRegistry;

/// Identity of a registry: the address of its shared allocation.
///
/// Stable for as long as the registrar holds the `Arc`, which it does for
/// every tracked leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryKey(usize);

impl RegistryKey {
    pub fn of(registry: &Arc<dyn MeterRegistry>) -> Self {
        Self(Arc::as_ptr(registry) as *const () as usize)
    }
}

/// Collect the leaves below `registry`, visiting each identity once.
pub fn flatten_leaves(registry: &Arc<dyn MeterRegistry>) -> Vec<Arc<dyn MeterRegistry>> {
    let mut visited = HashSet::new();
    let mut out = Vec::new();
    walk(registry, &mut visited, &mut out);
    out
}

fn walk(
    registry: &Arc<dyn MeterRegistry>,
    visited: &mut HashSet<RegistryKey>,
    out: &mut Vec<Arc<dyn MeterRegistry>>,
) {
    if !visited.insert(RegistryKey::of(registry)) {
        return;
    }
    match registry.children() {
        Some(children) => {
            for child in &children {
                walk(child, visited, out);
            }
        }
        None => out.push(Arc::clone(registry)),
    }
}

struct Tracked {
    seq: u64,
    registry: Arc<dyn MeterRegistry>,
}

#[derive(Default)]
pub struct RegistryRegistrar {
    leaves: DashMap<RegistryKey, Tracked>,
    next_seq: AtomicU64,
}

impl RegistryRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track every leaf below `registry`. Returns how many were newly added.
    pub fn register(&self, registry: Arc<dyn MeterRegistry>) -> usize {
        let mut added = 0;
        for leaf in flatten_leaves(&registry) {
            let key = RegistryKey::of(&leaf);
            self.leaves.entry(key).or_insert_with(|| {
                added += 1;
                Tracked { seq: self.next_seq.fetch_add(1, Ordering::Relaxed), registry: leaf }
            });
        }
        tracing::debug!(added, tracked = self.leaves.len(), "registry registered");
        added
    }

    /// Stop tracking every leaf below `registry`. Returns the removed keys.
    pub fn unregister(&self, registry: &Arc<dyn MeterRegistry>) -> Vec<RegistryKey> {
        flatten_leaves(registry)
            .iter()
            .map(RegistryKey::of)
            .filter(|key| self.leaves.remove(key).is_some())
            .collect()
    }

    pub fn is_tracked(&self, registry: &Arc<dyn MeterRegistry>) -> bool {
        self.leaves.contains_key(&RegistryKey::of(registry))
    }

    /// Snapshot of tracked leaves in registration order.
    pub fn leaves(&self) -> Vec<(RegistryKey, Arc<dyn MeterRegistry>)> {
        let mut out: Vec<_> = self
            .leaves
            .iter()
            .map(|e| (e.value().seq, *e.key(), Arc::clone(&e.value().registry)))
            .collect();
        out.sort_by_key(|(seq, _, _)| *seq);
        out.into_iter().map(|(_, k, r)| (k, r)).collect()
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}
