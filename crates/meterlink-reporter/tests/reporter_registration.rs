//! Registry tracking: composite flattening, unregistering, concurrency.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]


use std::sync::Arc;
use std::thread;

use harness::{fixture, sample, INTERVAL_MS, T0};
use meterlink_core::meter::{CompositeRegistry, MeterRegistry, SimpleRegistry};
use meterlink_reporter::registrar::RegistryKey;

#[test]
fn composites_are_never_tracked() {
    let f = fixture();
    let tracked = f.reporter.tracked_registries();
    assert_eq!(tracked.len(), 1);

    let leaf_dyn: Arc<dyn MeterRegistry> = f.leaf.clone();
    assert!(f.reporter.is_tracked(&leaf_dyn));
    assert_eq!(RegistryKey::of(&tracked[0]), RegistryKey::of(&leaf_dyn));
}

#[test]
fn registering_twice_does_not_duplicate_records() {
    let f = fixture();
    let leaf_dyn: Arc<dyn MeterRegistry> = f.leaf.clone();
    f.reporter.register_registry(Arc::clone(&leaf_dyn));
    f.reporter.register_registry(leaf_dyn);
    f.leaf.counter("counter", &[]).add(3.0);

    assert_eq!(f.reporter.tracked_registries().len(), 1);
    let set = f.single_metric_set();
    assert_eq!(sample(&set, "counter"), Some(3.0));
}

#[test]
fn composite_with_shared_child_is_flattened_once() {
    let f = fixture();
    let shared: Arc<dyn MeterRegistry> = Arc::new(SimpleRegistry::new());
    let left: Arc<dyn MeterRegistry> =
        Arc::new(CompositeRegistry::with_children(vec![Arc::clone(&shared)]));
    let right: Arc<dyn MeterRegistry> =
        Arc::new(CompositeRegistry::with_children(vec![Arc::clone(&shared)]));
    let top: Arc<dyn MeterRegistry> = Arc::new(CompositeRegistry::with_children(vec![left, right]));

    f.reporter.register_registry(top);
    assert_eq!(f.reporter.tracked_registries().len(), 2);
    assert!(f.reporter.is_tracked(&shared));
}

#[test]
fn unregistered_registry_stops_reporting() {
    let f = fixture();
    let other = Arc::new(SimpleRegistry::new());
    let other_dyn: Arc<dyn MeterRegistry> = other.clone();
    f.reporter.register_registry(Arc::clone(&other_dyn));

    f.leaf.counter("leaf", &[]).increment();
    other.counter("other", &[]).increment();
    assert_eq!(f.single_metric_set().samples.len(), 2);

    f.reporter.unregister_registry(&other_dyn);
    assert!(!f.reporter.is_tracked(&other_dyn));
    let set = f.single_metric_set();
    assert_eq!(set.samples.len(), 1);
    assert!(set.samples.contains_key("leaf"));
}

#[test]
fn unregistering_a_composite_drops_its_leaves() {
    let f = fixture();
    let a: Arc<dyn MeterRegistry> = Arc::new(SimpleRegistry::new());
    let b: Arc<dyn MeterRegistry> = Arc::new(SimpleRegistry::new());
    let comp: Arc<dyn MeterRegistry> =
        Arc::new(CompositeRegistry::with_children(vec![Arc::clone(&a), Arc::clone(&b)]));

    f.reporter.register_registry(Arc::clone(&comp));
    assert_eq!(f.reporter.tracked_registries().len(), 3);

    f.reporter.unregister_registry(&comp);
    assert_eq!(f.reporter.tracked_registries().len(), 1);
    assert!(!f.reporter.is_tracked(&a));
    assert!(!f.reporter.is_tracked(&b));
}

#[test]
fn unregistering_unknown_registry_is_a_no_op() {
    let f = fixture();
    let stranger: Arc<dyn MeterRegistry> = Arc::new(SimpleRegistry::new());
    f.reporter.unregister_registry(&stranger);
    assert_eq!(f.reporter.tracked_registries().len(), 1);
}

#[test]
fn registration_races_with_ticks() {
    let f = fixture();
    f.leaf.counter("base", &[]).increment();
    f.reporter.reset_now(T0);

    let registrars: Vec<_> = (0..4)
        .map(|i| {
            let reporter = Arc::clone(&f.reporter);
            thread::spawn(move || {
                let mut mine = Vec::new();
                for j in 0..25 {
                    let reg = Arc::new(SimpleRegistry::new());
                    let name = format!("thread{i}.reg{j}");
                    reg.counter(&name, &[]).increment();
                    let reg_dyn: Arc<dyn MeterRegistry> = reg;
                    reporter.register_registry(Arc::clone(&reg_dyn));
                    mine.push(reg_dyn);
                }
                mine
            })
        })
        .collect();

    let ticker = {
        let reporter = Arc::clone(&f.reporter);
        thread::spawn(move || {
            for n in 1..=20u64 {
                reporter.run(T0 + n * INTERVAL_MS);
            }
        })
    };

    let mut all = Vec::new();
    for h in registrars {
        all.extend(h.join().unwrap());
    }
    ticker.join().unwrap();

    assert_eq!(f.reporter.tracked_registries().len(), 101);
    assert!(all.iter().all(|r| f.reporter.is_tracked(r)));

    f.sink.take();
    let set = f.single_metric_set_at(T0 + 21 * INTERVAL_MS);
    assert_eq!(set.samples.len(), 101);
}

#[test]
fn equal_sample_names_keep_the_first_registered() {
    let f = fixture();
    let later = Arc::new(SimpleRegistry::new());
    f.reporter.register_registry(later.clone() as Arc<dyn MeterRegistry>);

    later.counter("c", &[]).add(2.0);
    f.leaf.counter("c", &[]).add(1.0);
    later.timer("t", &[]).record(std::time::Duration::from_micros(9));
    f.leaf.timer("t", &[]).record(std::time::Duration::from_micros(4));

    for _ in 0..3 {
        f.reporter.reset_now(T0);
        let summary = f.reporter.run(T0 + INTERVAL_MS);
        assert_eq!(summary.shadowed, 2);

        let mut sets = f.sink.take_records().unwrap();
        assert_eq!(sets.len(), 1);
        let set = sets.remove(0);
        assert_eq!(sample(&set, "c"), Some(1.0));
        assert_eq!(sample(&set, "t.count"), Some(1.0));
        assert_eq!(sample(&set, "t.sum.us"), Some(4.0));
    }
}

#[test]
fn failure_in_one_registry_survives_success_in_another() {
    let f = fixture();
    let later = Arc::new(SimpleRegistry::new());
    let later_dyn: Arc<dyn MeterRegistry> = later.clone();
    f.reporter.register_registry(Arc::clone(&later_dyn));

    f.leaf.gauge("g", &[], || 1.0);
    later.try_gauge("g", &[], || Err(meterlink_core::ReadError::new("down")));

    f.reporter.reset_now(T0);
    let summary = f.reporter.run(T0 + INTERVAL_MS);
    assert_eq!(summary.failed, 1);

    let failed = f.reporter.failed_meters();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id.name, "g");
    assert_eq!(failed[0].registry, RegistryKey::of(&later_dyn));

    let set = f.sink.take_records().unwrap().remove(0);
    assert_eq!(sample(&set, "g"), Some(1.0));
}
