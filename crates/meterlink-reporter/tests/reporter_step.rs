//! Step-mode registries: window gating and per-step reset.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]


use std::sync::Arc;
use std::time::Duration;

use harness::{fixture, sample, T0};
use meterlink_core::meter::{MeterRegistry, SimpleRegistry};
use meterlink_reporter::StepConfig;

fn leaf_dyn(leaf: &Arc<SimpleRegistry>) -> Arc<dyn MeterRegistry> {
    leaf.clone()
}

#[test]
fn step_counter_waits_for_its_window() {
    let f = fixture();
    f.reporter
        .associate_step_config(&leaf_dyn(&f.leaf), StepConfig::step(10_000))
        .unwrap();
    let counter = f.leaf.counter("counter", &[("foo", "bar")]);
    counter.increment();

    f.reporter.reset_now(T0);
    assert!(f.metric_sets_at(T0 + 5_000).is_empty());

    let set = f.single_metric_set_at(T0 + 15_000);
    assert_eq!(sample(&set, "counter"), Some(1.0));
    assert_eq!(counter.count(), 0.0);
}

#[test]
fn step_counter_resets_every_window() {
    let f = fixture();
    f.reporter
        .associate_step_config(&leaf_dyn(&f.leaf), StepConfig::step(30_000))
        .unwrap();
    f.leaf.counter("counter", &[]).increment();

    f.reporter.reset_now(T0);
    let first = f.single_metric_set_at(T0 + 31_000);
    assert_eq!(sample(&first, "counter"), Some(1.0));

    let second = f.single_metric_set_at(T0 + 61_000);
    assert_eq!(sample(&second, "counter"), Some(0.0));
}

#[test]
fn step_timer_and_summary_drain() {
    let f = fixture();
    f.reporter
        .associate_step_config(&leaf_dyn(&f.leaf), StepConfig::step(10_000))
        .unwrap();
    f.leaf.timer("t", &[]).record(Duration::from_micros(4));
    f.leaf.summary("s", &[]).record(2.0);

    f.reporter.reset_now(T0);
    let set = f.single_metric_set_at(T0 + 10_000);
    assert_eq!(sample(&set, "t.count"), Some(1.0));
    assert_eq!(sample(&set, "t.sum.us"), Some(4.0));
    assert_eq!(sample(&set, "s.count"), Some(1.0));
    assert_eq!(sample(&set, "s.sum"), Some(2.0));

    let next = f.single_metric_set_at(T0 + 20_000);
    assert_eq!(sample(&next, "t.count"), Some(0.0));
    assert_eq!(sample(&next, "s.sum"), Some(0.0));
}

#[test]
fn step_gauge_is_not_reset() {
    let f = fixture();
    f.reporter
        .associate_step_config(&leaf_dyn(&f.leaf), StepConfig::step(10_000))
        .unwrap();
    f.leaf.gauge("depth", &[], || 9.0);

    f.reporter.reset_now(T0);
    assert_eq!(sample(&f.single_metric_set_at(T0 + 10_000), "depth"), Some(9.0));
    assert_eq!(sample(&f.single_metric_set_at(T0 + 20_000), "depth"), Some(9.0));
}

#[test]
fn gated_meters_are_counted_in_summary() {
    let f = fixture();
    f.reporter
        .associate_step_config(&leaf_dyn(&f.leaf), StepConfig::step(10_000))
        .unwrap();
    f.leaf.counter("a", &[]).increment();
    f.leaf.counter("b", &[]).increment();

    f.reporter.reset_now(T0);
    let summary = f.reporter.run(T0 + 1_000);
    assert_eq!(summary.gated, 2);
    assert_eq!(summary.sets, 0);
}

#[test]
fn windows_stay_aligned_to_whole_steps() {
    let f = fixture();
    f.reporter
        .associate_step_config(&leaf_dyn(&f.leaf), StepConfig::step(10_000))
        .unwrap();
    let counter = f.leaf.counter("c", &[]);

    f.reporter.reset_now(T0);
    counter.increment();
    assert_eq!(f.metric_sets_at(T0 + 12_000).len(), 1);
    // window now starts at T0 + 10s, so T0 + 19s is still inside it
    counter.increment();
    assert!(f.metric_sets_at(T0 + 19_000).is_empty());
    assert_eq!(sample(&f.single_metric_set_at(T0 + 20_000), "c"), Some(1.0));
}

#[test]
fn other_registries_keep_cumulative_mode() {
    let f = fixture();
    let stepped = Arc::new(SimpleRegistry::new());
    let stepped_dyn: Arc<dyn MeterRegistry> = stepped.clone();
    f.reporter.register_registry(Arc::clone(&stepped_dyn));
    f.reporter
        .associate_step_config(&stepped_dyn, StepConfig::step(120_000))
        .unwrap();

    f.leaf.counter("cumulative", &[]).increment();
    stepped.counter("stepped", &[]).increment();

    let set = f.single_metric_set();
    assert_eq!(set.samples.len(), 1);
    assert_eq!(sample(&set, "cumulative"), Some(1.0));
}

#[test]
fn zero_step_is_rejected() {
    let f = fixture();
    let err = f
        .reporter
        .associate_step_config(&leaf_dyn(&f.leaf), StepConfig::step(0))
        .unwrap_err();
    assert_eq!(err.code().as_str(), "BAD_CONFIG");
}

#[test]
fn late_association_seeds_window_at_given_time() {
    let f = fixture();
    f.reporter.reset_now(T0);
    let counter = f.leaf.counter("late", &[]);
    counter.increment();

    f.reporter
        .associate_step_config_at(&leaf_dyn(&f.leaf), StepConfig::step(10_000), T0 + 100_000)
        .unwrap();
    assert!(f.metric_sets_at(T0 + 101_000).is_empty());
    assert_eq!(counter.count(), 1.0);

    let set = f.single_metric_set_at(T0 + 110_000);
    assert_eq!(sample(&set, "late"), Some(1.0));
}

#[test]
fn association_without_time_seeds_at_previous_tick() {
    let f = fixture();
    f.leaf.counter("late", &[]).increment();
    f.reporter.reset_now(T0);
    f.metric_sets_at(T0 + 95_000);

    f.reporter
        .associate_step_config(&leaf_dyn(&f.leaf), StepConfig::step(10_000))
        .unwrap();
    // window runs from the tick at 95s, not from the reset at 0s
    assert!(f.metric_sets_at(T0 + 101_000).is_empty());
    assert_eq!(sample(&f.single_metric_set_at(T0 + 105_000), "late"), Some(1.0));
}
