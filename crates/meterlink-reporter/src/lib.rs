//! meterlink reporter library entry.
//!
//! Bridges host meter registries into a stream of metric-set records: the
//! registrar tracks leaf registries, the collector reads and groups meters on
//! every tick, and the emitter hands one JSON line per metric set to a sink.
//! Consumed by the binary (`main.rs`) and by integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod collector;
pub mod config;
pub mod emit;
pub mod failure;
pub mod filter;
pub mod registrar;
pub mod reporter;
pub mod sanitize;
pub mod schedule;
pub mod step;

pub use collector::{MetricSet, TickSummary};
pub use reporter::{MetricsReporter, Settings};
pub use step::StepConfig;
