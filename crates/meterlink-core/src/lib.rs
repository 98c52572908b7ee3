//! meterlink core: meter/registry contracts, error types, and the metric-set
//! wire record.
//!
//! This crate defines what the reporter observes (registries and meters) and
//! what it produces (records). It needs no async runtime, so hosts can
//! implement the contracts without pulling in the reporter or tokio.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. All fallible paths
//! surface as `MeterlinkError`/`Result` or, for meter reads, `ReadError`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod meter;
pub mod protocol;

/// Shared result type.
pub use error::{MeterlinkError, ReadError, Result};
