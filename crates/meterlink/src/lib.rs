//! Top-level facade crate for meterlink.
//!
//! Re-exports the meter model and the reporter so hosts can depend on a single crate.

pub mod core {
    pub use meterlink_core::*;
}

pub mod reporter {
    pub use meterlink_reporter::*;
}
