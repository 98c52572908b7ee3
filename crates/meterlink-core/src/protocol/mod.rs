//! Wire formats.
//!
//! One exported record per metric set, newline-delimited JSON. Encoding is
//! panic-free and never writes a non-finite number: such samples are left
//! out of the record entirely.

pub mod record;
