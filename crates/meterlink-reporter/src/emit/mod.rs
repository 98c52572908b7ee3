//! Emitter: one JSON line per non-empty metric set.

pub mod sink;

use std::sync::Arc;

use meterlink_core::protocol::record::encode_line;

use crate::collector::MetricSet;

pub use sink::{MemorySink, Sink, WriterSink};

pub struct Emitter {
    sink: Arc<dyn Sink>,
}

impl Emitter {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self { sink }
    }

    /// Serialize `set` and hand it to the sink. Returns whether a record was
    /// produced; empty sets never are.
    pub fn emit(&self, set: &MetricSet, now_ms: u64) -> bool {
        if set.is_empty() {
            return false;
        }
        match encode_line(&set.to_record(now_ms)) {
            Ok(line) => {
                self.sink.accept(line);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, tags = ?set.tags, "metric set encode failed; dropped");
                false
            }
        }
    }
}
