//! Record sinks.
//!
//! A sink receives finished, newline-terminated records. Delivery is
//! fire-and-forget: retries and backpressure are the sink's business.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;

use meterlink_core::error::{MeterlinkError, Result};
use meterlink_core::protocol::record::{decode_line, MetricSetRecord};

pub trait Sink: Send + Sync {
    fn accept(&self, record: Bytes);
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<Bytes>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain captured lines.
    pub fn take(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.lines.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Drain and decode captured records.
    pub fn take_records(&self) -> Result<Vec<MetricSetRecord>> {
        self.take().iter().map(|l| decode_line(l)).collect()
    }
}

impl Sink for MemorySink {
    fn accept(&self, record: Bytes) {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).push(record);
    }
}

/// Writes records to any `io::Write`, flushing after each one.
#[derive(Debug)]
pub struct WriterSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WriterSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl WriterSink<File> {
    /// Append to `path`, creating it if needed.
    pub fn file(path: &str) -> Result<Self> {
        let f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| MeterlinkError::Internal(format!("open output failed ({path}): {e}")))?;
        Ok(Self::new(f))
    }
}

impl<W: Write + Send> Sink for WriterSink<W> {
    fn accept(&self, record: Bytes) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = out.write_all(&record).and_then(|()| out.flush()) {
            tracing::warn!(error = %e, bytes = record.len(), "sink write failed; record dropped");
        }
    }
}
