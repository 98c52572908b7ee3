//! Metric-set record (JSON, one per line).
//!
//! ```text
//! {"metricset":{"tags":{"foo":"bar"},"samples":{"counter":{"value":42.0}},"timestamp":1700000000000000}}
//! ```
//!
//! `timestamp` is epoch microseconds.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{MeterlinkError, Result};

/// One sample value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SampleValue {
    pub value: f64,
}

/// Body of one exported record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricSetRecord {
    /// Sanitized tag key -> original tag value.
    pub tags: BTreeMap<String, String>,
    /// Sample name -> value. Non-finite values are skipped when encoding.
    #[serde(serialize_with = "finite_samples")]
    pub samples: BTreeMap<String, SampleValue>,
    /// Epoch microseconds.
    pub timestamp: u64,
}

impl MetricSetRecord {
    /// Number of samples that would actually be written.
    pub fn finite_len(&self) -> usize {
        self.samples.values().filter(|s| s.value.is_finite()).count()
    }
}

fn finite_samples<S>(samples: &BTreeMap<String, SampleValue>, ser: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let finite = samples.iter().filter(|(_, s)| s.value.is_finite());
    let mut map = ser.serialize_map(None)?;
    for (name, sample) in finite {
        map.serialize_entry(name, sample)?;
    }
    map.end()
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    metricset: &'a MetricSetRecord,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    metricset: MetricSetRecord,
}

/// Encode a record as a single JSON line terminated by `\n`.
pub fn encode_line(record: &MetricSetRecord) -> Result<Bytes> {
    let mut buf = serde_json::to_vec(&EnvelopeRef { metricset: record })?;
    buf.push(b'\n');
    Ok(Bytes::from(buf))
}

/// Decode one line produced by [`encode_line`]. Trailing whitespace is
/// ignored.
pub fn decode_line(line: &[u8]) -> Result<MetricSetRecord> {
    let trimmed = line.trim_ascii_end();
    if trimmed.is_empty() {
        return Err(MeterlinkError::Encode("empty record line".into()));
    }
    let env: Envelope = serde_json::from_slice(trimmed)?;
    Ok(env.metricset)
}
