use serde::Deserialize;
use meterlink_core::error::{MeterlinkError, Result};

/// Longest accepted export interval: one day.
const MAX_INTERVAL_MS: u64 = 86_400_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReporterConfig {
    pub version: u32,

    #[serde(default)]
    pub reporter: ReporterSection,

    #[serde(default)]
    pub output: OutputSection,
}

impl ReporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MeterlinkError::UnsupportedVersion);
        }

        self.reporter.validate()?;
        self.output.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReporterSection {
    /// Export interval; 0 disables collection.
    #[serde(default = "default_metrics_interval_ms")]
    pub metrics_interval_ms: u64,

    /// Replace dots in metric names and tag keys with underscores.
    #[serde(default = "default_dedot")]
    pub dedot_custom_metrics: bool,

    /// Ordered wildcard patterns of metric names to drop.
    #[serde(default)]
    pub disable_metrics: Vec<String>,
}

impl Default for ReporterSection {
    fn default() -> Self {
        Self {
            metrics_interval_ms: default_metrics_interval_ms(),
            dedot_custom_metrics: default_dedot(),
            disable_metrics: Vec::new(),
        }
    }
}

impl ReporterSection {
    pub fn validate(&self) -> Result<()> {
        if self.metrics_interval_ms > MAX_INTERVAL_MS {
            return Err(MeterlinkError::BadConfig(format!(
                "reporter.metrics_interval_ms must be at most {MAX_INTERVAL_MS}"
            )));
        }
        // compile once to surface bad patterns at load time
        crate::filter::MetricFilter::compile(&self.disable_metrics)?;
        Ok(())
    }
}

fn default_metrics_interval_ms() -> u64 {
    30_000
}
fn default_dedot() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    #[default]
    Stdout,
    File,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    #[serde(default)]
    pub kind: OutputKind,
    #[serde(default)]
    pub path: Option<String>,
}

impl OutputSection {
    pub fn validate(&self) -> Result<()> {
        if self.kind == OutputKind::File && self.path.as_deref().map_or(true, str::is_empty) {
            return Err(MeterlinkError::BadConfig(
                "output.path is required when output.kind is file".into(),
            ));
        }
        Ok(())
    }
}
