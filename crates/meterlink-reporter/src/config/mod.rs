//! Reporter config loader (strict parsing).

pub mod schema;

use std::fs;

use meterlink_core::error::{MeterlinkError, Result};

pub use schema::{OutputKind, OutputSection, ReporterConfig, ReporterSection};

pub fn load_from_file(path: &str) -> Result<ReporterConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| MeterlinkError::Internal(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ReporterConfig> {
    let cfg: ReporterConfig = serde_yaml::from_str(s)
        .map_err(|e| MeterlinkError::BadConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
