//! meterlink reporter binary.
//!
//! - Loads `meterlink.yaml` (or the path given as first argument)
//! - Exports the reporter's own meters on the configured interval
//! - Flushes once more on Ctrl-C, then exits

use std::sync::Arc;
use std::time::Instant;

use tracing_subscriber::{fmt, EnvFilter};

use meterlink_core::error::{MeterlinkError, Result};
use meterlink_core::meter::{MeterRegistry, SimpleRegistry};
use meterlink_core::ReadError;
use meterlink_reporter::config::{self, OutputKind};
use meterlink_reporter::emit::{Sink, WriterSink};
use meterlink_reporter::{schedule, MetricsReporter};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "meterlink-reporter failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "meterlink.yaml".to_string());
    let cfg = config::load_from_file(&path)?;

    let sink: Arc<dyn Sink> = match (cfg.output.kind, cfg.output.path.as_deref()) {
        (OutputKind::File, Some(out)) => Arc::new(WriterSink::file(out)?),
        _ => Arc::new(WriterSink::stdout()),
    };
    let reporter = Arc::new(MetricsReporter::new(&cfg.reporter, sink)?);

    let own = Arc::new(SimpleRegistry::new());
    let started = Instant::now();
    own.gauge("meterlink.uptime.seconds", &[], move || started.elapsed().as_secs_f64());
    let weak = Arc::downgrade(&reporter);
    own.try_gauge("meterlink.registries.tracked", &[], move || {
        weak.upgrade()
            .map(|r| r.tracked_registries().len() as f64)
            .ok_or_else(|| ReadError::new("reporter dropped"))
    });
    let weak = Arc::downgrade(&reporter);
    own.try_gauge("meterlink.meters.failed", &[], move || {
        weak.upgrade()
            .map(|r| r.failed_meters().len() as f64)
            .ok_or_else(|| ReadError::new("reporter dropped"))
    });
    reporter.register_registry(own as Arc<dyn MeterRegistry>);

    tracing::info!(config = %path, interval_ms = cfg.reporter.metrics_interval_ms, "meterlink-reporter starting");
    let handle = schedule::spawn_periodic(Arc::clone(&reporter));

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| MeterlinkError::Internal(format!("signal handler failed: {e}")))?;
    handle.stop().await;
    Ok(())
}
