#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use meterlink_reporter::config::{self, OutputKind};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
reporter:
  metrics_interval_ms: 1000
  dedot_metrics: false # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_CONFIG");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.reporter.metrics_interval_ms, 30_000);
    assert!(cfg.reporter.dedot_custom_metrics);
    assert!(cfg.reporter.disable_metrics.is_empty());
    assert_eq!(cfg.output.kind, OutputKind::Stdout);
}

#[test]
fn unsupported_version() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn zero_interval_is_valid() {
    let cfg = config::load_from_str("version: 1\nreporter:\n  metrics_interval_ms: 0\n").unwrap();
    assert_eq!(cfg.reporter.metrics_interval_ms, 0);
}

#[test]
fn interval_upper_bound() {
    let err = config::load_from_str("version: 1\nreporter:\n  metrics_interval_ms: 90000000\n")
        .expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_CONFIG");
}

#[test]
fn empty_disable_pattern_rejected() {
    let bad = r#"
version: 1
reporter:
  disable_metrics: ["root.metric", ""]
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_CONFIG");
}

#[test]
fn file_output_requires_path() {
    let err = config::load_from_str("version: 1\noutput:\n  kind: file\n").expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_CONFIG");

    let cfg = config::load_from_str("version: 1\noutput:\n  kind: file\n  path: /tmp/m.ndjson\n").unwrap();
    assert_eq!(cfg.output.path.as_deref(), Some("/tmp/m.ndjson"));
}
