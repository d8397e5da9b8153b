use std::path::Path;
use std::time::Duration;

use cloudatlas::config::{QueryDefinition, Settings, parse_query_lines, read_query_file};
use cloudatlas::error::AtlasError;
use pretty_assertions::assert_eq;

#[test]
fn defaults_apply_without_a_file() {
    let settings = Settings::load(None).expect("defaults load");
    assert_eq!(settings.query_interval_ms, 4000);
    assert_eq!(settings.bind, "127.0.0.1:5995");
    assert!(settings.sample_hierarchy);
    assert_eq!(settings.queries_file, None);
    assert_eq!(settings.engine_settings().query_interval, Duration::from_secs(4));
}

#[test]
fn a_missing_file_is_not_an_error() {
    let settings = Settings::load(Some(Path::new("/nonexistent/cloudatlas.toml"))).expect("defaults load");
    assert_eq!(settings.log_filter, "info");
}

#[test]
fn file_values_override_defaults() {
    let path = std::env::temp_dir().join(format!("cloudatlas-settings-{}.toml", std::process::id()));
    std::fs::write(&path, "query_interval_ms = 250\nsample_hierarchy = false\n").unwrap();
    let settings = Settings::load(Some(&path));
    std::fs::remove_file(&path).ok();
    let settings = settings.expect("file loads");
    assert_eq!(settings.query_interval_ms, 250);
    assert!(!settings.sample_hierarchy);
    assert_eq!(settings.bind, "127.0.0.1:5995");
}

#[test]
fn zero_interval_is_rejected() {
    let path = std::env::temp_dir().join(format!("cloudatlas-zero-{}.toml", std::process::id()));
    std::fs::write(&path, "query_interval_ms = 0\n").unwrap();
    let settings = Settings::load(Some(&path));
    std::fs::remove_file(&path).ok();
    assert!(matches!(settings, Err(AtlasError::Config(_))));
}

#[test]
fn query_lines() {
    let text = "# installed at startup\n\n&procs: SELECT sum(num_processes) AS procs\n&two: SELECT 1 AS a; SELECT 2 AS b\n";
    let definitions = parse_query_lines(text).unwrap();
    assert_eq!(
        definitions,
        vec![
            QueryDefinition { name: "&procs".into(), queries: "SELECT sum(num_processes) AS procs".into() },
            QueryDefinition { name: "&two".into(), queries: "SELECT 1 AS a; SELECT 2 AS b".into() },
        ]
    );
    let err = parse_query_lines("&ok: SELECT 1 AS a\nno colon here").unwrap_err();
    assert!(matches!(err, AtlasError::Parse { line: Some(2), .. }), "got {err:?}");
    assert!(matches!(read_query_file(Path::new("/nonexistent/queries.txt")), Err(AtlasError::Config(_))));
}
