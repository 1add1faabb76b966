//! Loading Nightscout export directories into a local source.

use std::fs;
use std::path::PathBuf;

use nightscout_dash::cache::{CacheKey, RangeCache};
use nightscout_dash::models::{AnalysisWindow, DateRange, EventKind};
use nightscout_dash::services::reconstruct_basal;
use nightscout_dash::source::{LocalSource, SourceError};

mod support;
use support::{day, site};

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/export")
}

#[tokio::test]
async fn test_export_fixture_normalizes_and_reconstructs() {
    let source = LocalSource::from_export_dir(site(), fixture_dir()).unwrap();
    let mut cache = RangeCache::new();
    let dates = DateRange::single(day(2));

    let view = cache
        .ensure(&source, &CacheKey::new(site(), chrono_tz::UTC), dates)
        .await
        .unwrap();

    let kinds: Vec<&EventKind> = view.events.iter().map(|e| &e.kind).collect();
    assert_eq!(
        kinds
            .iter()
            .filter(|k| ***k == EventKind::SensorGlucose)
            .count(),
        4
    );
    assert_eq!(
        kinds
            .iter()
            .filter(|k| ***k == EventKind::MeterGlucose)
            .count(),
        1
    );
    assert_eq!(view.events.len(), 8);
    // The profile without its default store is skipped.
    assert_eq!(view.schedules.len(), 1);

    let correction = view
        .events
        .iter()
        .find(|e| e.is_correction_bolus())
        .unwrap();
    assert_eq!(correction.entered_by.as_deref(), Some("loop://iPhone"));

    let summary = reconstruct_basal(
        &view.events,
        &view.schedules,
        &AnalysisWindow::new(dates, chrono_tz::UTC),
        false,
    )
    .unwrap();
    let labels: Vec<&str> = summary
        .hourly
        .iter()
        .map(|row| row.time_label.as_str())
        .collect();
    assert_eq!(labels, vec!["02:00", "04:00"]);
    assert!((summary.hourly[0].mean - 0.25).abs() < 1e-9);
    assert!((summary.hourly[1].mean - (0.95 + 0.4 / 60.0)).abs() < 1e-9);
}

#[tokio::test]
async fn test_missing_profile_file_counts_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    fs::copy(fixture_dir().join("entries.json"), dir.path().join("entries.json")).unwrap();

    let source = LocalSource::from_export_dir(site(), dir.path()).unwrap();
    let mut cache = RangeCache::new();
    let view = cache
        .ensure(
            &source,
            &CacheKey::new(site(), chrono_tz::UTC),
            DateRange::single(day(2)),
        )
        .await
        .unwrap();

    assert_eq!(view.events.len(), 5);
    assert!(view.schedules.is_empty());
}

#[test]
fn test_malformed_export_file_is_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("entries.json"), "[]").unwrap();
    fs::write(dir.path().join("treatments.json"), "{\"not\": \"an array\"}").unwrap();

    let err = LocalSource::from_export_dir(site(), dir.path()).unwrap_err();
    match err {
        SourceError::Parse { what, .. } => assert_eq!(what, "treatments.json"),
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn test_missing_directory_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let err = LocalSource::from_export_dir(site(), dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, SourceError::Unavailable { .. }));
}
