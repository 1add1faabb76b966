#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use nightscout_dash::models::{parse_entries, parse_profiles, parse_treatments, RawProfile, RawRecord};
use nightscout_dash::source::{LocalSource, SourceIdentity};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// This is panic-safe (restores variables on unwind) and also serializes access to
/// process-global env vars to avoid flaky tests when Rust runs tests in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

// =========================================================
// Fixtures
// =========================================================

pub const SITE_URL: &str = "https://demo.nightscout.example";

pub fn site() -> SourceIdentity {
    SourceIdentity::parse(SITE_URL).unwrap()
}

pub fn other_site() -> SourceIdentity {
    SourceIdentity::parse("https://other.nightscout.example").unwrap()
}

/// 2024-01-`d`.
pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

/// Four sensor readings per day (00:30, 06:30, 12:30, 18:30 UTC) for every
/// day of January from `first` through `last`.
pub fn glucose_entries(first: u32, last: u32) -> Vec<RawRecord> {
    let rows: Vec<String> = (first..=last)
        .flat_map(|d| {
            [0u32, 6, 12, 18].into_iter().map(move |h| {
                let instant = Utc.with_ymd_and_hms(2024, 1, d, h, 30, 0).unwrap();
                format!(
                    r#"{{"date": {}, "sgv": {}, "type": "sgv"}}"#,
                    instant.timestamp_millis(),
                    100 + h + d
                )
            })
        })
        .collect();
    parse_entries(&format!("[{}]", rows.join(","))).unwrap()
}

/// One sensor reading every five minutes starting at `start`, with the given
/// values.
pub fn glucose_series(start: chrono::DateTime<Utc>, values: &[f64]) -> Vec<RawRecord> {
    let rows: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let instant = start + Duration::minutes(5 * i as i64);
            format!(r#"{{"date": {}, "sgv": {}}}"#, instant.timestamp_millis(), v)
        })
        .collect();
    parse_entries(&format!("[{}]", rows.join(","))).unwrap()
}

/// Temp basal of 0 U/h at 03:00 on Jan 2 for 30 minutes, a site change on
/// Jan 1 at 08:00 and an automatic correction bolus on Jan 2 at 10:00.
pub fn treatments() -> Vec<RawRecord> {
    parse_treatments(
        r#"[
            {"created_at": "2024-01-02T03:00:00Z", "eventType": "Temp Basal",
             "duration": 30, "absolute": 0, "enteredBy": "loop://iPhone"},
            {"created_at": "2024-01-01T08:00:00Z", "eventType": "Site Change"},
            {"created_at": "2024-01-02T10:00:00Z", "eventType": "Correction Bolus",
             "insulin": 0.6, "notes": "Automatic Bolus/Correction"}
        ]"#,
    )
    .unwrap()
}

/// Schedule active since December: 0.8 U/h from midnight, 1.0 from 06:00,
/// 0.7 from 22:00.
pub fn default_profile() -> Vec<RawProfile> {
    parse_profiles(
        r#"[{
            "_id": "profile-1",
            "defaultProfile": "Default",
            "startDate": "2023-12-01T00:00:00Z",
            "store": {"Default": {"basal": [
                {"time": "00:00", "value": 0.8, "timeAsSeconds": 0},
                {"time": "06:00", "value": 1.0, "timeAsSeconds": 21600},
                {"time": "22:00", "value": 0.7, "timeAsSeconds": 79200}
            ]}}
        }]"#,
    )
    .unwrap()
}

/// A later profile raising every rate, effective from Jan 5.
pub fn raised_profile() -> Vec<RawProfile> {
    parse_profiles(
        r#"[{
            "_id": "profile-2",
            "defaultProfile": "Raised",
            "startDate": "2024-01-05T00:00:00Z",
            "store": {"Raised": {"basal": [{"time": "00:00", "value": 1.2}]}}
        }]"#,
    )
    .unwrap()
}

/// Source serving January 1-31 of the demo site.
pub fn seeded_source() -> LocalSource {
    let source = LocalSource::new();
    source.insert_records(site(), glucose_entries(1, 31));
    source.insert_records(site(), treatments());
    source.insert_profiles(site(), default_profile());
    source
}
