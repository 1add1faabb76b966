//! In-memory event source.
//!
//! Serves records loaded from a Nightscout JSON export (`entries.json`,
//! `treatments.json`, `profile.json`) or inserted directly. Calls are counted
//! and the most recent ones kept in a bounded log. Availability can be toggled
//! or a specific call made to fail, which makes it the source of choice for
//! tests and offline analysis.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use async_trait::async_trait;
use chrono_tz::Tz;
use parking_lot::RwLock;
use serde::Serialize;

use super::{EventSource, SourceError, SourceIdentity, SourceResult};
use crate::models::{parse_entries, parse_profiles, parse_treatments, DateRange, RawProfile, RawRecord};
use crate::services::normalizer::record_instant;

/// Number of most recent calls kept by [`LocalSource::fetch_log`].
pub const FETCH_LOG_CAPACITY: usize = 256;

/// One recorded call against a [`LocalSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FetchCall {
    Events {
        source: SourceIdentity,
        dates: DateRange,
    },
    Schedules {
        source: SourceIdentity,
    },
}

#[derive(Debug, Clone, Default)]
struct Dataset {
    records: Vec<RawRecord>,
    profiles: Vec<RawProfile>,
}

#[derive(Debug, Default)]
struct FaultState {
    available: bool,
    /// Event fetch number (1-based, over the source lifetime) that must fail.
    fail_event_fetch: Option<usize>,
}

#[derive(Debug, Default)]
struct CallLog {
    recent: VecDeque<FetchCall>,
    event_fetches: usize,
    schedule_fetches: usize,
}

impl CallLog {
    fn record(&mut self, call: FetchCall) {
        match call {
            FetchCall::Events { .. } => self.event_fetches += 1,
            FetchCall::Schedules { .. } => self.schedule_fetches += 1,
        }
        if self.recent.len() == FETCH_LOG_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(call);
    }
}

/// In-memory [`EventSource`] keyed by source identity.
#[derive(Debug)]
pub struct LocalSource {
    datasets: RwLock<HashMap<SourceIdentity, Dataset>>,
    faults: RwLock<FaultState>,
    calls: RwLock<CallLog>,
}

impl LocalSource {
    pub fn new() -> Self {
        Self {
            datasets: RwLock::new(HashMap::new()),
            faults: RwLock::new(FaultState {
                available: true,
                fail_event_fetch: None,
            }),
            calls: RwLock::new(CallLog::default()),
        }
    }

    /// Source serving one site from a Nightscout export directory.
    pub fn from_export_dir(identity: SourceIdentity, dir: impl AsRef<Path>) -> SourceResult<Self> {
        let source = Self::new();
        source.load_export_dir(identity, dir)?;
        Ok(source)
    }

    /// Load `entries.json`, `treatments.json` and `profile.json` from `dir`.
    ///
    /// Missing files count as empty; a file that is not a JSON array fails the
    /// whole load and leaves the source untouched.
    pub fn load_export_dir(&self, identity: SourceIdentity, dir: impl AsRef<Path>) -> SourceResult<()> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(SourceError::unavailable(
                &identity,
                format!("export directory {} does not exist", dir.display()),
            ));
        }

        let read = |name: &str| -> SourceResult<Option<String>> {
            let path = dir.join(name);
            if path.exists() {
                Ok(Some(std::fs::read_to_string(path)?))
            } else {
                log::warn!("Export file {} not found; treating as empty", name);
                Ok(None)
            }
        };

        let mut records = Vec::new();
        if let Some(json) = read("entries.json")? {
            records.extend(parse_entries(&json).map_err(|e| SourceError::parse("entries.json", e))?);
        }
        if let Some(json) = read("treatments.json")? {
            records.extend(
                parse_treatments(&json).map_err(|e| SourceError::parse("treatments.json", e))?,
            );
        }
        let profiles = match read("profile.json")? {
            Some(json) => parse_profiles(&json).map_err(|e| SourceError::parse("profile.json", e))?,
            None => Vec::new(),
        };

        log::info!(
            "Loaded {} records and {} profiles for {} from {}",
            records.len(),
            profiles.len(),
            identity,
            dir.display()
        );
        self.insert_records(identity.clone(), records);
        self.insert_profiles(identity, profiles);
        Ok(())
    }

    /// Append raw records for a site.
    pub fn insert_records(&self, identity: SourceIdentity, records: Vec<RawRecord>) {
        self.datasets
            .write()
            .entry(identity)
            .or_default()
            .records
            .extend(records);
    }

    /// Append profile documents for a site.
    pub fn insert_profiles(&self, identity: SourceIdentity, profiles: Vec<RawProfile>) {
        self.datasets
            .write()
            .entry(identity)
            .or_default()
            .profiles
            .extend(profiles);
    }

    /// Replace every profile document for a site.
    pub fn replace_profiles(&self, identity: SourceIdentity, profiles: Vec<RawProfile>) {
        self.datasets.write().entry(identity).or_default().profiles = profiles;
    }

    /// When false, every call fails with [`SourceError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.faults.write().available = available;
    }

    /// Make the `n`-th event fetch from now (1-based) fail with a parse error.
    pub fn fail_on_event_fetch(&self, n: usize) {
        let done = self.event_fetch_count();
        self.faults.write().fail_event_fetch = Some(done + n.max(1));
    }

    /// The most recent calls (at most [`FETCH_LOG_CAPACITY`]), oldest first.
    pub fn fetch_log(&self) -> Vec<FetchCall> {
        self.calls.read().recent.iter().cloned().collect()
    }

    /// Event fetches since creation or the last [`Self::clear_fetch_log`].
    pub fn event_fetch_count(&self) -> usize {
        self.calls.read().event_fetches
    }

    pub fn schedule_fetch_count(&self) -> usize {
        self.calls.read().schedule_fetches
    }

    pub fn clear_fetch_log(&self) {
        *self.calls.write() = CallLog::default();
        self.faults.write().fail_event_fetch = None;
    }

    fn check_available(&self, source: &SourceIdentity) -> SourceResult<()> {
        if self.faults.read().available {
            Ok(())
        } else {
            Err(SourceError::unavailable(source, "source marked unavailable"))
        }
    }
}

impl Default for LocalSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for LocalSource {
    async fn fetch_events(
        &self,
        source: &SourceIdentity,
        dates: DateRange,
        timezone: &Tz,
    ) -> SourceResult<Vec<RawRecord>> {
        let call_number = {
            let mut calls = self.calls.write();
            calls.record(FetchCall::Events {
                source: source.clone(),
                dates,
            });
            calls.event_fetches
        };
        self.check_available(source)?;
        if self.faults.read().fail_event_fetch == Some(call_number) {
            return Err(SourceError::parse(
                "events",
                format!("injected failure on fetch {}", call_number),
            ));
        }

        let datasets = self.datasets.read();
        let dataset = datasets
            .get(source)
            .ok_or_else(|| SourceError::not_found(source))?;
        let records: Vec<RawRecord> = dataset
            .records
            .iter()
            .filter(|record| {
                record_instant(record)
                    .map(|instant| dates.contains(instant.with_timezone(timezone).date_naive()))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        log::debug!("Serving {} records for {} {}", records.len(), source, dates);
        Ok(records)
    }

    async fn fetch_schedules(
        &self,
        source: &SourceIdentity,
        _timezone: &Tz,
    ) -> SourceResult<Vec<RawProfile>> {
        self.calls.write().record(FetchCall::Schedules {
            source: source.clone(),
        });
        self.check_available(source)?;
        let datasets = self.datasets.read();
        let dataset = datasets
            .get(source)
            .ok_or_else(|| SourceError::not_found(source))?;
        Ok(dataset.profiles.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn site() -> SourceIdentity {
        SourceIdentity::parse("https://example.herokuapp.com").unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn seeded() -> LocalSource {
        let source = LocalSource::new();
        let records = parse_entries(
            r#"[{"dateString": "2024-01-01T12:00:00Z", "sgv": 100},
                {"dateString": "2024-01-02T03:00:00Z", "sgv": 110},
                {"dateString": "2024-01-03T12:00:00Z", "sgv": 120},
                {"sgv": 130}]"#,
        )
        .unwrap();
        source.insert_records(site(), records);
        source
    }

    #[tokio::test]
    async fn test_dates_filtered_in_requested_zone() {
        let source = seeded();
        let utc: Tz = "UTC".parse().unwrap();
        let ny: Tz = "America/New_York".parse().unwrap();
        let range = DateRange::single(day(1));

        assert_eq!(source.fetch_events(&site(), range, &utc).await.unwrap().len(), 1);
        // 03:00 UTC on Jan 2 is Jan 1 in New York.
        assert_eq!(source.fetch_events(&site(), range, &ny).await.unwrap().len(), 2);
        assert_eq!(source.event_fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_site_is_not_found() {
        let source = seeded();
        let other = SourceIdentity::parse("other.example.org").unwrap();
        let utc: Tz = "UTC".parse().unwrap();
        let err = source.fetch_schedules(&other, &utc).await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_injected_failure_hits_only_target_call() {
        let source = seeded();
        let utc: Tz = "UTC".parse().unwrap();
        let range = DateRange::single(day(1));
        source.fail_on_event_fetch(2);
        assert!(source.fetch_events(&site(), range, &utc).await.is_ok());
        assert!(matches!(
            source.fetch_events(&site(), range, &utc).await,
            Err(SourceError::Parse { .. })
        ));
        assert!(source.fetch_events(&site(), range, &utc).await.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_log_is_bounded() {
        let source = seeded();
        let utc: Tz = "UTC".parse().unwrap();
        let range = DateRange::single(day(1));
        source.fetch_events(&site(), range, &utc).await.unwrap();
        for _ in 0..FETCH_LOG_CAPACITY + 10 {
            source.fetch_schedules(&site(), &utc).await.unwrap();
        }

        let log = source.fetch_log();
        assert_eq!(log.len(), FETCH_LOG_CAPACITY);
        assert!(log.iter().all(|c| matches!(c, FetchCall::Schedules { .. })));
        assert_eq!(source.event_fetch_count(), 1);
        assert_eq!(source.schedule_fetch_count(), FETCH_LOG_CAPACITY + 10);

        source.clear_fetch_log();
        assert!(source.fetch_log().is_empty());
        assert_eq!(source.schedule_fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_source_fails_every_call() {
        let source = seeded();
        let utc: Tz = "UTC".parse().unwrap();
        source.set_available(false);
        assert!(source.fetch_schedules(&site(), &utc).await.is_err());
        source.set_available(true);
        assert!(source.fetch_schedules(&site(), &utc).await.is_ok());
    }
}
