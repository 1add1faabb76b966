//! Incremental range cache.
//!
//! Tracks which calendar dates have been retrieved for one source and time
//! zone, fetches only the missing runs of dates, and merges the results into
//! a sorted, deduplicated event sequence. A failed fetch leaves the cache
//! exactly as it was.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::runs::contiguous_runs;
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{DateRange, Event, ScheduleSet};
use crate::services::normalizer::{normalize_profiles, normalize_records};
use crate::source::{EventSource, SourceIdentity};

/// What a cache is built for. Changing either part forces a rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub source: SourceIdentity,
    pub timezone: Tz,
}

impl CacheKey {
    pub fn new(source: SourceIdentity, timezone: Tz) -> Self {
        Self { source, timezone }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.source, self.timezone.name())
    }
}

/// How an [`RangeCache::ensure`] call was satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// Cache was empty or built for another key; fetched from scratch.
    Rebuilt,
    /// Only the listed runs of missing dates were fetched.
    Incremental { runs: Vec<DateRange> },
    /// Everything was already covered; nothing was fetched.
    Hit,
}

/// Events and schedules covering a requested range.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeView {
    pub events: Vec<Event>,
    pub schedules: ScheduleSet,
    pub outcome: FetchOutcome,
}

/// Per-session working set. Owned by one caller at a time.
#[derive(Debug, Clone, Default)]
pub struct RangeCache {
    pub(crate) key: Option<CacheKey>,
    pub(crate) covered: BTreeSet<NaiveDate>,
    pub(crate) events: Vec<Event>,
    pub(crate) schedules: ScheduleSet,
}

/// Concatenate, stable-sort by timestamp and drop later duplicates of the
/// same `(instant, kind)`.
pub(crate) fn merge_events(existing: Vec<Event>, incoming: Vec<Event>) -> Vec<Event> {
    let mut all = existing;
    all.extend(incoming);
    all.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    let mut seen = HashSet::with_capacity(all.len());
    all.retain(|event| seen.insert(event.dedup_key()));
    all
}

impl RangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(&self) -> Option<&CacheKey> {
        self.key.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_none()
    }

    pub fn covered_dates(&self) -> &BTreeSet<NaiveDate> {
        &self.covered
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn schedules(&self) -> &ScheduleSet {
        &self.schedules
    }

    /// Drop everything; the next [`RangeCache::ensure`] rebuilds and refetches
    /// schedules.
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }

    /// Runs of dates in `dates` not yet covered.
    pub fn missing_runs(&self, dates: DateRange) -> Vec<DateRange> {
        let missing: BTreeSet<NaiveDate> = dates.dates().filter(|d| !self.covered.contains(d)).collect();
        contiguous_runs(&missing)
    }

    /// Cached events whose local date falls in `dates`.
    pub fn subset(&self, dates: DateRange) -> Vec<Event> {
        self.events
            .iter()
            .filter(|event| dates.contains(event.date()))
            .cloned()
            .collect()
    }

    /// Make sure every date of `dates` is cached for `key` and return the
    /// events falling inside it.
    ///
    /// Schedules are only fetched when the cache is rebuilt. Any fetch failure
    /// aborts the call with [`AnalysisError::SourceUnavailable`] and no state
    /// change.
    pub async fn ensure<S>(
        &mut self,
        source: &S,
        key: &CacheKey,
        dates: DateRange,
    ) -> AnalysisResult<RangeView>
    where
        S: EventSource + ?Sized,
    {
        let tz = &key.timezone;
        let outcome = if self.key.as_ref() != Some(key) {
            if let Some(previous) = &self.key {
                log::info!("Cache key changed from {} to {}; rebuilding", previous, key);
            }

            let raw = source
                .fetch_events(&key.source, dates, tz)
                .await
                .map_err(|e| AnalysisError::from(e).with_operation("ensure_range"))?;
            let profiles = source
                .fetch_schedules(&key.source, tz)
                .await
                .map_err(|e| AnalysisError::from(e).with_operation("ensure_range"))?;

            let report = normalize_records(raw, tz);
            let schedules = ScheduleSet::new(normalize_profiles(profiles, tz));

            self.key = Some(key.clone());
            self.covered = dates.dates().collect();
            self.events = merge_events(Vec::new(), report.events);
            self.schedules = schedules;
            log::info!(
                "Rebuilt cache for {} over {}: {} events, {} schedules",
                key,
                dates,
                self.events.len(),
                self.schedules.len()
            );
            FetchOutcome::Rebuilt
        } else {
            let runs = self.missing_runs(dates);
            if runs.is_empty() {
                log::debug!("Cache hit for {} over {}", key, dates);
                FetchOutcome::Hit
            } else {
                let mut fetched = Vec::new();
                for run in &runs {
                    let raw = source
                        .fetch_events(&key.source, *run, tz)
                        .await
                        .map_err(|e| AnalysisError::from(e).with_operation("ensure_range"))?;
                    fetched.extend(normalize_records(raw, tz).events);
                }

                let before = self.events.len();
                self.events = merge_events(std::mem::take(&mut self.events), fetched);
                for run in &runs {
                    self.covered.extend(run.dates());
                }
                log::info!(
                    "Fetched {} missing run(s) for {}: {} new events",
                    runs.len(),
                    key,
                    self.events.len() - before
                );
                FetchOutcome::Incremental { runs }
            }
        };

        Ok(RangeView {
            events: self.subset(dates),
            schedules: self.schedules.clone(),
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventKind;
    use chrono::{DateTime, Duration};

    fn event(minutes: i64, kind: EventKind) -> Event {
        let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
        Event::new(start + Duration::minutes(minutes), kind)
    }

    #[test]
    fn test_merge_keeps_first_duplicate_and_sorts() {
        let mut cached = event(10, EventKind::SensorGlucose);
        cached.glucose = Some(100.0);
        let mut refetched = event(10, EventKind::SensorGlucose);
        refetched.glucose = Some(999.0);

        let merged = merge_events(
            vec![cached, event(20, EventKind::Bolus)],
            vec![event(5, EventKind::SiteChange), refetched, event(10, EventKind::Bolus)],
        );
        let minutes: Vec<i64> = merged
            .iter()
            .map(|e| (e.timestamp - event(0, EventKind::Bolus).timestamp).num_minutes())
            .collect();
        assert_eq!(minutes, vec![5, 10, 10, 20]);
        assert_eq!(merged[1].glucose, Some(100.0));
        assert_eq!(merged[2].kind, EventKind::Bolus);
    }

    #[test]
    fn test_missing_runs_on_empty_cache_is_whole_range() {
        let cache = RangeCache::new();
        let d = |n| NaiveDate::from_ymd_opt(2024, 1, n).unwrap();
        let range = DateRange::new(d(1), d(5)).unwrap();
        assert_eq!(cache.missing_runs(range), vec![range]);
    }
}
