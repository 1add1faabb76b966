//! Serialisable cache snapshot.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::range_cache::{merge_events, CacheKey, RangeCache};
use crate::error::{AnalysisError, AnalysisResult, ErrorContext};
use crate::models::{parse_timezone, to_zone, CalendarFields, Event, Schedule, ScheduleSet};
use crate::source::SourceIdentity;

/// External form of a [`RangeCache`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub source_identity: SourceIdentity,
    /// IANA zone name
    pub timezone: String,
    /// `YYYY-MM-DD`, ascending
    pub covered_dates: Vec<String>,
    pub events: Vec<Event>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
}

impl CacheSnapshot {
    pub fn to_json(&self) -> AnalysisResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            AnalysisError::internal(format!("Failed to serialise cache snapshot: {}", e))
        })
    }

    pub fn from_json(json: &str) -> AnalysisResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            AnalysisError::invalid_input_with_context(
                format!("Malformed cache snapshot: {}", e),
                ErrorContext::new("restore_cache").with_entity("snapshot"),
            )
        })
    }

    /// Write the snapshot as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> AnalysisResult<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|e| {
            AnalysisError::internal(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    pub fn load(path: impl AsRef<Path>) -> AnalysisResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::invalid_input_with_context(
                format!("Failed to read {}: {}", path.display(), e),
                ErrorContext::new("restore_cache").with_entity("snapshot"),
            )
        })?;
        Self::from_json(&json)
    }
}

impl RangeCache {
    /// Externalise the cache; `None` when nothing has been cached yet.
    pub fn snapshot(&self) -> Option<CacheSnapshot> {
        let key = self.key.as_ref()?;
        Some(CacheSnapshot {
            source_identity: key.source.clone(),
            timezone: key.timezone.name().to_string(),
            covered_dates: self
                .covered
                .iter()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect(),
            events: self.events.clone(),
            schedules: self.schedules.as_slice().to_vec(),
        })
    }

    /// Rebuild a cache from a snapshot.
    ///
    /// The time zone and every date are validated; events are re-expressed in
    /// the snapshot zone, re-sorted and deduplicated. Schedules go back through
    /// [`Schedule::new`] so their segments are ordered again.
    pub fn restore(snapshot: CacheSnapshot) -> AnalysisResult<Self> {
        let timezone = parse_timezone(&snapshot.timezone)?;
        let covered = snapshot
            .covered_dates
            .iter()
            .map(|s| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
                    AnalysisError::invalid_input_with_context(
                        format!("Invalid covered date '{}'", s),
                        ErrorContext::new("restore_cache").with_entity("covered_dates"),
                    )
                })
            })
            .collect::<AnalysisResult<_>>()?;

        let events: Vec<Event> = snapshot
            .events
            .into_iter()
            .map(|mut event| {
                event.timestamp = to_zone(&timezone, &event.timestamp);
                event.calendar = CalendarFields::from_instant(&event.timestamp);
                event
            })
            .collect();

        Ok(Self {
            key: Some(CacheKey::new(snapshot.source_identity, timezone)),
            covered,
            events: merge_events(Vec::new(), events),
            schedules: ScheduleSet::new(
                snapshot
                    .schedules
                    .into_iter()
                    .map(|s| Schedule::new(s.id, s.name, s.effective_from, s.segments))
                    .collect(),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventKind, Segment};
    use chrono::DateTime;

    fn cache() -> RangeCache {
        let tz = "America/New_York".parse().unwrap();
        let ts = DateTime::parse_from_rfc3339("2024-01-02T03:00:00Z").unwrap();
        RangeCache {
            key: Some(CacheKey::new(
                SourceIdentity::parse("example.org").unwrap(),
                tz,
            )),
            covered: [NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()]
                .into_iter()
                .collect(),
            events: vec![Event::new(to_zone(&tz, &ts), EventKind::SensorGlucose)],
            schedules: ScheduleSet::new(vec![Schedule::new(
                "p1",
                "Default",
                to_zone(&tz, &ts),
                vec![Segment::new(0, 1.0)],
            )]),
        }
    }

    #[test]
    fn test_snapshot_layout() {
        let snapshot = cache().snapshot().unwrap();
        assert_eq!(snapshot.timezone, "America/New_York");
        assert_eq!(snapshot.covered_dates, vec!["2024-01-01".to_string()]);
        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(json["source_identity"], "https://example.org");
        assert!(json["events"].is_array());
    }

    #[test]
    fn test_restore_preserves_state() {
        let original = cache();
        let restored = RangeCache::restore(original.snapshot().unwrap()).unwrap();
        assert_eq!(restored.key(), original.key());
        assert_eq!(restored.covered_dates(), original.covered_dates());
        assert_eq!(restored.events(), original.events());
        assert_eq!(restored.schedules().len(), 1);
        assert_eq!(restored.events()[0].date().to_string(), "2024-01-01");
    }

    #[test]
    fn test_restore_rejects_bad_zone_and_dates() {
        let mut snapshot = cache().snapshot().unwrap();
        snapshot.timezone = "Nowhere/Special".into();
        assert!(RangeCache::restore(snapshot).is_err());

        let mut snapshot = cache().snapshot().unwrap();
        snapshot.covered_dates.push("2024-13-01".into());
        assert!(matches!(
            RangeCache::restore(snapshot),
            Err(AnalysisError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_restore_reorders_schedule_segments() {
        let mut snapshot = cache().snapshot().unwrap();
        snapshot.schedules[0].segments = vec![
            Segment::new(6 * 3600, 1.2),
            Segment::new(0, 0.8),
            Segment::new(6 * 3600, 1.4),
        ];
        let restored = RangeCache::restore(snapshot).unwrap();
        let schedule = &restored.schedules().as_slice()[0];
        assert_eq!(
            schedule.segments,
            vec![Segment::new(0, 0.8), Segment::new(6 * 3600, 1.4)]
        );
        assert_eq!(schedule.rate_at_offset(3600), Some(0.8));
        assert_eq!(schedule.rate_at_offset(7 * 3600), Some(1.4));
    }

    #[test]
    fn test_empty_cache_has_no_snapshot() {
        assert!(RangeCache::new().snapshot().is_none());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let snapshot = cache().snapshot().unwrap();
        snapshot.save(&path).unwrap();
        assert_eq!(CacheSnapshot::load(&path).unwrap(), snapshot);
    }
}
