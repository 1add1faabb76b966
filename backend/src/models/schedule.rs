//! Basal delivery schedules.
//!
//! A [`ScheduleSet`] holds every schedule version known for one source, ordered
//! by the instant each took effect. Schedule `i` is valid over
//! `[effective_from_i, effective_from_{i+1})`; the newest is open-ended.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::define_id_type;

define_id_type!(ScheduleId);

/// One time-of-day segment of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Seconds since local midnight at which this rate starts.
    pub offset_seconds: u32,
    /// Units per hour.
    pub rate: f64,
}

impl Segment {
    pub fn new(offset_seconds: u32, rate: f64) -> Self {
        Self {
            offset_seconds,
            rate,
        }
    }
}

/// A named, versioned delivery plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub name: String,
    pub effective_from: DateTime<FixedOffset>,
    /// Sorted by `offset_seconds`; the last segment runs until midnight.
    pub segments: Vec<Segment>,
}

impl Schedule {
    /// Build a schedule, sorting its segments by offset.
    ///
    /// Duplicate offsets keep the segment listed last.
    pub fn new(
        id: impl Into<ScheduleId>,
        name: impl Into<String>,
        effective_from: DateTime<FixedOffset>,
        mut segments: Vec<Segment>,
    ) -> Self {
        segments.sort_by_key(|s| s.offset_seconds);
        let mut deduped: Vec<Segment> = Vec::with_capacity(segments.len());
        for segment in segments {
            match deduped.last_mut() {
                Some(last) if last.offset_seconds == segment.offset_seconds => *last = segment,
                _ => deduped.push(segment),
            }
        }
        Self {
            id: id.into(),
            name: name.into(),
            effective_from,
            segments: deduped,
        }
    }

    /// Rate in effect `seconds` after local midnight.
    ///
    /// Before the first segment offset, the last segment (carried over from the
    /// previous day) applies. `None` only for a schedule without segments.
    pub fn rate_at_offset(&self, seconds: u32) -> Option<f64> {
        let idx = self
            .segments
            .partition_point(|segment| segment.offset_seconds <= seconds);
        if idx == 0 {
            self.segments.last().map(|s| s.rate)
        } else {
            Some(self.segments[idx - 1].rate)
        }
    }
}

/// Every known schedule version for one source, ordered by `effective_from`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSet {
    schedules: Vec<Schedule>,
}

impl ScheduleSet {
    /// Order schedules by `effective_from`.
    ///
    /// Schedules without segments are dropped. When two schedules share an
    /// `effective_from` instant, the one retrieved later replaces the other, so
    /// instants are strictly increasing afterwards.
    pub fn new(schedules: Vec<Schedule>) -> Self {
        let mut indexed: Vec<(usize, Schedule)> = schedules
            .into_iter()
            .filter(|s| {
                if s.segments.is_empty() {
                    log::warn!("Dropping schedule {} ({}): no segments", s.id, s.name);
                    false
                } else {
                    true
                }
            })
            .enumerate()
            .collect();
        indexed.sort_by(|(ia, a), (ib, b)| {
            a.effective_from
                .cmp(&b.effective_from)
                .then_with(|| ia.cmp(ib))
        });

        let mut ordered: Vec<Schedule> = Vec::with_capacity(indexed.len());
        for (_, schedule) in indexed {
            match ordered.last_mut() {
                Some(last) if last.effective_from == schedule.effective_from => *last = schedule,
                _ => ordered.push(schedule),
            }
        }
        Self { schedules: ordered }
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Schedule> {
        self.schedules.iter()
    }

    pub fn as_slice(&self) -> &[Schedule] {
        &self.schedules
    }

    /// Index of the schedule governing `instant`, if any.
    pub fn index_at(&self, instant: &DateTime<FixedOffset>) -> Option<usize> {
        let idx = self
            .schedules
            .partition_point(|s| s.effective_from <= *instant);
        idx.checked_sub(1)
    }

    /// Schedule governing `instant`: greatest `effective_from` not after it.
    pub fn active_at(&self, instant: &DateTime<FixedOffset>) -> Option<&Schedule> {
        self.index_at(instant).map(|i| &self.schedules[i])
    }

    /// Exclusive end of the validity window of schedule `index`.
    pub fn valid_until(&self, index: usize) -> Option<DateTime<FixedOffset>> {
        self.schedules.get(index + 1).map(|s| s.effective_from)
    }
}

impl FromIterator<Schedule> for ScheduleSet {
    fn from_iter<I: IntoIterator<Item = Schedule>>(iter: I) -> Self {
        ScheduleSet::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_segments_sorted_and_resolved_by_offset() {
        let schedule = Schedule::new(
            "p1",
            "Default",
            at("2024-01-01T00:00:00Z"),
            vec![Segment::new(21_600, 1.2), Segment::new(0, 0.8)],
        );
        assert_eq!(schedule.segments[0].offset_seconds, 0);
        assert_eq!(schedule.rate_at_offset(0), Some(0.8));
        assert_eq!(schedule.rate_at_offset(21_599), Some(0.8));
        assert_eq!(schedule.rate_at_offset(21_600), Some(1.2));
        assert_eq!(schedule.rate_at_offset(86_399), Some(1.2));
    }

    #[test]
    fn test_time_before_first_segment_wraps_to_last() {
        let schedule = Schedule::new(
            "p1",
            "Late start",
            at("2024-01-01T00:00:00Z"),
            vec![Segment::new(3_600, 0.5), Segment::new(72_000, 0.9)],
        );
        assert_eq!(schedule.rate_at_offset(60), Some(0.9));
    }

    #[test]
    fn test_schedule_set_orders_and_replaces_equal_instants() {
        let set = ScheduleSet::new(vec![
            Schedule::new("b", "B", at("2024-02-01T00:00:00Z"), vec![Segment::new(0, 2.0)]),
            Schedule::new("a", "A", at("2024-01-01T00:00:00Z"), vec![Segment::new(0, 1.0)]),
            Schedule::new("b2", "B2", at("2024-02-01T00:00:00Z"), vec![Segment::new(0, 3.0)]),
            Schedule::new("empty", "E", at("2024-03-01T00:00:00Z"), vec![]),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.as_slice()[0].id.as_str(), "a");
        assert_eq!(set.as_slice()[1].id.as_str(), "b2");
        assert_eq!(set.valid_until(0), Some(at("2024-02-01T00:00:00Z")));
        assert_eq!(set.valid_until(1), None);
    }

    #[test]
    fn test_active_at_respects_effective_from() {
        let set = ScheduleSet::new(vec![Schedule::new(
            "a",
            "A",
            at("2024-01-01T00:00:00Z"),
            vec![Segment::new(0, 1.0)],
        )]);
        assert!(set.active_at(&at("2023-12-31T23:59:59Z")).is_none());
        assert!(set.active_at(&at("2024-01-01T00:00:00Z")).is_some());
    }
}
