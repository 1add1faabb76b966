//! Schedule Resolver.
//!
//! Answers two questions over a [`ScheduleSet`]: which rate was scheduled at an
//! instant, and at which instants inside a date range the scheduled rate could
//! change.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime};
use chrono_tz::Tz;

use crate::error::{AnalysisError, ErrorContext};
use crate::models::{localize, seconds_since_midnight, to_zone, DateRange, ScheduleSet};

/// An instant predates every known schedule.
///
/// Returned instead of a rate so callers cannot mistake missing data for zero
/// delivery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no schedule in effect at {instant}")]
pub struct Unresolvable {
    pub instant: DateTime<FixedOffset>,
}

impl From<Unresolvable> for AnalysisError {
    fn from(err: Unresolvable) -> Self {
        AnalysisError::unresolvable_with_context(
            err.to_string(),
            ErrorContext::new("rate_at")
                .with_entity("schedule")
                .with_details(err.instant.to_rfc3339()),
        )
    }
}

/// Delivery rate in effect at `instant`.
///
/// Picks the schedule with the greatest `effective_from` not after `instant`,
/// then the segment with the greatest offset not after the local seconds since
/// midnight. `instant` must already be expressed in the analysis zone.
pub fn rate_at(
    schedules: &ScheduleSet,
    instant: &DateTime<FixedOffset>,
) -> Result<f64, Unresolvable> {
    schedules
        .active_at(instant)
        .and_then(|schedule| schedule.rate_at_offset(seconds_since_midnight(instant)))
        .ok_or(Unresolvable { instant: *instant })
}

/// Every instant within `range` at which the resolved rate could change.
///
/// Each schedule contributes its segment boundaries on every calendar day of
/// `range`, kept only inside the schedule's validity window, plus its own
/// `effective_from` when that falls inside `range`. Sorted and deduplicated.
pub fn change_instants(
    schedules: &ScheduleSet,
    range: DateRange,
    tz: &Tz,
) -> Vec<DateTime<FixedOffset>> {
    let range_start = localize(tz, range.start.and_time(NaiveTime::MIN));
    let range_end = range
        .end
        .succ_opt()
        .map(|d| localize(tz, d.and_time(NaiveTime::MIN)))
        .unwrap_or_else(|| range_start + Duration::days(range.num_days()));

    let mut instants = Vec::new();
    for (index, schedule) in schedules.iter().enumerate() {
        let valid_from = schedule.effective_from;
        let valid_until = schedules.valid_until(index);
        if valid_until.is_some_and(|until| until <= range_start) || valid_from >= range_end {
            continue;
        }

        for date in range.dates() {
            for segment in &schedule.segments {
                let local = date.and_time(NaiveTime::MIN)
                    + Duration::seconds(i64::from(segment.offset_seconds));
                let instant = localize(tz, local);
                let in_validity =
                    instant >= valid_from && valid_until.map_or(true, |until| instant < until);
                if in_validity && instant >= range_start && instant < range_end {
                    instants.push(instant);
                }
            }
        }

        if valid_from >= range_start && valid_from < range_end {
            instants.push(to_zone(tz, &valid_from));
        }
    }

    instants.sort();
    instants.dedup();
    instants
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Schedule, Segment};
    use chrono::NaiveDate;

    fn tz() -> Tz {
        "America/New_York".parse().unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        localize(&tz(), date(y, m, d).and_hms_opt(h, min, 0).unwrap())
    }

    fn two_schedules() -> ScheduleSet {
        ScheduleSet::new(vec![
            Schedule::new(
                "a",
                "A",
                local(2024, 1, 1, 0, 0),
                vec![Segment::new(0, 0.8), Segment::new(6 * 3600, 1.2)],
            ),
            Schedule::new(
                "b",
                "B",
                local(2024, 1, 3, 12, 0),
                vec![Segment::new(0, 0.5), Segment::new(18 * 3600, 0.7)],
            ),
        ])
    }

    #[test]
    fn test_rate_at_selects_schedule_then_segment() {
        let set = two_schedules();
        assert_eq!(rate_at(&set, &local(2024, 1, 2, 5, 59)), Ok(0.8));
        assert_eq!(rate_at(&set, &local(2024, 1, 2, 6, 0)), Ok(1.2));
        // Schedule B took over at noon on Jan 3.
        assert_eq!(rate_at(&set, &local(2024, 1, 3, 11, 59)), Ok(1.2));
        assert_eq!(rate_at(&set, &local(2024, 1, 3, 12, 0)), Ok(0.5));
        assert_eq!(rate_at(&set, &local(2024, 1, 3, 18, 30)), Ok(0.7));
    }

    #[test]
    fn test_rate_at_before_all_schedules_is_unresolvable() {
        let set = two_schedules();
        let instant = local(2023, 12, 31, 23, 0);
        assert_eq!(rate_at(&set, &instant), Err(Unresolvable { instant }));
        let err: AnalysisError = Unresolvable { instant }.into();
        assert!(matches!(err, AnalysisError::UnresolvableSchedule { .. }));
    }

    #[test]
    fn test_change_instants_respect_validity_windows() {
        let set = two_schedules();
        let range = DateRange::new(date(2024, 1, 2), date(2024, 1, 4)).unwrap();
        let instants = change_instants(&set, range, &tz());
        let expected = vec![
            local(2024, 1, 2, 0, 0),
            local(2024, 1, 2, 6, 0),
            local(2024, 1, 3, 0, 0),
            local(2024, 1, 3, 6, 0),
            // B's effective_from
            local(2024, 1, 3, 12, 0),
            local(2024, 1, 3, 18, 0),
            local(2024, 1, 4, 0, 0),
            local(2024, 1, 4, 18, 0),
        ];
        assert_eq!(instants, expected);
    }

    #[test]
    fn test_change_instants_empty_without_schedules() {
        let range = DateRange::single(date(2024, 1, 1));
        assert!(change_instants(&ScheduleSet::default(), range, &tz()).is_empty());
    }
}
