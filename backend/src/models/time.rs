//! Time zone and calendar helpers.
//!
//! All date and hour bucketing happens in a single caller-chosen zone, so the
//! helpers here take an explicit [`Tz`] rather than relying on the host zone.

use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult, ErrorContext};

/// Parse an IANA time zone name such as `America/New_York`.
pub fn parse_timezone(name: &str) -> AnalysisResult<Tz> {
    name.trim().parse::<Tz>().map_err(|_| {
        AnalysisError::configuration_with_context(
            format!("Unknown time zone '{}'", name),
            ErrorContext::new("parse_timezone").with_entity("timezone"),
        )
    })
}

/// Resolve a wall-clock time in `tz` to an instant.
///
/// Ambiguous times (clocks going back) take the earlier instant. Times inside a
/// DST gap shift forward to the first valid minute after the gap.
pub fn localize(tz: &Tz, local: NaiveDateTime) -> DateTime<FixedOffset> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.fixed_offset(),
        LocalResult::Ambiguous(earliest, _) => earliest.fixed_offset(),
        LocalResult::None => {
            let mut probe = local;
            // Real-world gaps never exceed a few hours.
            for _ in 0..(4 * 60) {
                probe += Duration::minutes(1);
                if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
                    return dt.fixed_offset();
                }
            }
            tz.from_utc_datetime(&local).fixed_offset()
        }
    }
}

/// Instant of local midnight starting `date` in `tz`.
pub fn start_of_day(tz: &Tz, date: NaiveDate) -> DateTime<FixedOffset> {
    localize(tz, date.and_time(NaiveTime::MIN))
}

/// Express an instant in the analysis zone.
pub fn to_zone<T: TimeZone>(tz: &Tz, instant: &DateTime<T>) -> DateTime<FixedOffset> {
    instant.with_timezone(tz).fixed_offset()
}

/// Seconds elapsed since local midnight for an instant already expressed in the
/// analysis zone.
pub fn seconds_since_midnight(instant: &DateTime<FixedOffset>) -> u32 {
    instant.time().num_seconds_from_midnight()
}

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a validated range; `start` must not be after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> AnalysisResult<Self> {
        if start > end {
            return Err(AnalysisError::invalid_input_with_context(
                format!("Start date {} is after end date {}", start, end),
                ErrorContext::new("date_range").with_entity("dates"),
            ));
        }
        Ok(Self { start, end })
    }

    /// Range covering a single day.
    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Every date in the range, in ascending order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of days, inclusive of both ends.
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Analysis window: a date range interpreted in a time zone.
///
/// The window spans from local midnight of `dates.start` up to, but excluding,
/// local midnight after `dates.end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisWindow {
    pub dates: DateRange,
    pub timezone: Tz,
}

impl AnalysisWindow {
    pub fn new(dates: DateRange, timezone: Tz) -> Self {
        Self { dates, timezone }
    }

    pub fn start(&self) -> DateTime<FixedOffset> {
        start_of_day(&self.timezone, self.dates.start)
    }

    pub fn end(&self) -> DateTime<FixedOffset> {
        let next = self.dates.end.succ_opt().unwrap_or(self.dates.end);
        start_of_day(&self.timezone, next)
    }
}
