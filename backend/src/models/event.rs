//! Normalized event model.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// Discriminates what an [`Event`] records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SensorGlucose,
    MeterGlucose,
    TempBasal,
    Bolus,
    SiteChange,
    /// Any other treatment or entry type, keyed by its raw type name.
    Other(String),
}

/// Calendar fields derived once from the event timestamp in the analysis zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFields {
    pub date: NaiveDate,
    pub weekday: Weekday,
    /// Monday = 0
    pub weekday_number: u32,
    pub time_of_day: NaiveTime,
}

impl CalendarFields {
    pub fn from_instant(instant: &DateTime<FixedOffset>) -> Self {
        let weekday = instant.weekday();
        Self {
            date: instant.date_naive(),
            weekday,
            weekday_number: weekday.num_days_from_monday(),
            time_of_day: instant.time(),
        }
    }

    /// `HH:MM` label for the time of day.
    pub fn time_label(&self) -> String {
        self.time_of_day.format("%H:%M").to_string()
    }
}

/// One glucose reading or treatment occurrence.
///
/// Optional fields stay `None` when the source omitted them; aggregates skip
/// them instead of reading them as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<FixedOffset>,
    pub kind: EventKind,
    pub glucose: Option<f64>,
    pub duration_minutes: Option<f64>,
    /// Delivered basal rate for temp basals, in units/hour.
    pub rate: Option<f64>,
    pub insulin: Option<f64>,
    pub carbs: Option<f64>,
    pub note: Option<String>,
    pub reason: Option<String>,
    pub entered_by: Option<String>,
    /// Bolus delivered automatically as a correction by the dosing algorithm.
    #[serde(default)]
    pub automatic: bool,
    pub calendar: CalendarFields,
}

impl Event {
    /// Minimal event of the given kind; optional fields are absent.
    pub fn new(timestamp: DateTime<FixedOffset>, kind: EventKind) -> Self {
        Self {
            calendar: CalendarFields::from_instant(&timestamp),
            timestamp,
            kind,
            glucose: None,
            duration_minutes: None,
            rate: None,
            insulin: None,
            carbs: None,
            note: None,
            reason: None,
            entered_by: None,
            automatic: false,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.calendar.date
    }

    /// Key used for idempotent merging.
    pub fn dedup_key(&self) -> (i64, EventKind) {
        (
            self.timestamp.timestamp_nanos_opt().unwrap_or_else(|| {
                self.timestamp.timestamp_millis().saturating_mul(1_000_000)
            }),
            self.kind.clone(),
        )
    }

    /// Automatic correction bolus carrying an insulin amount.
    pub fn is_correction_bolus(&self) -> bool {
        self.kind == EventKind::Bolus && self.automatic && self.insulin.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_fields_follow_local_offset() {
        // 2024-01-01 23:30 at UTC-5 is still Monday Jan 1 locally.
        let ts = DateTime::parse_from_rfc3339("2024-01-01T23:30:00-05:00").unwrap();
        let event = Event::new(ts, EventKind::SensorGlucose);
        assert_eq!(event.date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(event.calendar.weekday, Weekday::Mon);
        assert_eq!(event.calendar.weekday_number, 0);
        assert_eq!(event.calendar.time_label(), "23:30");
    }

    #[test]
    fn test_other_kinds_are_distinct_in_dedup_key() {
        let ts = DateTime::parse_from_rfc3339("2024-01-01T08:00:00Z").unwrap();
        let a = Event::new(ts, EventKind::Other("Note".into()));
        let b = Event::new(ts, EventKind::Other("Exercise".into()));
        assert_ne!(a.dedup_key(), b.dedup_key());
    }
}
