//! Event Normalizer.
//!
//! Converts the raw record union into the uniform, time-sorted [`Event`]
//! sequence, and raw profile documents into [`Schedule`]s. Both conversions are
//! total: a record that cannot be placed in time is dropped and counted, never
//! turned into an error for the batch.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::{
    to_zone, CalendarFields, Event, EventKind, RawBasalSegment, RawEntry, RawProfile, RawRecord,
    RawTreatment, Schedule, Segment,
};

/// Note text the dosing algorithm attaches to automatic corrections.
pub const AUTOMATIC_CORRECTION_NOTE: &str = "Automatic Bolus/Correction";

/// Output of [`normalize_records`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizeReport {
    /// Events sorted ascending by timestamp (stable with respect to input order).
    pub events: Vec<Event>,
    /// Records dropped for lack of a usable timestamp.
    pub dropped: usize,
}

/// Parse a timestamp as RFC 3339, a naive ISO string (read as UTC), or epoch
/// milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    raw.parse::<f64>()
        .ok()
        .and_then(|ms| from_epoch_millis(ms as i64))
}

fn from_epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}

fn entry_kind(entry: &RawEntry) -> EventKind {
    match entry.entry_type.as_deref() {
        Some("sgv") => EventKind::SensorGlucose,
        Some("mbg") => EventKind::MeterGlucose,
        Some(other) => EventKind::Other(other.to_string()),
        None if entry.sgv.is_some() => EventKind::SensorGlucose,
        None if entry.mbg.is_some() => EventKind::MeterGlucose,
        None => EventKind::Other("entry".to_string()),
    }
}

fn treatment_kind(treatment: &RawTreatment) -> EventKind {
    let name = treatment
        .event_type
        .as_deref()
        .or(treatment.treatment_type.as_deref());
    let delivered_rate = treatment.absolute.or(treatment.rate);

    match name {
        Some("Temp Basal") => EventKind::TempBasal,
        Some("Site Change") => EventKind::SiteChange,
        _ if treatment.duration.is_some() && delivered_rate.is_some() => EventKind::TempBasal,
        Some(n) if n.contains("Bolus") => EventKind::Bolus,
        _ if treatment.insulin.is_some() => EventKind::Bolus,
        Some(n) => EventKind::Other(n.to_string()),
        None => EventKind::Other("treatment".to_string()),
    }
}

fn entry_instant(entry: &RawEntry) -> Option<DateTime<Utc>> {
    entry
        .date
        .and_then(from_epoch_millis)
        .or_else(|| entry.date_string.as_deref().and_then(parse_timestamp))
}

fn treatment_instant(treatment: &RawTreatment) -> Option<DateTime<Utc>> {
    treatment
        .created_at
        .as_deref()
        .and_then(parse_timestamp)
        .or_else(|| treatment.timestamp.as_deref().and_then(parse_timestamp))
}

/// Instant a raw record refers to, if it carries a usable timestamp.
///
/// Entries use `date` (epoch ms) before `dateString`; treatments use
/// `created_at` before `timestamp`.
pub fn record_instant(record: &RawRecord) -> Option<DateTime<Utc>> {
    match record {
        RawRecord::Entry(entry) => entry_instant(entry),
        RawRecord::Treatment(treatment) => treatment_instant(treatment),
    }
}

fn normalize_entry(entry: RawEntry, tz: &Tz) -> Option<Event> {
    let instant = entry_instant(&entry)?;
    let timestamp = to_zone(tz, &instant);
    let mut event = Event::new(timestamp, entry_kind(&entry));
    event.glucose = entry.sgv.or(entry.mbg);
    Some(event)
}

fn normalize_treatment(treatment: RawTreatment, tz: &Tz) -> Option<Event> {
    let instant = treatment_instant(&treatment)?;
    let timestamp = to_zone(tz, &instant);
    let kind = treatment_kind(&treatment);

    let automatic = treatment.notes.as_deref() == Some(AUTOMATIC_CORRECTION_NOTE)
        || treatment.automatic.unwrap_or(false);

    Some(Event {
        calendar: CalendarFields::from_instant(&timestamp),
        timestamp,
        kind,
        glucose: None,
        duration_minutes: treatment.duration,
        rate: treatment.absolute.or(treatment.rate),
        insulin: treatment.insulin,
        carbs: treatment.carbs,
        note: treatment.notes,
        reason: treatment.reason,
        entered_by: treatment.entered_by.or(treatment.entered_by_alt),
        automatic,
    })
}

/// Normalize raw records into events expressed in `tz`.
pub fn normalize_records(records: Vec<RawRecord>, tz: &Tz) -> NormalizeReport {
    let total = records.len();
    let mut events: Vec<Event> = records
        .into_iter()
        .filter_map(|record| match record {
            RawRecord::Entry(entry) => normalize_entry(entry, tz),
            RawRecord::Treatment(treatment) => normalize_treatment(treatment, tz),
        })
        .collect();
    let dropped = total - events.len();
    if dropped > 0 {
        log::warn!("Dropped {} of {} records without a usable timestamp", dropped, total);
    }

    // Vec::sort_by is stable, so ties keep retrieval order.
    events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    NormalizeReport { events, dropped }
}

fn segment_offset(segment: &RawBasalSegment) -> Option<u32> {
    if let Some(seconds) = segment.time_as_seconds {
        if (0.0..86_400.0).contains(&seconds) {
            return Some(seconds as u32);
        }
    }
    let time = segment.time.as_deref()?;
    let (h, m) = time.split_once(':')?;
    let hours: u32 = h.trim().parse().ok()?;
    let minutes: u32 = m.trim().parse().ok()?;
    (hours < 24 && minutes < 60).then_some(hours * 3600 + minutes * 60)
}

/// Convert profile documents into schedules using each document's default store.
///
/// Documents without a start date, a default store or any valid segment are
/// skipped with a warning. Order of the input is preserved so that
/// [`crate::models::ScheduleSet::new`] can apply its retrieval-order tie break.
pub fn normalize_profiles(profiles: Vec<RawProfile>, tz: &Tz) -> Vec<Schedule> {
    let mut schedules = Vec::with_capacity(profiles.len());
    for (index, profile) in profiles.into_iter().enumerate() {
        let id = profile
            .id
            .clone()
            .unwrap_or_else(|| format!("profile-{}", index));
        let Some(name) = profile.default_profile.clone() else {
            log::warn!("Skipping profile {}: no default profile name", id);
            continue;
        };
        let Some(store) = profile.store.get(&name) else {
            log::warn!("Skipping profile {}: default store '{}' missing", id, name);
            continue;
        };
        let Some(effective_from) = profile
            .start_date
            .as_deref()
            .and_then(parse_timestamp)
            .map(|dt| to_zone(tz, &dt))
        else {
            log::warn!("Skipping profile {}: no usable start date", id);
            continue;
        };

        let segments: Vec<Segment> = store
            .basal
            .iter()
            .filter_map(|raw| Some(Segment::new(segment_offset(raw)?, raw.value?)))
            .collect();
        if segments.is_empty() {
            log::warn!("Skipping profile {}: no valid basal segments", id);
            continue;
        }

        schedules.push(Schedule::new(id, name, effective_from, segments));
    }
    schedules
}
