//! Basal Timeline Reconstructor.
//!
//! Merges three sources of truth about insulin delivery into one
//! piecewise-constant rate function:
//!
//! - the background schedule ([`ScheduleSet`]),
//! - temporary overrides (temp basal events with a duration and rate),
//! - automatic correction boluses.
//!
//! The change-point timeline is sampled once per minute and aggregated into
//! hourly rows and a typical-day profile.
//!
//! Rates are in units/hour throughout, so the mean of the sixty minute samples
//! of an hour is the average delivery rate for that hour.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::schedule_resolver::{change_instants, rate_at};
use super::stats::{mean, quantile};
use crate::error::AnalysisResult;
use crate::models::{to_zone, AnalysisWindow, Event, EventKind, ScheduleSet};

/// Tolerance when comparing effective and scheduled rates.
const RATE_EPSILON: f64 = 1e-9;

/// One point of the piecewise-constant change-point timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChangePoint {
    pub instant: DateTime<FixedOffset>,
    /// Rate actually delivered from this instant: the temp basal rate when an
    /// override is active, otherwise the scheduled rate.
    pub effective_rate: f64,
    /// Scheduled rate at this instant, ignoring overrides.
    pub scheduled_rate: f64,
}

/// One reconstructed per-minute point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasalSample {
    pub instant: DateTime<FixedOffset>,
    pub effective_rate: f64,
    pub scheduled_rate: f64,
    pub is_overridden: bool,
}

/// Aggregate of one (calendar date, hour) bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyBasal {
    pub date: NaiveDate,
    pub hour_start: DateTime<FixedOffset>,
    /// `HH:MM` local label used to align different days on one axis.
    pub time_label: String,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p10: f64,
    pub p90: f64,
    pub mean_scheduled: f64,
    pub min_scheduled: f64,
    pub max_scheduled: f64,
    pub is_overridden: bool,
}

/// Cross-day statistics for one time-of-day label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypicalDayBasal {
    pub time_label: String,
    /// Number of hourly rows contributing.
    pub days: usize,
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub mean_scheduled: f64,
    pub median_scheduled: f64,
    pub p10_scheduled: f64,
    pub p90_scheduled: f64,
    pub min_scheduled: f64,
    pub max_scheduled: f64,
    /// Number of contributing hours that were overridden.
    pub overridden_days: usize,
}

/// Output of [`reconstruct_basal`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasalSummary {
    pub hourly: Vec<HourlyBasal>,
    pub typical_day: Vec<TypicalDayBasal>,
}

impl BasalSummary {
    pub fn is_empty(&self) -> bool {
        self.hourly.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TempBasal {
    start: DateTime<FixedOffset>,
    expiration: DateTime<FixedOffset>,
    rate: f64,
}

/// Temp basals carrying both a duration and a rate, ordered by start.
fn temp_basals(events: &[Event], tz: &Tz) -> Vec<TempBasal> {
    let mut temps: Vec<TempBasal> = events
        .iter()
        .filter(|e| e.kind == EventKind::TempBasal)
        .filter_map(|e| {
            let duration = e.duration_minutes.filter(|d| d.is_finite() && *d >= 0.0)?;
            let rate = e.rate.filter(|r| r.is_finite())?;
            let start = to_zone(tz, &e.timestamp);
            let millis = (duration * 60_000.0).round();
            let expiration = (millis < i64::MAX as f64)
                .then(|| Duration::try_milliseconds(millis as i64))
                .flatten()
                .and_then(|length| start.checked_add_signed(length));
            let Some(expiration) = expiration else {
                log::warn!(
                    "Skipping temp basal at {} with out-of-range duration {} min",
                    e.timestamp,
                    duration
                );
                return None;
            };
            Some(TempBasal {
                start,
                expiration: to_zone(tz, &expiration),
                rate,
            })
        })
        .collect();
    temps.sort_by(|a, b| a.start.cmp(&b.start));
    temps
}

/// The last temp basal started at or before `instant`, if still running.
fn active_temp<'a>(temps: &'a [TempBasal], instant: &DateTime<FixedOffset>) -> Option<&'a TempBasal> {
    let idx = temps.partition_point(|tb| tb.start <= *instant);
    idx.checked_sub(1)
        .map(|i| &temps[i])
        .filter(|tb| *instant < tb.expiration)
}

/// Build the change-point timeline for `window`.
///
/// The timeline is the sorted union of the window start and end, every temp
/// basal start, every expiration after which the schedule resumes, and every
/// schedule change instant not hidden by an active override.
pub fn change_point_timeline(
    events: &[Event],
    schedules: &ScheduleSet,
    window: &AnalysisWindow,
) -> AnalysisResult<Vec<ChangePoint>> {
    let tz = &window.timezone;
    let start = window.start();
    let end = window.end();
    let temps = temp_basals(events, tz);

    let mut instants = vec![start, end];
    for (i, temp) in temps.iter().enumerate() {
        instants.push(temp.start);
        // Contiguous when the next override starts at or before this one expires.
        let resumes = temps
            .get(i + 1)
            .map_or(true, |next| next.start > temp.expiration);
        if resumes {
            instants.push(temp.expiration);
        }
    }
    instants.extend(
        change_instants(schedules, window.dates, tz)
            .into_iter()
            .filter(|instant| active_temp(&temps, instant).is_none()),
    );
    instants.retain(|instant| *instant >= start && *instant <= end);
    instants.sort();
    instants.dedup();

    instants
        .into_iter()
        .map(|instant| {
            let instant = to_zone(tz, &instant);
            let scheduled_rate = rate_at(schedules, &instant)?;
            let effective_rate = active_temp(&temps, &instant).map_or(scheduled_rate, |tb| tb.rate);
            Ok(ChangePoint {
                instant,
                effective_rate,
                scheduled_rate,
            })
        })
        .collect()
}

/// Scheduled rate changes over the window, unaffected by overrides.
fn scheduled_track(
    schedules: &ScheduleSet,
    window: &AnalysisWindow,
) -> AnalysisResult<Vec<(DateTime<FixedOffset>, f64)>> {
    let tz = &window.timezone;
    let start = window.start();
    let end = window.end();
    let mut instants = change_instants(schedules, window.dates, tz);
    instants.push(start);
    instants.retain(|instant| *instant >= start && *instant < end);
    instants.sort();
    instants.dedup();
    instants
        .into_iter()
        .map(|instant| Ok((instant, rate_at(schedules, &instant)?)))
        .collect()
}

/// Sample the reconstructed delivery rate once per minute over `window`.
///
/// Automatic correction boluses inside the window add their units to the
/// effective rate of the minute containing them.
pub fn minute_samples(
    events: &[Event],
    schedules: &ScheduleSet,
    window: &AnalysisWindow,
) -> AnalysisResult<Vec<BasalSample>> {
    let tz = &window.timezone;
    let points = change_point_timeline(events, schedules, window)?;
    let scheduled = scheduled_track(schedules, window)?;
    if points.is_empty() || scheduled.is_empty() {
        return Ok(Vec::new());
    }

    let start = window.start();
    let end = window.end();
    let minutes = (end - start).num_minutes().max(0);
    let mut samples = Vec::with_capacity(minutes as usize);
    let (mut pi, mut si) = (0usize, 0usize);
    for k in 0..minutes {
        let instant = start + Duration::minutes(k);
        while pi + 1 < points.len() && points[pi + 1].instant <= instant {
            pi += 1;
        }
        while si + 1 < scheduled.len() && scheduled[si + 1].0 <= instant {
            si += 1;
        }
        samples.push(BasalSample {
            instant: to_zone(tz, &instant),
            effective_rate: points[pi].effective_rate,
            scheduled_rate: scheduled[si].1,
            is_overridden: false,
        });
    }

    for bolus in events.iter().filter(|e| e.is_correction_bolus()) {
        if bolus.timestamp < start || bolus.timestamp >= end {
            continue;
        }
        let index = ((bolus.timestamp - start).num_seconds() / 60) as usize;
        if let (Some(sample), Some(units)) = (samples.get_mut(index), bolus.insulin) {
            sample.effective_rate += units;
        }
    }

    for sample in &mut samples {
        sample.is_overridden = (sample.effective_rate - sample.scheduled_rate).abs() > RATE_EPSILON;
    }
    Ok(samples)
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Aggregate per-minute samples into consecutive 60-minute rows.
pub fn aggregate_hourly(samples: &[BasalSample]) -> Vec<HourlyBasal> {
    samples
        .chunks(60)
        .filter_map(|chunk| {
            let first = chunk.first()?;
            let effective: Vec<f64> = chunk.iter().map(|s| s.effective_rate).collect();
            let scheduled: Vec<f64> = chunk.iter().map(|s| s.scheduled_rate).collect();
            let (min, max) = min_max(&effective);
            let (min_scheduled, max_scheduled) = min_max(&scheduled);
            Some(HourlyBasal {
                date: first.instant.date_naive(),
                hour_start: first.instant,
                time_label: first.instant.format("%H:%M").to_string(),
                mean: mean(&effective)?,
                min,
                max,
                p10: quantile(&effective, 0.1)?,
                p90: quantile(&effective, 0.9)?,
                mean_scheduled: mean(&scheduled)?,
                min_scheduled,
                max_scheduled,
                is_overridden: chunk.iter().any(|s| s.is_overridden),
            })
        })
        .collect()
}

/// Group hourly rows by time-of-day label across days.
pub fn typical_day(hourly: &[HourlyBasal]) -> Vec<TypicalDayBasal> {
    let mut groups: BTreeMap<&str, Vec<&HourlyBasal>> = BTreeMap::new();
    for row in hourly {
        groups.entry(row.time_label.as_str()).or_default().push(row);
    }

    groups
        .into_iter()
        .filter_map(|(label, rows)| {
            let means: Vec<f64> = rows.iter().map(|r| r.mean).collect();
            let scheduled: Vec<f64> = rows.iter().map(|r| r.mean_scheduled).collect();
            let (min, max) = min_max(&means);
            Some(TypicalDayBasal {
                time_label: label.to_string(),
                days: rows.len(),
                median: quantile(&means, 0.5)?,
                p10: quantile(&means, 0.1)?,
                p90: quantile(&means, 0.9)?,
                min,
                max,
                mean: mean(&means)?,
                mean_scheduled: mean(&scheduled)?,
                median_scheduled: quantile(&scheduled, 0.5)?,
                p10_scheduled: quantile(&scheduled, 0.1)?,
                p90_scheduled: quantile(&scheduled, 0.9)?,
                min_scheduled: rows
                    .iter()
                    .map(|r| r.min_scheduled)
                    .fold(f64::INFINITY, f64::min),
                max_scheduled: rows
                    .iter()
                    .map(|r| r.max_scheduled)
                    .fold(f64::NEG_INFINITY, f64::max),
                overridden_days: rows.iter().filter(|r| r.is_overridden).count(),
            })
        })
        .collect()
}

/// Reconstruct hourly basal delivery for `window`.
///
/// With no events at all the summary is empty. When the window start predates
/// every schedule the call fails with
/// [`crate::error::AnalysisError::UnresolvableSchedule`] rather than returning
/// a partial timeline. When `include_scheduled_only` is false, hours that
/// followed the schedule exactly are dropped from both outputs.
pub fn reconstruct_basal(
    events: &[Event],
    schedules: &ScheduleSet,
    window: &AnalysisWindow,
    include_scheduled_only: bool,
) -> AnalysisResult<BasalSummary> {
    if events.is_empty() {
        log::debug!("No events in {}; basal summary is empty", window.dates);
        return Ok(BasalSummary::default());
    }

    let samples = minute_samples(events, schedules, window)
        .map_err(|e| e.with_operation("reconstruct_basal"))?;
    let mut hourly = aggregate_hourly(&samples);
    if !include_scheduled_only {
        hourly.retain(|row| row.is_overridden);
    }
    let typical_day = typical_day(&hourly);

    log::debug!(
        "Reconstructed {} minute samples into {} hourly rows for {}",
        samples.len(),
        hourly.len(),
        window.dates
    );
    Ok(BasalSummary {
        hourly,
        typical_day,
    })
}

#[cfg(test)]
#[path = "basal_tests.rs"]
mod tests;
