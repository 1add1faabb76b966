//! Distinct-Low Detector.
//!
//! Counts hypoglycemic episodes once even when sensor readings oscillate
//! around the threshold. A low reading opens a new episode only if enough
//! readings above the recovery threshold have been seen since the previous
//! episode; the count is of readings, not elapsed time, and they need not be
//! consecutive.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult, ErrorContext};
use crate::models::{Event, EventKind};

/// Detector configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LowThresholds {
    /// Readings at or below this value are low.
    pub low_threshold: f64,
    /// Readings strictly above this value count towards recovery.
    pub recovered_threshold: f64,
    /// Recovered readings that must accumulate between two distinct lows.
    pub recovery_count: i64,
}

impl Default for LowThresholds {
    fn default() -> Self {
        Self {
            low_threshold: 70.0,
            recovered_threshold: 80.0,
            recovery_count: 5,
        }
    }
}

impl LowThresholds {
    /// Reject settings that would produce meaningless episode counts.
    pub fn validate(&self) -> AnalysisResult<()> {
        let fail = |msg: String| {
            Err(AnalysisError::configuration_with_context(
                msg,
                ErrorContext::new("detect_lows").with_entity("thresholds"),
            ))
        };
        if self.recovery_count <= 0 {
            return fail(format!(
                "recovery_count must be positive, got {}",
                self.recovery_count
            ));
        }
        if !self.low_threshold.is_finite() || !self.recovered_threshold.is_finite() {
            return fail("thresholds must be finite numbers".to_string());
        }
        if self.low_threshold > self.recovered_threshold {
            return fail(format!(
                "low_threshold {} exceeds recovered_threshold {}",
                self.low_threshold, self.recovered_threshold
            ));
        }
        Ok(())
    }
}

/// Detector verdict for one sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowFlag {
    pub timestamp: DateTime<FixedOffset>,
    pub date: NaiveDate,
    pub glucose: f64,
    pub is_distinct_low: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyLowCount {
    pub date: NaiveDate,
    pub count: usize,
}

/// Per-reading flags and per-day episode counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LowReport {
    pub flags: Vec<LowFlag>,
    /// One row per date with at least one sensor reading, ascending.
    pub daily_counts: Vec<DailyLowCount>,
}

impl LowReport {
    pub fn total(&self) -> usize {
        self.daily_counts.iter().map(|d| d.count).sum()
    }
}

/// Flag distinct lows among sensor-glucose readings.
///
/// The first low reading is always distinct. Any later low is distinct when
/// more than `recovery_count` recovered readings have accumulated since the
/// last distinct low. Meter readings and events without a value are ignored.
pub fn detect_lows(events: &[Event], thresholds: &LowThresholds) -> AnalysisResult<LowReport> {
    thresholds.validate()?;

    let mut readings: Vec<(&Event, f64)> = events
        .iter()
        .filter(|e| e.kind == EventKind::SensorGlucose)
        .filter_map(|e| e.glucose.filter(|g| g.is_finite()).map(|g| (e, g)))
        .collect();
    readings.sort_by(|a, b| a.0.timestamp.cmp(&b.0.timestamp));

    let mut recovered: i64 = 0;
    let mut last_distinct: Option<i64> = None;
    let mut flags = Vec::with_capacity(readings.len());
    let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();

    for (event, glucose) in readings {
        if glucose > thresholds.recovered_threshold {
            recovered += 1;
        }
        let is_distinct_low = glucose <= thresholds.low_threshold
            && last_distinct.map_or(true, |last| recovered - last > thresholds.recovery_count);
        if is_distinct_low {
            last_distinct = Some(recovered);
        }

        let day = per_day.entry(event.date()).or_insert(0);
        if is_distinct_low {
            *day += 1;
        }
        flags.push(LowFlag {
            timestamp: event.timestamp,
            date: event.date(),
            glucose,
            is_distinct_low,
        });
    }

    let daily_counts = per_day
        .into_iter()
        .map(|(date, count)| DailyLowCount { date, count })
        .collect();
    Ok(LowReport {
        flags,
        daily_counts,
    })
}
