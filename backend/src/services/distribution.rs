//! Glucose distribution table.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::stats::{compute_stats, SummaryStats};
use crate::models::{Event, EventKind};

/// Default range boundaries, mg/dL.
pub const DEFAULT_BOUNDARIES: [f64; 3] = [54.0, 63.0, 130.0];

/// Half-open glucose range `[lower, upper)`; a missing bound is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlucoseRange {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl GlucoseRange {
    pub fn new(lower: Option<f64>, upper: Option<f64>) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower.map_or(true, |lo| value >= lo) && self.upper.map_or(true, |hi| value < hi)
    }

    /// `"[lower, upper)"` with open ends rendered as `0` and `inf`.
    pub fn label(&self) -> String {
        let lower = self
            .lower
            .map_or_else(|| "0".to_string(), |lo| format!("{:.0}", lo));
        let upper = self
            .upper
            .map_or_else(|| "inf".to_string(), |hi| format!("{:.0}", hi));
        format!("[{}, {})", lower, upper)
    }

    /// Consecutive ranges split at `boundaries`, open at both ends.
    ///
    /// `[54, 63, 130]` gives `[-, 54)`, `[54, 63)`, `[63, 130)`, `[130, -)`.
    pub fn from_boundaries(boundaries: &[f64]) -> Vec<GlucoseRange> {
        let mut edges: Vec<Option<f64>> = Vec::with_capacity(boundaries.len() + 2);
        edges.push(None);
        edges.extend(boundaries.iter().copied().map(Some));
        edges.push(None);
        edges
            .windows(2)
            .map(|pair| GlucoseRange::new(pair[0], pair[1]))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRow {
    pub label: String,
    pub range: GlucoseRange,
    /// Fraction of readings in range, 0.0 to 1.0.
    pub fraction: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucoseDistribution {
    pub rows: Vec<DistributionRow>,
    pub readings: usize,
    /// Distinct calendar dates with at least one reading.
    pub days: usize,
    pub stats: SummaryStats,
}

impl GlucoseDistribution {
    /// Short human summary such as `"288 readings over 1 days"`.
    pub fn summary_text(&self) -> String {
        format!("{} readings over {} days", self.readings, self.days)
    }
}

/// Share of sensor readings falling in each range.
pub fn glucose_distribution(events: &[Event], ranges: &[GlucoseRange]) -> GlucoseDistribution {
    let readings: Vec<(&Event, f64)> = events
        .iter()
        .filter(|e| e.kind == EventKind::SensorGlucose)
        .filter_map(|e| e.glucose.map(|g| (e, g)))
        .collect();
    let values: Vec<f64> = readings.iter().map(|(_, g)| *g).collect();
    let days: HashSet<_> = readings.iter().map(|(e, _)| e.date()).collect();
    let total = values.len();

    let rows = ranges
        .iter()
        .map(|range| {
            let count = values.iter().filter(|v| range.contains(**v)).count();
            DistributionRow {
                label: range.label(),
                range: *range,
                fraction: if total == 0 {
                    0.0
                } else {
                    count as f64 / total as f64
                },
                count,
            }
        })
        .collect();

    GlucoseDistribution {
        rows,
        readings: total,
        days: days.len(),
        stats: compute_stats(&values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};

    fn readings(values: &[f64], step_hours: i64) -> Vec<Event> {
        let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut e = Event::new(
                    start + Duration::hours(step_hours * i as i64),
                    EventKind::SensorGlucose,
                );
                e.glucose = Some(*v);
                e
            })
            .collect()
    }

    #[test]
    fn test_default_ranges_partition_readings() {
        let events = readings(&[50.0, 54.0, 62.9, 100.0, 130.0, 250.0], 6);
        let ranges = GlucoseRange::from_boundaries(&DEFAULT_BOUNDARIES);
        let table = glucose_distribution(&events, &ranges);

        let counts: Vec<usize> = table.rows.iter().map(|r| r.count).collect();
        assert_eq!(counts, vec![1, 2, 1, 2]);
        let total: f64 = table.rows.iter().map(|r| r.fraction).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(table.rows[0].label, "[0, 54)");
        assert_eq!(table.rows[3].label, "[130, inf)");
        assert_eq!(table.days, 2);
        assert_eq!(table.summary_text(), "6 readings over 2 days");
    }

    #[test]
    fn test_meter_readings_excluded() {
        let mut events = readings(&[100.0, 40.0], 1);
        events[1].kind = EventKind::MeterGlucose;
        let table = glucose_distribution(&events, &GlucoseRange::from_boundaries(&[54.0]));
        assert_eq!(table.readings, 1);
        assert_eq!(table.rows[0].count, 0);
    }

    #[test]
    fn test_no_readings_gives_zero_fractions() {
        let table = glucose_distribution(&[], &GlucoseRange::from_boundaries(&DEFAULT_BOUNDARIES));
        assert!(table.rows.iter().all(|r| r.fraction == 0.0));
        assert_eq!(table.readings, 0);
    }
}
