//! Site-change impact.
//!
//! Joins each sensor reading to the most recent preceding site change and
//! summarises glucose by time since that change.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};

use super::stats::{compute_stats, median_count};
use crate::error::{AnalysisError, AnalysisResult, ErrorContext};
use crate::models::{Event, EventKind};

/// How readings are binned relative to the site change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteChangeView {
    /// Bin by hours elapsed since the change.
    #[default]
    OverSite,
    /// Bin by hour of day, one series per whole day since the change.
    ByTimeOfDay,
}

impl FromStr for SiteChangeView {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "over_site" | "site" | "1" => Ok(SiteChangeView::OverSite),
            "by_time_of_day" | "time_of_day" | "2" => Ok(SiteChangeView::ByTimeOfDay),
            other => Err(AnalysisError::invalid_input_with_context(
                format!("Unknown site change view '{}'", other),
                ErrorContext::new("site_change_impact").with_entity("view"),
            )),
        }
    }
}

/// Glucose statistics for one bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteChangeBin {
    /// Bin centre in hours (since the change, or since midnight).
    pub bin_center_hours: f64,
    /// Whole days since the change; set only for [`SiteChangeView::ByTimeOfDay`].
    pub days_since_change: Option<i64>,
    pub mean: f64,
    /// Sample standard deviation.
    pub std_dev: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteChangeImpact {
    pub view: SiteChangeView,
    pub bin_hours: u32,
    pub has_site_changes: bool,
    pub bins: Vec<SiteChangeBin>,
}

fn bin_center(hours: f64, bin_hours: f64) -> f64 {
    (hours / bin_hours).floor() * bin_hours + bin_hours / 2.0
}

/// Summarise sensor glucose by time since the last site change.
///
/// Readings before the first site change are ignored. Bins holding no more
/// than a tenth of the median bin count are dropped as too sparse.
pub fn site_change_impact(
    events: &[Event],
    bin_hours: u32,
    view: SiteChangeView,
) -> AnalysisResult<SiteChangeImpact> {
    if !(1..=24).contains(&bin_hours) {
        return Err(AnalysisError::invalid_input_with_context(
            format!("bin_hours must be between 1 and 24, got {}", bin_hours),
            ErrorContext::new("site_change_impact").with_entity("bin_hours"),
        ));
    }

    let mut changes: Vec<DateTime<FixedOffset>> = events
        .iter()
        .filter(|e| e.kind == EventKind::SiteChange)
        .map(|e| e.timestamp)
        .collect();
    changes.sort();

    if changes.is_empty() {
        return Ok(SiteChangeImpact {
            view,
            bin_hours,
            has_site_changes: false,
            bins: Vec::new(),
        });
    }

    let width = f64::from(bin_hours);
    // Keys are (days since change, bin centre in hundredths of an hour).
    let mut groups: BTreeMap<(i64, i64), Vec<f64>> = BTreeMap::new();
    for event in events.iter().filter(|e| e.kind == EventKind::SensorGlucose) {
        let Some(glucose) = event.glucose else {
            continue;
        };
        let idx = changes.partition_point(|c| *c <= event.timestamp);
        let Some(change) = idx.checked_sub(1).map(|i| changes[i]) else {
            continue;
        };
        let elapsed = event.timestamp - change;
        let key = match view {
            SiteChangeView::OverSite => {
                let hours = elapsed.num_seconds() as f64 / 3600.0;
                (0, (bin_center(hours, width) * 100.0).round() as i64)
            }
            SiteChangeView::ByTimeOfDay => {
                let hour = f64::from(event.timestamp.hour());
                (
                    elapsed.num_days(),
                    (bin_center(hour, width) * 100.0).round() as i64,
                )
            }
        };
        groups.entry(key).or_default().push(glucose);
    }

    let counts: Vec<usize> = groups.values().map(Vec::len).collect();
    let cutoff = median_count(&counts) / 10.0;

    let mut bins: Vec<SiteChangeBin> = groups
        .into_iter()
        .filter(|(_, values)| values.len() as f64 > cutoff)
        .map(|((days, center), values)| {
            let stats = compute_stats(&values);
            SiteChangeBin {
                bin_center_hours: center as f64 / 100.0,
                days_since_change: (view == SiteChangeView::ByTimeOfDay).then_some(days),
                mean: stats.mean,
                std_dev: stats.std_dev,
                count: stats.count,
            }
        })
        .collect();
    if view == SiteChangeView::ByTimeOfDay {
        bins.sort_by(|a, b| {
            a.bin_center_hours
                .total_cmp(&b.bin_center_hours)
                .then_with(|| a.days_since_change.cmp(&b.days_since_change))
        });
    }

    Ok(SiteChangeImpact {
        view,
        bin_hours,
        has_site_changes: true,
        bins,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn start() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap()
    }

    fn reading(offset_minutes: i64, value: f64) -> Event {
        let mut e = Event::new(start() + Duration::minutes(offset_minutes), EventKind::SensorGlucose);
        e.glucose = Some(value);
        e
    }

    fn site_change(offset_minutes: i64) -> Event {
        Event::new(start() + Duration::minutes(offset_minutes), EventKind::SiteChange)
    }

    #[test]
    fn test_no_site_changes_flagged() {
        let impact =
            site_change_impact(&[reading(0, 100.0)], 6, SiteChangeView::OverSite).unwrap();
        assert!(!impact.has_site_changes);
        assert!(impact.bins.is_empty());
    }

    #[test]
    fn test_over_site_bins_by_hours_since_change() {
        let mut events = vec![reading(-30, 300.0), site_change(0)];
        // Hours 0..6 read 100, hours 6..12 read 200, every 5 minutes.
        for m in (0..720).step_by(5) {
            events.push(reading(m, if m < 360 { 100.0 } else { 200.0 }));
        }
        let impact = site_change_impact(&events, 6, SiteChangeView::OverSite).unwrap();
        assert!(impact.has_site_changes);
        assert_eq!(impact.bins.len(), 2);
        assert_eq!(impact.bins[0].bin_center_hours, 3.0);
        assert_eq!(impact.bins[0].mean, 100.0);
        assert_eq!(impact.bins[0].count, 72);
        assert_eq!(impact.bins[1].bin_center_hours, 9.0);
        assert_eq!(impact.bins[1].mean, 200.0);
        assert!(impact.bins.iter().all(|b| b.days_since_change.is_none()));
    }

    #[test]
    fn test_sparse_bins_dropped() {
        let mut events = vec![site_change(0)];
        for m in (0..360).step_by(5) {
            events.push(reading(m, 120.0));
        }
        // A lone reading 30 hours later.
        events.push(reading(30 * 60, 180.0));
        events.push(reading(12 * 60, 150.0));
        for m in (12 * 60..18 * 60).step_by(5) {
            events.push(reading(m, 140.0));
        }
        let impact = site_change_impact(&events, 6, SiteChangeView::OverSite).unwrap();
        assert!(impact.bins.iter().all(|b| b.count > 1));
        assert!(impact.bins.iter().all(|b| b.bin_center_hours != 33.0));
    }

    #[test]
    fn test_by_time_of_day_groups_days_since_change() {
        let mut events = vec![site_change(0)];
        for day in 0..2 {
            for m in (0..120).step_by(5) {
                events.push(reading(day * 1440 + m, 100.0 + day as f64 * 50.0));
            }
        }
        let impact = site_change_impact(&events, 2, SiteChangeView::ByTimeOfDay).unwrap();
        assert_eq!(impact.bins.len(), 2);
        assert_eq!(impact.bins[0].days_since_change, Some(0));
        assert_eq!(impact.bins[0].mean, 100.0);
        assert_eq!(impact.bins[1].days_since_change, Some(1));
        assert_eq!(impact.bins[1].mean, 150.0);
        assert!(impact.bins.iter().all(|b| b.bin_center_hours == 1.0));
    }

    #[test]
    fn test_bin_hours_validated() {
        assert!(site_change_impact(&[], 0, SiteChangeView::OverSite).is_err());
        assert!(site_change_impact(&[], 25, SiteChangeView::OverSite).is_err());
    }

    #[test]
    fn test_view_parses_from_query_values() {
        assert_eq!("by_time_of_day".parse::<SiteChangeView>().unwrap(), SiteChangeView::ByTimeOfDay);
        assert_eq!("1".parse::<SiteChangeView>().unwrap(), SiteChangeView::OverSite);
        assert!("sideways".parse::<SiteChangeView>().is_err());
    }
}
