//! Grouping of missing dates into fetchable runs.
//!
//! The range cache asks the source for one contiguous date range per run, so
//! fewer, longer runs mean fewer round trips.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::models::DateRange;

/// Partition a set of dates into maximal runs of consecutive days.
///
/// Runs come back in ascending order; a gap of more than one day starts a new
/// run.
pub fn contiguous_runs(dates: &BTreeSet<NaiveDate>) -> Vec<DateRange> {
    let mut runs: Vec<DateRange> = Vec::new();
    for &date in dates {
        match runs.last_mut() {
            Some(run) if run.end.succ_opt() == Some(date) => run.end = date,
            _ => runs.push(DateRange::single(date)),
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_runs_split_on_gaps() {
        let dates: BTreeSet<NaiveDate> = [4, 5, 6, 7, 8, 9, 11, 12].into_iter().map(day).collect();
        let runs = contiguous_runs(&dates);
        assert_eq!(
            runs,
            vec![
                DateRange::new(day(4), day(9)).unwrap(),
                DateRange::new(day(11), day(12)).unwrap(),
            ]
        );
    }

    #[test]
    fn test_single_dates_and_empty() {
        assert!(contiguous_runs(&BTreeSet::new()).is_empty());
        let dates: BTreeSet<NaiveDate> = [1, 3, 5].into_iter().map(day).collect();
        assert_eq!(contiguous_runs(&dates).len(), 3);
    }

    #[test]
    fn test_run_crosses_month_boundary() {
        let dates: BTreeSet<NaiveDate> = [
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        ]
        .into_iter()
        .collect();
        assert_eq!(contiguous_runs(&dates).len(), 1);
    }
}
