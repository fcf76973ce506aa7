//! Raw observations → canonical daily timeline.

use chrono::NaiveDate;

use crate::{Timeline, TimelineRecord};

/// A single parsed row of a raw timeline file.
///
/// Counts are signed because incremental sources publish negative
/// corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawObservation {
    /// Observation date.
    pub date: NaiveDate,
    /// Case count, cumulative or incremental per the source convention.
    pub cases: i64,
    /// Death count, cumulative or incremental per the source convention.
    pub deaths: i64,
}

impl RawObservation {
    /// Creates a new observation.
    #[must_use]
    pub const fn new(date: NaiveDate, cases: i64, deaths: i64) -> Self {
        Self {
            date,
            cases,
            deaths,
        }
    }
}

/// Builds a gap-free daily timeline.
///
/// * rows are sorted by date; rows sharing a date are summed when
///   `incremental`, otherwise the largest cumulative value wins
/// * incremental counts are converted to a running cumulative
/// * days before the first day with a positive cumulative case count are
///   dropped
/// * cumulative columns never decrease: a downward correction repeats the
///   previous value and yields a zero daily delta
/// * missing calendar days repeat the previous cumulative values with a zero
///   daily delta
/// * per-100k columns are filled only for a known, non-zero `population`
#[must_use]
pub fn normalize(
    mut observations: Vec<RawObservation>,
    incremental: bool,
    population: Option<u64>,
) -> Timeline {
    observations.sort_by_key(|o| o.date);
    let merged = merge_same_day(observations, incremental);
    let cumulative = if incremental {
        running_totals(merged)
    } else {
        merged
    };

    let Some(start) = cumulative.iter().position(|o| o.cases > 0) else {
        return Timeline::empty();
    };

    #[allow(clippy::cast_precision_loss)]
    let per_100k_factor = population
        .filter(|&p| p > 0)
        .map(|p| 100_000.0 / p as f64);

    let mut records: Vec<TimelineRecord> = Vec::with_capacity(cumulative.len() - start);
    let mut prev_cases: u64 = 0;
    let mut prev_deaths: u64 = 0;

    for obs in &cumulative[start..] {
        if let Some(last) = records.last() {
            let mut day = last.date.succ_opt();
            while let Some(d) = day {
                if d >= obs.date {
                    break;
                }
                records.push(record(d, prev_cases, 0, prev_deaths, 0, per_100k_factor));
                day = d.succ_opt();
            }
        }

        let cases = clamp_count(obs.cases).max(prev_cases);
        let deaths = clamp_count(obs.deaths).max(prev_deaths);
        records.push(record(
            obs.date,
            cases,
            cases - prev_cases,
            deaths,
            deaths - prev_deaths,
            per_100k_factor,
        ));
        prev_cases = cases;
        prev_deaths = deaths;
    }

    Timeline::from(records)
}

fn merge_same_day(observations: Vec<RawObservation>, incremental: bool) -> Vec<RawObservation> {
    let mut merged: Vec<RawObservation> = Vec::with_capacity(observations.len());
    for obs in observations {
        match merged.last_mut() {
            Some(last) if last.date == obs.date => {
                if incremental {
                    last.cases = last.cases.saturating_add(obs.cases);
                    last.deaths = last.deaths.saturating_add(obs.deaths);
                } else {
                    last.cases = last.cases.max(obs.cases);
                    last.deaths = last.deaths.max(obs.deaths);
                }
            }
            _ => merged.push(obs),
        }
    }
    merged
}

fn running_totals(observations: Vec<RawObservation>) -> Vec<RawObservation> {
    let mut cases: i64 = 0;
    let mut deaths: i64 = 0;
    observations
        .into_iter()
        .map(|obs| {
            cases = cases.saturating_add(obs.cases);
            deaths = deaths.saturating_add(obs.deaths);
            RawObservation::new(obs.date, cases, deaths)
        })
        .collect()
}

fn clamp_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[allow(clippy::cast_precision_loss)]
fn record(
    date: NaiveDate,
    cumulative_cases: u64,
    daily_cases: u64,
    cumulative_deaths: u64,
    daily_deaths: u64,
    per_100k_factor: Option<f64>,
) -> TimelineRecord {
    TimelineRecord {
        date,
        cumulative_cases,
        daily_cases,
        cumulative_deaths,
        daily_deaths,
        cases_per_100k: per_100k_factor.map(|f| daily_cases as f64 * f),
        deaths_per_100k: per_100k_factor.map(|f| daily_deaths as f64 * f),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, d).unwrap()
    }

    fn obs(d: u32, cases: i64, deaths: i64) -> RawObservation {
        RawObservation::new(day(d), cases, deaths)
    }

    fn assert_invariants(timeline: &Timeline) {
        for pair in timeline.records().windows(2) {
            assert_eq!(pair[1].date, pair[0].date.succ_opt().unwrap());
            assert!(pair[1].cumulative_cases >= pair[0].cumulative_cases);
            assert!(pair[1].cumulative_deaths >= pair[0].cumulative_deaths);
        }
    }

    #[test]
    fn empty_input_is_empty_timeline() {
        assert!(normalize(Vec::new(), false, Some(100)).is_empty());
    }

    #[test]
    fn all_zero_cases_is_empty_timeline() {
        let timeline = normalize(vec![obs(1, 0, 0), obs(2, 0, 0)], false, None);
        assert!(timeline.is_empty());
    }

    #[test]
    fn drops_days_before_first_case() {
        let timeline = normalize(vec![obs(1, 0, 0), obs(2, 0, 0), obs(3, 4, 0)], false, None);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.start(), Some(day(3)));
        assert_eq!(timeline.records()[0].daily_cases, 4);
    }

    #[test]
    fn fills_gaps_with_zero_deltas() {
        let timeline = normalize(vec![obs(1, 5, 1), obs(4, 11, 2)], false, None);
        assert_eq!(timeline.len(), 4);
        assert_invariants(&timeline);

        let records = timeline.records();
        assert_eq!(records[1].cumulative_cases, 5);
        assert_eq!(records[1].daily_cases, 0);
        assert_eq!(records[2].cumulative_deaths, 1);
        assert_eq!(records[2].daily_deaths, 0);
        assert_eq!(records[3].daily_cases, 6);
        assert_eq!(records[3].daily_deaths, 1);
    }

    #[test]
    fn sorts_unordered_rows() {
        let timeline = normalize(vec![obs(3, 9, 0), obs(1, 2, 0), obs(2, 4, 0)], false, None);
        let daily: Vec<u64> = timeline.records().iter().map(|r| r.daily_cases).collect();
        assert_eq!(daily, [2, 2, 5]);
    }

    #[test]
    fn clamps_downward_corrections() {
        let timeline = normalize(
            vec![obs(1, 10, 3), obs(2, 8, 2), obs(3, 12, 4)],
            false,
            None,
        );
        assert_invariants(&timeline);

        let records = timeline.records();
        assert_eq!(records[1].cumulative_cases, 10);
        assert_eq!(records[1].daily_cases, 0);
        assert_eq!(records[1].daily_deaths, 0);
        assert_eq!(records[2].daily_cases, 2);
        assert_eq!(records[2].daily_deaths, 1);
    }

    #[test]
    fn converts_incremental_counts() {
        let timeline = normalize(
            vec![obs(1, 0, 0), obs(2, 3, 0), obs(3, 4, 1), obs(4, -2, 0), obs(5, 5, 1)],
            true,
            None,
        );
        assert_invariants(&timeline);

        let cumulative: Vec<u64> = timeline
            .records()
            .iter()
            .map(|r| r.cumulative_cases)
            .collect();
        assert_eq!(cumulative, [3, 7, 7, 10]);

        let daily: Vec<u64> = timeline.records().iter().map(|r| r.daily_cases).collect();
        assert_eq!(daily, [3, 4, 0, 3]);
    }

    #[test]
    fn merges_rows_sharing_a_date() {
        let incremental = normalize(vec![obs(1, 2, 0), obs(1, 3, 1)], true, None);
        assert_eq!(incremental.records()[0].cumulative_cases, 5);
        assert_eq!(incremental.records()[0].cumulative_deaths, 1);

        let cumulative = normalize(vec![obs(1, 2, 0), obs(1, 3, 1)], false, None);
        assert_eq!(cumulative.records()[0].cumulative_cases, 3);
    }

    #[test]
    fn huge_incremental_counts_saturate() {
        let timeline = normalize(
            vec![obs(1, i64::MAX, 0), obs(1, 1, 0), obs(2, i64::MAX, 0)],
            true,
            None,
        );
        assert_invariants(&timeline);
        let max = u64::try_from(i64::MAX).unwrap();
        let cumulative: Vec<u64> = timeline
            .records()
            .iter()
            .map(|r| r.cumulative_cases)
            .collect();
        assert_eq!(cumulative, [max, max]);
        assert_eq!(timeline.records()[1].daily_cases, 0);
    }

    #[test]
    fn per_100k_requires_population() {
        let without = normalize(vec![obs(1, 5, 1)], false, None);
        assert!(!without.has_per_100k());

        let zero = normalize(vec![obs(1, 5, 1)], false, Some(0));
        assert!(!zero.has_per_100k());

        let with = normalize(vec![obs(1, 5, 1)], false, Some(200_000));
        let record = with.records()[0];
        assert!((record.cases_per_100k.unwrap() - 2.5).abs() < 1e-9);
        assert!((record.deaths_per_100k.unwrap() - 0.5).abs() < 1e-9);
    }
}
