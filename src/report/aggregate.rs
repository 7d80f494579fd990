//! Temporal resampling of the 15-minute interval series.
//!
//! Coarser buckets are built in one forward walk: each source interval
//! either merges into the last emitted bucket or starts a new one. The
//! merge decision compares against the immediately preceding *source*
//! interval, not the bucket's start, so bucket boundaries can drift when
//! the source series has gaps. That matches the upstream report tooling
//! and callers depend on it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::debug;

use crate::report::model::Interval;

/// Bucket width for [`aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Grouping {
    /// Identity pass; every source interval becomes its own bucket.
    QuarterHour,
    /// Merge while the hour-of-day is unchanged.
    Hour,
    /// Merge while the day-of-month is unchanged.
    #[default]
    Day,
    /// Merge while the month-of-year is unchanged.
    Month,
}

impl Grouping {
    /// Accepted textual tokens, in `FromStr` order.
    pub const TOKENS: &[&str] = &["15m", "1h", "1d", "1m"];
}

impl FromStr for Grouping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "15m" => Ok(Self::QuarterHour),
            "1h" => Ok(Self::Hour),
            "1d" => Ok(Self::Day),
            "1m" => Ok(Self::Month),
            other => Err(format!(
                "unknown grouping \"{other}\", expected one of: {}",
                Self::TOKENS.join(", ")
            )),
        }
    }
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Self::QuarterHour => "15m",
            Self::Hour => "1h",
            Self::Day => "1d",
            Self::Month => "1m",
        };
        write!(f, "{token}")
    }
}

/// Resamples `intervals` into `grouping`-sized buckets, keeping only
/// intervals whose start lies in `[date_from, date_to]` inclusive.
///
/// Merging accumulates the bucket sums, every measurement element-wise, and
/// concatenates the reconciliation error lists. Each returned interval is an
/// independent copy; the source series is never mutated.
pub fn aggregate(
    intervals: &[Interval],
    grouping: Grouping,
    date_from: DateTime<Utc>,
    date_to: DateTime<Utc>,
) -> Vec<Interval> {
    let mut result: Vec<Interval> = Vec::new();
    for (i, interval) in intervals.iter().enumerate() {
        if interval.start < date_from || interval.start > date_to {
            continue;
        }
        let merge_to_last = if result.is_empty() {
            false
        } else {
            // Previous source interval, even if it was filtered out.
            let prev = intervals[i - 1].start;
            let this = interval.start;
            match grouping {
                Grouping::QuarterHour => false,
                Grouping::Hour => this.hour() == prev.hour(),
                Grouping::Day => this.day() == prev.day(),
                Grouping::Month => this.month() == prev.month(),
            }
        };
        match result.last_mut() {
            Some(last) if merge_to_last => last.accumulate(interval),
            _ => result.push(interval.clone()),
        }
    }
    debug!(
        source = intervals.len(),
        buckets = result.len(),
        %grouping,
        "resampled interval series"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::model::Measurement;
    use chrono::TimeZone;

    fn ts(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        match Utc.with_ymd_and_hms(2025, 2, day, h, m, 0).single() {
            Some(t) => t,
            None => panic!("valid timestamp"),
        }
    }

    fn interval(start: DateTime<Utc>, sharing: f64) -> Interval {
        Interval {
            start,
            sum_sharing: sharing,
            sum_missed: 0.0,
            sum_production: sharing,
            distributions: vec![Measurement {
                before: sharing,
                after: 0.0,
                missed: 0.0,
            }],
            consumers: vec![Measurement {
                before: sharing,
                after: 0.0,
                missed: 0.0,
            }],
            errors: Vec::new(),
        }
    }

    fn wide_range() -> (DateTime<Utc>, DateTime<Utc>) {
        (ts(1, 0, 0), ts(28, 23, 45))
    }

    #[test]
    fn quarter_hour_is_identity() {
        let series = vec![interval(ts(5, 11, 0), 1.0), interval(ts(5, 11, 15), 2.0)];
        let (from, to) = wide_range();
        let out = aggregate(&series, Grouping::QuarterHour, from, to);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].sum_sharing, 1.0);
        assert_eq!(out[1].sum_sharing, 2.0);
    }

    #[test]
    fn hour_merges_four_quarters() {
        let series = vec![
            interval(ts(5, 11, 0), 1.0),
            interval(ts(5, 11, 15), 2.0),
            interval(ts(5, 11, 30), 3.0),
            interval(ts(5, 11, 45), 4.0),
            interval(ts(5, 12, 0), 5.0),
        ];
        let (from, to) = wide_range();
        let out = aggregate(&series, Grouping::Hour, from, to);
        assert_eq!(out.len(), 2);
        assert!((out[0].sum_sharing - 10.0).abs() < 1e-12);
        assert!((out[0].distributions[0].before - 10.0).abs() < 1e-12);
        assert_eq!(out[1].sum_sharing, 5.0);
    }

    #[test]
    fn day_merges_across_hours() {
        let series = vec![
            interval(ts(5, 11, 45), 1.0),
            interval(ts(5, 12, 0), 2.0),
            interval(ts(6, 0, 0), 3.0),
        ];
        let (from, to) = wide_range();
        let out = aggregate(&series, Grouping::Day, from, to);
        assert_eq!(out.len(), 2);
        assert!((out[0].sum_sharing - 3.0).abs() < 1e-12);
        assert_eq!(out[1].start, ts(6, 0, 0));
    }

    #[test]
    fn month_merges_whole_series() {
        let series = vec![
            interval(ts(5, 11, 0), 1.0),
            interval(ts(6, 11, 0), 2.0),
            interval(ts(7, 11, 0), 3.0),
        ];
        let (from, to) = wide_range();
        let out = aggregate(&series, Grouping::Month, from, to);
        assert_eq!(out.len(), 1);
        assert!((out[0].sum_sharing - 6.0).abs() < 1e-12);
    }

    #[test]
    fn date_filter_is_inclusive() {
        let series = vec![
            interval(ts(5, 11, 0), 1.0),
            interval(ts(6, 11, 0), 2.0),
            interval(ts(7, 11, 0), 3.0),
        ];
        let out = aggregate(&series, Grouping::QuarterHour, ts(6, 0, 0), ts(6, 23, 45));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].sum_sharing, 2.0);
        // Boundary timestamps themselves are kept.
        let out = aggregate(&series, Grouping::QuarterHour, ts(5, 11, 0), ts(7, 11, 0));
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn source_is_not_mutated_by_merging() {
        let series = vec![interval(ts(5, 11, 0), 1.0), interval(ts(5, 11, 15), 2.0)];
        let (from, to) = wide_range();
        let _ = aggregate(&series, Grouping::Hour, from, to);
        assert_eq!(series[0].sum_sharing, 1.0);
        assert_eq!(series[0].distributions[0].before, 1.0);
    }

    #[test]
    fn merge_compares_previous_source_interval_not_bucket_start() {
        // A gap in the source series: 11:45 is followed by 13:00. With hour
        // grouping the 13:00 interval starts a new bucket because its hour
        // differs from the preceding source interval's hour.
        let series = vec![
            interval(ts(5, 11, 30), 1.0),
            interval(ts(5, 11, 45), 2.0),
            interval(ts(5, 13, 0), 3.0),
            interval(ts(5, 13, 15), 4.0),
        ];
        let (from, to) = wide_range();
        let out = aggregate(&series, Grouping::Hour, from, to);
        assert_eq!(out.len(), 2);
        assert!((out[1].sum_sharing - 7.0).abs() < 1e-12);
    }

    #[test]
    fn error_lists_concatenate() {
        let mut a = interval(ts(5, 11, 0), 1.0);
        a.errors.push("a".to_string());
        let mut b = interval(ts(5, 11, 15), 2.0);
        b.errors.push("b".to_string());
        let (from, to) = wide_range();
        let out = aggregate(&[a, b], Grouping::Hour, from, to);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].errors, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn grouping_token_round_trip() {
        for token in Grouping::TOKENS {
            let parsed = token.parse::<Grouping>();
            assert_eq!(parsed.as_ref().map(Grouping::to_string).as_deref(), Ok(*token));
        }
        assert!("2h".parse::<Grouping>().is_err());
    }
}
