//! Normalized in-memory model of one parsed sharing report.
//!
//! A [`Report`] is built once per successful parse and is read-only from
//! then on: aggregation works on deep copies and the simulator never mutates
//! interval data. Loading a new file replaces the whole value.

use chrono::{DateTime, Duration, Utc};

use crate::report::aggregate::{self, Grouping};
use crate::sharing::optimize::{OptimizeConfig, Optimizer};
use crate::sharing::simulate::{self, SharingSimulation};

/// Length of an EAN metering-point code.
pub const EAN_CODE_LEN: usize = 18;

/// Role of a metering point, fixed at parse time by the header suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EanRole {
    /// Production point whose surplus is shared (`-D` suffix).
    Distribution,
    /// Offtake point receiving shared energy (`-O` suffix).
    Consumer,
}

/// Identity of one metering point.
#[derive(Debug, Clone)]
pub struct Ean {
    /// 18-character numeric code.
    pub code: String,
    /// Zero-based column offset of this EAN's "before" value in a source row.
    pub csv_index: usize,
    pub role: EanRole,
}

/// One EAN's energy reading for one interval, in kWh.
///
/// After parse-time normalization `0 <= after <= before` and `missed >= 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Measurement {
    /// Energy prior to sharing.
    pub before: f64,
    /// Energy remaining after sharing.
    pub after: f64,
    /// Energy that could have been shared but was not, attributed to this EAN.
    pub missed: f64,
}

impl Measurement {
    /// Energy moved by sharing in this interval.
    pub fn shared(&self) -> f64 {
        self.before - self.after
    }

    /// Element-wise accumulation used when merging intervals into buckets.
    pub fn accumulate(&mut self, other: &Measurement) {
        self.before += other.before;
        self.after += other.after;
        self.missed += other.missed;
    }
}

/// One fixed-width time bucket of the report.
///
/// Measurement vectors are index-aligned with the owning report's EAN lists.
#[derive(Debug, Clone)]
pub struct Interval {
    /// Bucket-aligned start timestamp (UTC).
    pub start: DateTime<Utc>,
    /// Total energy shared in this bucket: Σ distribution `before − after`.
    pub sum_sharing: f64,
    /// Total missed sharing attributed in this bucket.
    pub sum_missed: f64,
    /// Total production: Σ distribution `before`.
    pub sum_production: f64,
    pub distributions: Vec<Measurement>,
    pub consumers: Vec<Measurement>,
    /// Reconciliation warnings raised while parsing this bucket's rows.
    pub errors: Vec<String>,
}

impl Interval {
    /// Merges `other` into this bucket.
    ///
    /// # Panics
    ///
    /// Panics if the measurement counts differ — merging is only defined
    /// between intervals of the same report.
    pub fn accumulate(&mut self, other: &Interval) {
        assert_eq!(self.distributions.len(), other.distributions.len());
        assert_eq!(self.consumers.len(), other.consumers.len());
        self.sum_sharing += other.sum_sharing;
        self.sum_missed += other.sum_missed;
        self.sum_production += other.sum_production;
        for (to, from) in self.distributions.iter_mut().zip(&other.distributions) {
            to.accumulate(from);
        }
        for (to, from) in self.consumers.iter_mut().zip(&other.consumers) {
            to.accumulate(from);
        }
        self.errors.extend(other.errors.iter().cloned());
    }
}

/// The whole parsed report: EAN lists in canonical order plus the
/// chronological interval series.
#[derive(Debug, Clone)]
pub struct Report {
    pub filename: String,
    /// Start of the first interval.
    pub date_from: DateTime<Utc>,
    /// End of the last interval (its start plus 14 minutes).
    pub date_to: DateTime<Utc>,
    /// Distribution EANs, sorted by code ascending.
    pub distribution_eans: Vec<Ean>,
    /// Consumer EANs, sorted by code ascending.
    pub consumer_eans: Vec<Ean>,
    pub intervals: Vec<Interval>,
}

impl Report {
    /// Assembles a report from freshly parsed parts and applies the canonical
    /// EAN ordering.
    ///
    /// Both EAN lists are sorted by code ascending and every interval's
    /// measurement vectors are permuted in lockstep, so column order in the
    /// source file never leaks into the model.
    ///
    /// # Panics
    ///
    /// Panics if `intervals` is empty; the parser rejects rowless reports
    /// before constructing the model.
    pub(crate) fn new(
        filename: String,
        mut intervals: Vec<Interval>,
        distribution_eans: Vec<Ean>,
        consumer_eans: Vec<Ean>,
    ) -> Self {
        assert!(!intervals.is_empty(), "report must contain intervals");
        let date_from = intervals[0].start;
        let date_to = intervals[intervals.len() - 1].start + Duration::minutes(14);

        let dist_perm = sort_permutation(&distribution_eans);
        let cons_perm = sort_permutation(&consumer_eans);
        let distribution_eans = permute(&distribution_eans, &dist_perm);
        let consumer_eans = permute(&consumer_eans, &cons_perm);
        for interval in &mut intervals {
            interval.distributions = permute(&interval.distributions, &dist_perm);
            interval.consumers = permute(&interval.consumers, &cons_perm);
        }

        Self {
            filename,
            date_from,
            date_to,
            distribution_eans,
            consumer_eans,
            intervals,
        }
    }

    /// Resamples the interval series to `grouping` buckets, restricted to
    /// `[date_from, date_to]` inclusive. See [`aggregate::aggregate`].
    pub fn grouped_intervals(
        &self,
        grouping: Grouping,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
    ) -> Vec<Interval> {
        aggregate::aggregate(&self.intervals, grouping, date_from, date_to)
    }

    /// Number of days the report spans, rounded up.
    pub fn num_days(&self) -> i64 {
        let minutes = (self.date_to - self.date_from).num_minutes();
        (minutes as f64 / (24.0 * 60.0)).ceil() as i64
    }

    /// Replays the sharing protocol against a hypothetical allocation,
    /// returning the full per-round trace. See [`simulate::simulate`].
    pub fn simulate_sharing(&self, weights: &[f64], rounds: usize) -> SharingSimulation {
        simulate::simulate(self, weights, rounds)
    }

    /// Fast variant of [`Report::simulate_sharing`] computing only the total.
    pub fn simulate_sharing_total(&self, weights: &[f64], rounds: usize) -> f64 {
        simulate::simulate_total(self, weights, rounds)
    }

    /// Creates an allocation optimizer over this report's raw intervals.
    ///
    /// The returned [`Optimizer`] is an iterator yielding one progress value
    /// per completed restart; dropping it early cancels the remaining
    /// restarts.
    pub fn optimizer(&self, config: OptimizeConfig) -> Optimizer<'_> {
        Optimizer::new(self, config)
    }
}

/// Indices of `eans` in ascending code order.
fn sort_permutation(eans: &[Ean]) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..eans.len()).collect();
    perm.sort_by(|&a, &b| eans[a].code.cmp(&eans[b].code));
    perm
}

/// Reorders `items` so that output position `i` holds `items[perm[i]]`.
fn permute<T: Clone>(items: &[T], perm: &[usize]) -> Vec<T> {
    assert_eq!(items.len(), perm.len());
    perm.iter().map(|&from| items[from].clone()).collect()
}
