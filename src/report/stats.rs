//! Per-EAN totals over a (possibly resampled) interval selection.

use crate::report::model::{Interval, Report};

/// Totals for one EAN across all selected intervals, in kWh.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EanStats {
    /// Σ `before` over the selection.
    pub original_balance: f64,
    /// Σ `after` over the selection.
    pub adjusted_balance: f64,
    /// Σ missed sharing attributed to this EAN.
    pub missed: f64,
}

impl EanStats {
    /// Total energy moved by sharing for this EAN.
    pub fn shared(&self) -> f64 {
        self.original_balance - self.adjusted_balance
    }
}

/// Sums per-EAN totals over `intervals`.
///
/// The interval selection must come from `report` (same EAN shape); pass
/// either `report.intervals` or the output of [`Report::grouped_intervals`].
/// Returns `(distribution_stats, consumer_stats)`, index-aligned with the
/// report's EAN lists.
///
/// # Panics
///
/// Panics if an interval's measurement counts do not match the report's EAN
/// lists.
pub fn collect_stats(report: &Report, intervals: &[Interval]) -> (Vec<EanStats>, Vec<EanStats>) {
    let mut distributions = vec![EanStats::default(); report.distribution_eans.len()];
    let mut consumers = vec![EanStats::default(); report.consumer_eans.len()];
    for interval in intervals {
        assert_eq!(interval.distributions.len(), distributions.len());
        assert_eq!(interval.consumers.len(), consumers.len());
        for (stats, m) in distributions.iter_mut().zip(&interval.distributions) {
            stats.original_balance += m.before;
            stats.adjusted_balance += m.after;
            stats.missed += m.missed;
        }
        for (stats, m) in consumers.iter_mut().zip(&interval.consumers) {
            stats.original_balance += m.before;
            stats.adjusted_balance += m.after;
            stats.missed += m.missed;
        }
    }
    (distributions, consumers)
}
