//! Exact replay of the round-robin sharing protocol.
//!
//! All arithmetic runs in integer hundredths of a kWh, the resolution the
//! metering data is published at. That keeps the replay exact: no float
//! drift, and two runs over the same report always agree to the last
//! hundredth. Each interval is replayed independently; no energy carries
//! over between intervals.

use tracing::trace;

use crate::report::model::{Interval, Report};

/// Energy in integer hundredths of a kWh.
pub type CentiKwh = i64;

/// Converts kWh to fixed point, rounding to the nearest hundredth.
pub fn to_centi(kwh: f64) -> CentiKwh {
    (kwh * 100.0).round() as CentiKwh
}

/// Converts fixed point back to kWh.
pub fn to_kwh(centi: CentiKwh) -> f64 {
    centi as f64 / 100.0
}

/// Full trace of one simulated sharing run over a report.
#[derive(Debug, Clone)]
pub struct SharingSimulation {
    /// Total energy shared across all intervals, in kWh.
    pub total: f64,
    /// Energy allocated to each consumer, index-aligned with
    /// `Report::consumer_eans`, in kWh.
    pub per_consumer: Vec<f64>,
    /// `per_round[round][consumer]`: energy allocated to each consumer in
    /// each allocation round, summed over all intervals, in kWh. The outer
    /// length equals the configured round count.
    pub per_round: Vec<Vec<f64>>,
}

/// Replays sharing over every interval of `report` and returns the full
/// per-consumer and per-round breakdown.
///
/// `weights` are allocation percentages, index-aligned with the report's
/// consumer list.
///
/// # Panics
///
/// Panics if `weights` does not match the consumer count, contains a
/// negative entry, or sums above 100, or if `rounds` is zero.
pub fn simulate(report: &Report, weights: &[f64], rounds: usize) -> SharingSimulation {
    check_preconditions(report, weights, rounds);
    let mut per_consumer = vec![0 as CentiKwh; weights.len()];
    let mut per_round = vec![vec![0 as CentiKwh; weights.len()]; rounds];
    let mut total: CentiKwh = 0;
    let mut demands = vec![0 as CentiKwh; weights.len()];
    for interval in &report.intervals {
        let production = fill_demands(interval, &mut demands);
        total += run_interval(production, &mut demands, weights, rounds, |round, consumer, amount| {
            per_consumer[consumer] += amount;
            per_round[round][consumer] += amount;
        });
    }
    trace!(total_centi = total, "sharing replay finished");
    SharingSimulation {
        total: to_kwh(total),
        per_consumer: per_consumer.into_iter().map(to_kwh).collect(),
        per_round: per_round
            .into_iter()
            .map(|round| round.into_iter().map(to_kwh).collect())
            .collect(),
    }
}

/// Like [`simulate`] but computes only the total, skipping the trace.
///
/// The optimizer calls this in its inner loop; the result is always exactly
/// equal to [`simulate`]'s `total` for the same inputs.
///
/// # Panics
///
/// Same preconditions as [`simulate`].
pub fn simulate_total(report: &Report, weights: &[f64], rounds: usize) -> f64 {
    check_preconditions(report, weights, rounds);
    let mut total: CentiKwh = 0;
    let mut demands = vec![0 as CentiKwh; weights.len()];
    for interval in &report.intervals {
        let production = fill_demands(interval, &mut demands);
        total += run_interval(production, &mut demands, weights, rounds, |_, _, _| {});
    }
    to_kwh(total)
}

fn check_preconditions(report: &Report, weights: &[f64], rounds: usize) {
    assert!(rounds > 0, "at least one allocation round is required");
    // Multi-distributor sharing is unimplemented; callers reject it up front.
    assert_eq!(
        report.distribution_eans.len(),
        1,
        "sharing simulation supports exactly one distribution EAN"
    );
    assert_eq!(
        weights.len(),
        report.consumer_eans.len(),
        "one weight per consumer EAN is required"
    );
    assert!(
        weights.iter().all(|&w| w >= 0.0),
        "allocation weights cannot be negative"
    );
    let sum: f64 = weights.iter().sum();
    assert!(sum <= 100.0 + 1e-9, "allocation weights sum above 100: {sum}");
}

/// Loads one interval's consumer demands into `demands` and returns the
/// interval's production pool, all in fixed point.
fn fill_demands(interval: &Interval, demands: &mut [CentiKwh]) -> CentiKwh {
    for (slot, m) in demands.iter_mut().zip(&interval.consumers) {
        *slot = to_centi(m.before);
    }
    to_centi(interval.sum_production)
}

/// Runs the round-robin allocation for one interval.
///
/// Each round snapshots the pool, then offers every consumer in EAN order
/// `trunc(pool_at_round_start * weight / 100)`, capped by the consumer's
/// remaining demand. Truncation guarantees a round never hands out more than
/// the snapshot, so the pool stays non-negative as long as the weights sum
/// to at most 100. Leftover energy below the truncation resolution simply
/// stays unshared, exactly as the settlement process leaves it.
fn run_interval(
    production: CentiKwh,
    demands: &mut [CentiKwh],
    weights: &[f64],
    rounds: usize,
    mut on_allocation: impl FnMut(usize, usize, CentiKwh),
) -> CentiKwh {
    let mut pool = production;
    let mut allocated: CentiKwh = 0;
    for round in 0..rounds {
        if pool == 0 || demands.iter().all(|&d| d == 0) {
            break;
        }
        let pool_at_round_start = pool;
        for (consumer, demand) in demands.iter_mut().enumerate() {
            let offer = (pool_at_round_start as f64 * weights[consumer] / 100.0).trunc() as CentiKwh;
            let amount = offer.min(*demand).min(pool);
            if amount == 0 {
                continue;
            }
            *demand -= amount;
            pool -= amount;
            allocated += amount;
            on_allocation(round, consumer, amount);
        }
    }
    allocated
}
