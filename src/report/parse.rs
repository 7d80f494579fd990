//! CSV ingestion and reconciliation of EDC sharing reports.
//!
//! Errors come in two tiers. Structural problems (bad header, wrong row
//! shape, unparseable numbers or timestamps) mean the file is not a sharing
//! report at all and abort the parse with a [`ParseError`]. Numeric
//! inconsistencies inside a well-formed row never abort: they are corrected
//! deterministically and reported through the [`WarningLog`], the `tracing`
//! sink, and the owning interval's error list.

use csv::StringRecord;
use thiserror::Error;

use crate::report::model::{EAN_CODE_LEN, Ean, EanRole, Interval, Measurement, Report};
use crate::report::value::{parse_kwh, parse_row_start};
use crate::warnings::WarningLog;

/// Distributor and consumer shared totals within this distance are treated
/// as equal.
const MISMATCH_TOLERANCE_KWH: f64 = 0.0001;

/// Residuals at or below this are metering dust, not shareable energy.
/// Plenty of intervals report 0.01 kWh on both sides with no sharing at all.
const RESIDUAL_FLOOR_KWH: f64 = 0.01;

/// Fatal, structural parse failure. No partial report is produced.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("report is empty")]
    Empty,
    #[error("invalid header: {reason}")]
    Header { reason: String },
    #[error("invalid header pair \"{before}\" / \"{after}\": {reason}")]
    HeaderPair {
        before: String,
        after: String,
        reason: String,
    },
    #[error("line {line}: expected {expected} fields, found {found}")]
    RowShape {
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: cannot parse timestamp \"{text}\"")]
    Timestamp { line: u64, text: String },
    #[error("line {line}: cannot parse \"{field}\" as a kWh value")]
    Number { line: u64, field: String },
    #[error("line {line}: malformed row: {message}")]
    Row { line: u64, message: String },
    #[error("report contains no data rows")]
    NoData,
}

/// Parses raw report text into a [`Report`].
///
/// Reconciliation warnings are appended to `warnings`; the returned report
/// embeds the same messages in the affected intervals' error lists.
///
/// # Errors
///
/// Returns a [`ParseError`] when the input is not structurally a sharing
/// report; numerically inconsistent but well-formed input never fails.
pub fn parse_report(
    text: &str,
    filename: &str,
    warnings: &mut WarningLog,
) -> Result<Report, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    let header = match records.next() {
        Some(Ok(record)) => record,
        Some(Err(e)) => {
            return Err(ParseError::Row {
                line: 1,
                message: e.to_string(),
            });
        }
        None => return Err(ParseError::Empty),
    };
    let (distribution_eans, consumer_eans) = parse_header(&header)?;
    let expected = 3 + 2 * (distribution_eans.len() + consumer_eans.len());

    let mut intervals: Vec<Interval> = Vec::new();
    for result in records {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map_or(0, csv::Position::line);
                return Err(ParseError::Row {
                    line,
                    message: e.to_string(),
                });
            }
        };
        let line = record.position().map_or(0, csv::Position::line);

        // Whitespace-only lines are as good as blank ones.
        if record.len() == 1 && record.get(0).is_some_and(|f| f.trim().is_empty()) {
            continue;
        }
        // Some reports carry one empty field at the end of every row.
        let padded = record.len() == expected + 1 && record.get(expected).is_some_and(str::is_empty);
        if record.len() != expected && !padded {
            return Err(ParseError::RowShape {
                line,
                expected,
                found: record.len(),
            });
        }

        let date_field = record.get(0).unwrap_or("");
        let time_field = record.get(1).unwrap_or("");
        let start = parse_row_start(date_field, time_field).ok_or_else(|| ParseError::Timestamp {
            line,
            text: format!("{date_field};{time_field}"),
        })?;

        let mut errors: Vec<String> = Vec::new();
        let mut warn_row = |message: String, errors: &mut Vec<String>| {
            errors.push(message.clone());
            warnings.push(start, message);
        };

        let mut distributions = Vec::with_capacity(distribution_eans.len());
        for ean in &distribution_eans {
            let mut before = field_kwh(&record, ean.csv_index, line)?;
            let mut after = field_kwh(&record, ean.csv_index + 1, line)?;
            if after > before {
                warn_row(
                    format!(
                        "Distribution EAN {} is distributing {:.2} kWh more after sharing \
                         than before; clipping sharing to 0",
                        ean.code,
                        after - before
                    ),
                    &mut errors,
                );
                after = before;
            }
            if before < 0.0 || after < 0.0 {
                warn_row(
                    format!(
                        "Distribution EAN {} reports negative production \
                         ({before:.2} kWh before, {after:.2} kWh after sharing); \
                         clipping negative values to 0",
                        ean.code
                    ),
                    &mut errors,
                );
                before = before.max(0.0);
                after = after.max(0.0);
            }
            distributions.push(Measurement {
                before,
                after,
                missed: 0.0,
            });
        }

        let mut consumers = Vec::with_capacity(consumer_eans.len());
        for ean in &consumer_eans {
            // Consumer readings are stored negative in the source report.
            let mut before = -field_kwh(&record, ean.csv_index, line)?;
            let mut after = -field_kwh(&record, ean.csv_index + 1, line)?;
            if after > before {
                warn_row(
                    format!(
                        "Consumer EAN {} is consuming {:.2} kWh more after sharing \
                         than before; clipping sharing to 0",
                        ean.code,
                        after - before
                    ),
                    &mut errors,
                );
                after = before;
            }
            if before < 0.0 || after < 0.0 {
                warn_row(
                    format!(
                        "Consumer EAN {} is exporting power \
                         ({before:.2} kWh before, {after:.2} kWh after sharing); \
                         clipping negative values to 0",
                        ean.code
                    ),
                    &mut errors,
                );
                before = before.max(0.0);
                after = after.max(0.0);
            }
            consumers.push(Measurement {
                before,
                after,
                missed: 0.0,
            });
        }

        reconcile_shared_totals(&mut distributions, &mut consumers, &mut warn_row, &mut errors);

        let sum_sharing: f64 = distributions.iter().map(Measurement::shared).sum();
        assert!(sum_sharing >= 0.0, "sharing cannot be negative after clipping");
        let sum_production: f64 = distributions.iter().map(|m| m.before).sum();
        let sum_missed = attribute_missed_sharing(&mut distributions, &mut consumers);

        intervals.push(Interval {
            start,
            sum_sharing,
            sum_missed,
            sum_production,
            distributions,
            consumers,
            errors,
        });
    }

    if intervals.is_empty() {
        return Err(ParseError::NoData);
    }
    Ok(Report::new(
        filename.to_string(),
        intervals,
        distribution_eans,
        consumer_eans,
    ))
}

/// Validates the header row and extracts both EAN lists in column order.
fn parse_header(record: &StringRecord) -> Result<(Vec<Ean>, Vec<Ean>), ParseError> {
    let fields: Vec<&str> = record.iter().map(str::trim).collect();
    if fields.len() < 4 {
        return Err(ParseError::Header {
            reason: format!(
                "expected the timestamp columns plus at least one EAN pair, found {} columns",
                fields.len()
            ),
        });
    }
    if fields[0] != "Datum" || fields[1] != "Cas od" || fields[2] != "Cas do" {
        return Err(ParseError::Header {
            reason: format!(
                "first columns must be \"Datum;Cas od;Cas do\", got \"{};{};{}\"",
                fields[0], fields[1], fields[2]
            ),
        });
    }
    if fields.len() % 2 == 0 {
        return Err(ParseError::Header {
            reason: "EAN columns must come in IN/OUT pairs".to_string(),
        });
    }

    let mut distribution_eans = Vec::new();
    let mut consumer_eans = Vec::new();
    for i in (3..fields.len()).step_by(2) {
        let before = fields[i];
        let after = fields[i + 1];
        let pair_error = |reason: &str| ParseError::HeaderPair {
            before: before.to_string(),
            after: after.to_string(),
            reason: reason.to_string(),
        };

        let in_name = before
            .strip_prefix("IN-")
            .ok_or_else(|| pair_error("first column of a pair must start with \"IN-\""))?;
        let out_name = after
            .strip_prefix("OUT-")
            .ok_or_else(|| pair_error("second column of a pair must start with \"OUT-\""))?;
        if in_name != out_name {
            return Err(pair_error("IN and OUT columns name different EANs"));
        }

        let (code, role) = if let Some(code) = in_name.strip_suffix("-D") {
            (code, EanRole::Distribution)
        } else if let Some(code) = in_name.strip_suffix("-O") {
            (code, EanRole::Consumer)
        } else {
            return Err(pair_error("EAN column must end with \"-D\" or \"-O\""));
        };
        if code.len() != EAN_CODE_LEN || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(pair_error("EAN code must be 18 numeric characters"));
        }

        let ean = Ean {
            code: code.to_string(),
            csv_index: i,
            role,
        };
        match role {
            EanRole::Distribution => distribution_eans.push(ean),
            EanRole::Consumer => consumer_eans.push(ean),
        }
    }
    Ok((distribution_eans, consumer_eans))
}

fn field_kwh(record: &StringRecord, idx: usize, line: u64) -> Result<f64, ParseError> {
    let raw = record.get(idx).unwrap_or("");
    parse_kwh(raw).ok_or_else(|| ParseError::Number {
        line,
        field: raw.to_string(),
    })
}

/// Makes the distributor-side and consumer-side shared totals agree.
///
/// The smaller total is taken as truth; every measurement on the larger side
/// has its shared amount scaled by `smaller/larger`, which moves `after`
/// toward `before` until the totals match exactly.
fn reconcile_shared_totals(
    distributions: &mut [Measurement],
    consumers: &mut [Measurement],
    warn_row: &mut impl FnMut(String, &mut Vec<String>),
    errors: &mut Vec<String>,
) {
    let shared_dist: f64 = distributions.iter().map(Measurement::shared).sum();
    let shared_cons: f64 = consumers.iter().map(Measurement::shared).sum();
    if (shared_dist - shared_cons).abs() <= MISMATCH_TOLERANCE_KWH {
        return;
    }
    warn_row(
        format!(
            "Energy shared by distributors ({shared_dist:.4} kWh) does not match energy \
             received by consumers ({shared_cons:.4} kWh); treating the mismatch as not shared"
        ),
        errors,
    );
    let (larger_side, ratio) = if shared_dist > shared_cons {
        (distributions, shared_cons / shared_dist)
    } else {
        (consumers, shared_dist / shared_cons)
    };
    // Both totals are non-negative after clipping and the larger one is
    // strictly positive here, so the ratio lies in [0, 1).
    assert!((0.0..1.0).contains(&ratio), "scale ratio out of range: {ratio}");
    for m in larger_side.iter_mut() {
        m.after = m.before - m.shared() * ratio;
    }
}

/// Attributes residual shareable energy to each side pro-rata.
///
/// When both sides still hold residual energy above the dust floor after
/// sharing, the smaller residual could have been shared under a better
/// allocation key. Returns that total.
fn attribute_missed_sharing(
    distributions: &mut [Measurement],
    consumers: &mut [Measurement],
) -> f64 {
    let any_residual =
        |side: &[Measurement]| side.iter().any(|m| m.after > RESIDUAL_FLOOR_KWH);
    if !any_residual(distributions) || !any_residual(consumers) {
        return 0.0;
    }
    let dist_after: f64 = distributions.iter().map(|m| m.after).sum();
    let cons_after: f64 = consumers.iter().map(|m| m.after).sum();
    let sum_missed = dist_after.min(cons_after);
    for c in consumers.iter_mut() {
        c.missed = c.after / cons_after * sum_missed;
    }
    for d in distributions.iter_mut() {
        d.missed = d.after / dist_after * sum_missed;
    }
    sum_missed
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER_1D_1O: &str = "Datum;Cas od;Cas do;\
        IN-859182400020000001-D;OUT-859182400020000001-D;\
        IN-859182400000000002-O;OUT-859182400000000002-O";

    fn parse(text: &str) -> (Result<Report, ParseError>, WarningLog) {
        let mut warnings = WarningLog::new();
        let report = parse_report(text, "test.csv", &mut warnings);
        (report, warnings)
    }

    #[test]
    fn minimal_consistent_report() {
        let text = format!("{HEADER_1D_1O}\n05.02.2025;11:00;11:15;1,00;0,50;-0,80;-0,30;\n");
        let (report, warnings) = parse(&text);
        let Ok(report) = report else {
            panic!("parse failed: {:?}", report.err());
        };
        assert!(warnings.is_empty());
        assert_eq!(report.intervals.len(), 1);
        let interval = &report.intervals[0];
        assert!((interval.sum_sharing - 0.5).abs() < 1e-9);
        assert!((interval.sum_production - 1.0).abs() < 1e-9);
        assert_eq!(interval.distributions[0].before, 1.0);
        assert_eq!(interval.consumers[0].before, 0.8);
        assert_eq!(interval.consumers[0].after, 0.3);
    }

    #[test]
    fn empty_input_is_fatal() {
        let (report, _) = parse("");
        assert!(matches!(report, Err(ParseError::Empty)));
    }

    #[test]
    fn missing_timestamp_columns_is_fatal() {
        let (report, _) = parse("A;B;C;IN-859182400020000001-D;OUT-859182400020000001-D\n");
        assert!(matches!(report, Err(ParseError::Header { .. })));
    }

    #[test]
    fn unpaired_ean_column_is_fatal() {
        let text = "Datum;Cas od;Cas do;IN-859182400020000001-D\n";
        let (report, _) = parse(text);
        assert!(matches!(report, Err(ParseError::Header { .. })));
    }

    #[test]
    fn mismatched_pair_codes_are_fatal() {
        let text = "Datum;Cas od;Cas do;\
            IN-859182400020000001-D;OUT-859182400020000009-D\n";
        let (report, _) = parse(text);
        assert!(matches!(report, Err(ParseError::HeaderPair { .. })));
    }

    #[test]
    fn short_ean_code_is_fatal() {
        let text = "Datum;Cas od;Cas do;IN-12345-D;OUT-12345-D\n";
        let (report, _) = parse(text);
        assert!(matches!(report, Err(ParseError::HeaderPair { .. })));
    }

    #[test]
    fn wrong_row_width_is_fatal() {
        let text = format!("{HEADER_1D_1O}\n05.02.2025;11:00;11:15;1,00;0,50\n");
        let (report, _) = parse(&text);
        assert!(matches!(report, Err(ParseError::RowShape { .. })));
    }

    #[test]
    fn header_without_rows_is_fatal() {
        let (report, _) = parse(&format!("{HEADER_1D_1O}\n"));
        assert!(matches!(report, Err(ParseError::NoData)));
    }

    #[test]
    fn garbled_number_is_fatal() {
        let text = format!("{HEADER_1D_1O}\n05.02.2025;11:00;11:15;abc;0,50;-0,80;-0,30;\n");
        let (report, _) = parse(&text);
        assert!(matches!(report, Err(ParseError::Number { .. })));
    }

    #[test]
    fn blank_lines_and_trailing_empty_field_are_tolerated() {
        let text = format!(
            "{HEADER_1D_1O}\n\n05.02.2025;11:00;11:15;1,00;0,50;-0,80;-0,30;\n\n"
        );
        let (report, _) = parse(&text);
        assert_eq!(report.map(|r| r.intervals.len()).ok(), Some(1));
    }

    #[test]
    fn empty_value_fields_are_zero() {
        let text = format!("{HEADER_1D_1O}\n05.02.2025;11:00;11:15;;;;;\n");
        let (report, warnings) = parse(&text);
        let Ok(report) = report else {
            panic!("parse failed: {:?}", report.err());
        };
        assert!(warnings.is_empty());
        assert_eq!(report.intervals[0].sum_sharing, 0.0);
        assert_eq!(report.intervals[0].sum_production, 0.0);
    }

    #[test]
    fn after_greater_than_before_is_clipped() {
        // Distributor claims more remaining than produced: 0.2 before, 0.5 after.
        let text = format!("{HEADER_1D_1O}\n05.02.2025;11:00;11:15;0,20;0,50;0,00;0,00;\n");
        let (report, warnings) = parse(&text);
        let Ok(report) = report else {
            panic!("parse failed: {:?}", report.err());
        };
        assert_eq!(warnings.len(), 1);
        let m = report.intervals[0].distributions[0];
        assert_eq!(m.after, m.before);
        assert_eq!(report.intervals[0].errors.len(), 1);
    }

    #[test]
    fn negative_consumer_reading_is_clipped() {
        // Positive source values for a consumer negate into negative readings.
        let text = format!("{HEADER_1D_1O}\n05.02.2025;11:00;11:15;0,00;0,00;0,40;0,10;\n");
        let (report, warnings) = parse(&text);
        let Ok(report) = report else {
            panic!("parse failed: {:?}", report.err());
        };
        assert!(!warnings.is_empty());
        let m = report.intervals[0].consumers[0];
        assert!(m.before >= 0.0 && m.after >= 0.0 && m.after <= m.before);
    }

    #[test]
    fn shared_total_mismatch_rescales_larger_side() {
        // Distributor shares 0.80 but consumers only received 0.50; the
        // distributor's remaining energy is scaled up so both sides agree on
        // the smaller total.
        let text = format!("{HEADER_1D_1O}\n05.02.2025;11:00;11:15;1,00;0,20;-0,60;-0,10;\n");
        let (report, warnings) = parse(&text);
        let Ok(report) = report else {
            panic!("parse failed: {:?}", report.err());
        };
        assert_eq!(warnings.len(), 1);
        let interval = &report.intervals[0];
        assert!((interval.sum_sharing - 0.5).abs() < 1e-9);
        assert!((interval.distributions[0].after - 0.5).abs() < 1e-9);
        // Consumer side untouched.
        assert!((interval.consumers[0].after - 0.1).abs() < 1e-9);
        // Conservation holds after the fix.
        let shared_cons: f64 = interval.consumers.iter().map(Measurement::shared).sum();
        assert!((interval.sum_sharing - shared_cons).abs() < 1e-6);
    }

    #[test]
    fn missed_sharing_attributed_pro_rata() {
        // Distributor keeps 0.60 unshared while consumers still want 0.30
        // total (0.20 + 0.10): 0.30 kWh was missed.
        let text = "Datum;Cas od;Cas do;\
            IN-859182400020000001-D;OUT-859182400020000001-D;\
            IN-859182400000000002-O;OUT-859182400000000002-O;\
            IN-859182400000000003-O;OUT-859182400000000003-O\n\
            05.02.2025;11:00;11:15;1,00;0,60;-0,60;-0,20;-0,50;-0,10;\n";
        let (report, warnings) = parse(text);
        let Ok(report) = report else {
            panic!("parse failed: {:?}", report.err());
        };
        assert!(warnings.is_empty());
        let interval = &report.intervals[0];
        assert!((interval.sum_missed - 0.3).abs() < 1e-9);
        let consumer_missed: f64 = interval.consumers.iter().map(|m| m.missed).sum();
        assert!((consumer_missed - 0.3).abs() < 1e-9);
        assert!((interval.consumers[0].missed - 0.2).abs() < 1e-9);
        assert!((interval.consumers[1].missed - 0.1).abs() < 1e-9);
        assert!((interval.distributions[0].missed - 0.3).abs() < 1e-9);
    }

    #[test]
    fn dust_residuals_are_not_missed_sharing() {
        let text = format!("{HEADER_1D_1O}\n05.02.2025;11:00;11:15;0,01;0,01;-0,01;-0,01;\n");
        let (report, _) = parse(&text);
        let Ok(report) = report else {
            panic!("parse failed: {:?}", report.err());
        };
        assert_eq!(report.intervals[0].sum_missed, 0.0);
    }

    #[test]
    fn warnings_carry_row_timestamp() {
        let text = format!("{HEADER_1D_1O}\n05.02.2025;11:00;11:15;1,00;0,20;-0,60;-0,10;\n");
        let (_, warnings) = parse(&text);
        assert_eq!(warnings.len(), 1);
        assert!(warnings.entries()[0].to_string().starts_with("[2025-02-05 11:00]"));
    }
}
