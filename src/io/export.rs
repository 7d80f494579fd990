//! CSV export for aggregated interval series.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::report::model::{Interval, Report};
use crate::report::value::print_date;

/// Exports an interval selection to a semicolon-delimited CSV file.
///
/// `intervals` must come from `report` (typically the output of
/// [`Report::grouped_intervals`]). Produces deterministic output for
/// identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_intervals_csv(report: &Report, intervals: &[Interval], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_intervals_csv(report, intervals, buf)
}

/// Writes an interval selection as semicolon-delimited CSV to any writer.
///
/// One row per interval: bucket start, the three bucket sums, then the
/// shared energy per consumer EAN (columns named by EAN code, in canonical
/// order). All energies in kWh.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_intervals_csv(
    report: &Report,
    intervals: &[Interval],
    writer: impl Write,
) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b';').from_writer(writer);

    let mut header = vec![
        "date".to_string(),
        "production_kwh".to_string(),
        "sharing_kwh".to_string(),
        "missed_kwh".to_string(),
    ];
    header.extend(report.consumer_eans.iter().map(|ean| ean.code.clone()));
    wtr.write_record(&header)?;

    for interval in intervals {
        let mut row = vec![
            print_date(interval.start),
            format!("{:.2}", interval.sum_production),
            format!("{:.2}", interval.sum_sharing),
            format!("{:.2}", interval.sum_missed),
        ];
        row.extend(
            interval
                .consumers
                .iter()
                .map(|m| format!("{:.2}", m.shared())),
        );
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}
