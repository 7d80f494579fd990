//! Shared test fixtures: report-text builders in the EDC wire format.

use edc_share::report::model::Report;
use edc_share::report::parse::parse_report;
use edc_share::warnings::WarningLog;

/// Distribution EAN used by the default fixtures.
pub const DIST_EAN: &str = "859182400020000001";
/// Consumer EANs used by the default fixtures, in code order.
pub const CONS_EAN_A: &str = "859182400000000002";
pub const CONS_EAN_B: &str = "859182400000000013";

/// Builds a header row for the given distribution and consumer EAN codes.
pub fn header(dists: &[&str], cons: &[&str]) -> String {
    let mut fields = vec!["Datum".to_string(), "Cas od".to_string(), "Cas do".to_string()];
    for code in dists {
        fields.push(format!("IN-{code}-D"));
        fields.push(format!("OUT-{code}-D"));
    }
    for code in cons {
        fields.push(format!("IN-{code}-O"));
        fields.push(format!("OUT-{code}-O"));
    }
    fields.join(";")
}

/// Formats a kWh value the way the wire format does (comma separator).
pub fn kwh(value: f64) -> String {
    format!("{value:.2}").replace('.', ",")
}

/// Builds one data row.
///
/// `dists` are (before, after) production pairs, `cons` are (before, after)
/// consumption pairs given as positive magnitudes; the wire format stores
/// consumer readings negated.
pub fn row(date: &str, time_from: &str, dists: &[(f64, f64)], cons: &[(f64, f64)]) -> String {
    let (h, m) = time_from.split_once(':').unwrap();
    let (h, m): (u32, u32) = (h.parse().unwrap(), m.parse().unwrap());
    let to_minutes = h * 60 + m + 15;
    let time_to = format!("{:02}:{:02}", (to_minutes / 60) % 24, to_minutes % 60);

    let mut fields = vec![date.to_string(), time_from.to_string(), time_to];
    for &(before, after) in dists {
        fields.push(kwh(before));
        fields.push(kwh(after));
    }
    for &(before, after) in cons {
        fields.push(kwh(-before));
        fields.push(kwh(-after));
    }
    // Reports end every row with a trailing separator.
    fields.join(";") + ";"
}

/// Parses report text, panicking on structural errors.
pub fn parse(text: &str) -> (Report, WarningLog) {
    let mut warnings = WarningLog::new();
    let report = parse_report(text, "fixture.csv", &mut warnings).expect("fixture must parse");
    (report, warnings)
}

/// A consistent two-hour report: one distributor, two consumers, eight
/// 15-minute intervals starting 05.02.2025 11:00.
pub fn consistent_report_text() -> String {
    let mut lines = vec![header(&[DIST_EAN], &[CONS_EAN_A, CONS_EAN_B])];
    let times = ["11:00", "11:15", "11:30", "11:45", "12:00", "12:15", "12:30", "12:45"];
    for (i, time) in times.iter().enumerate() {
        let produced = 1.0 + 0.1 * i as f64;
        // Distributor shares 0.60, consumer A receives 0.40, B receives 0.20.
        lines.push(row(
            "05.02.2025",
            time,
            &[(produced, produced - 0.6)],
            &[(0.5, 0.1), (0.3, 0.1)],
        ));
    }
    lines.join("\n") + "\n"
}
