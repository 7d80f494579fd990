//! Locale-specific value and timestamp primitives for EDC sharing reports.
//!
//! Reports use a comma decimal separator (`"1,25"` for 1.25 kWh) and split
//! each row's timestamp across a `DD.MM.YYYY` date field and an `HH:MM`
//! time-from field. Empty value fields mean 0 kWh.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// Parses one kWh field from a report row.
///
/// An empty field parses as 0. The comma fractional separator is accepted
/// alongside a plain dot. Returns `None` for anything that is not a decimal
/// number; the caller decides whether that is fatal.
pub fn parse_kwh(field: &str) -> Option<f64> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    let adjusted = trimmed.replace(',', ".");
    adjusted.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a row's start timestamp from the `Datum` and `Cas od` fields.
///
/// Timestamps carry no zone information in the source report and are treated
/// as UTC throughout, matching the bucket-aligned 15-minute cadence.
pub fn parse_row_start(date_field: &str, time_field: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date_field.trim(), "%d.%m.%Y").ok()?;
    let time = NaiveTime::parse_from_str(time_field.trim(), "%H:%M").ok()?;
    Some(date.and_time(time).and_utc())
}

/// Unit used when rendering energy values.
///
/// Interval readings are kWh over a 15-minute bucket, so the average-power
/// rendering multiplies by 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayUnit {
    /// Energy per bucket (kWh).
    #[default]
    KWh,
    /// Average power over the bucket (kW).
    KW,
}

impl FromStr for DisplayUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kWh" => Ok(Self::KWh),
            "kW" => Ok(Self::KW),
            other => Err(format!("unknown display unit \"{other}\", expected \"kWh\" or \"kW\"")),
        }
    }
}

impl fmt::Display for DisplayUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KWh => write!(f, "kWh"),
            Self::KW => write!(f, "kW"),
        }
    }
}

/// Renders an energy value in the requested unit.
pub fn print_kwh(kwh: f64, unit: DisplayUnit) -> String {
    match unit {
        DisplayUnit::KWh => format!("{kwh:.2} kWh"),
        DisplayUnit::KW => format!("{:.2} kW", kwh * 4.0),
    }
}

/// Renders a UTC timestamp as `YYYY-MM-DD`.
pub fn print_only_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Renders a UTC timestamp as `YYYY-MM-DD HH:MM`.
pub fn print_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kwh_comma_separator() {
        assert_eq!(parse_kwh("1,25"), Some(1.25));
        assert_eq!(parse_kwh("-0,74"), Some(-0.74));
        assert_eq!(parse_kwh("10,03"), Some(10.03));
    }

    #[test]
    fn parse_kwh_empty_is_zero() {
        assert_eq!(parse_kwh(""), Some(0.0));
        assert_eq!(parse_kwh("  "), Some(0.0));
    }

    #[test]
    fn parse_kwh_plain_integer() {
        assert_eq!(parse_kwh("3"), Some(3.0));
    }

    #[test]
    fn parse_kwh_garbage_is_none() {
        assert_eq!(parse_kwh("abc"), None);
        assert_eq!(parse_kwh("1,2,3"), None);
    }

    #[test]
    fn parse_row_start_basic() {
        let at = parse_row_start("05.02.2025", "11:15");
        assert!(at.is_some());
        assert_eq!(at.map(print_date).as_deref(), Some("2025-02-05 11:15"));
    }

    #[test]
    fn parse_row_start_bad_fields() {
        assert!(parse_row_start("2025-02-05", "11:15").is_none());
        assert!(parse_row_start("05.02.2025", "25:99").is_none());
    }

    #[test]
    fn print_kwh_units() {
        assert_eq!(print_kwh(0.5, DisplayUnit::KWh), "0.50 kWh");
        // 0.5 kWh over 15 minutes averages 2 kW
        assert_eq!(print_kwh(0.5, DisplayUnit::KW), "2.00 kW");
    }

    #[test]
    fn display_unit_round_trip() {
        assert_eq!("kWh".parse::<DisplayUnit>(), Ok(DisplayUnit::KWh));
        assert_eq!("kW".parse::<DisplayUnit>(), Ok(DisplayUnit::KW));
        assert!("watts".parse::<DisplayUnit>().is_err());
    }
}
