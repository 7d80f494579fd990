//! Parsing, modeling, and resampling of EDC interval sharing reports.

pub mod aggregate;
pub mod model;
pub mod parse;
pub mod stats;
pub mod value;

pub use aggregate::Grouping;
pub use model::{Ean, EanRole, Interval, Measurement, Report};
pub use parse::{ParseError, parse_report};
pub use stats::{EanStats, collect_stats};
pub use value::DisplayUnit;
