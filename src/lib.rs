//! Analyzer for EDC energy-sharing interval reports.

pub mod config;
pub mod io;
/// Report parsing, normalization, and temporal aggregation.
pub mod report;
pub mod sharing;
pub mod warnings;
