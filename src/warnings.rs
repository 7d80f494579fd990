//! Append-only log of reconciliation warnings.
//!
//! The parser corrects numerically inconsistent rows instead of rejecting
//! them; every correction is recorded here with the timestamp of the affected
//! interval, and mirrored to the `tracing` sink. The log is owned by the
//! caller and is never cleared by the core — a caller loading a new report
//! starts with a fresh log.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::report::value::print_date;

/// One reconciliation finding, tied to the interval it was detected in.
#[derive(Debug, Clone)]
pub struct Warning {
    /// Start of the interval the finding applies to.
    pub at: DateTime<Utc>,
    /// Human-readable description naming the EAN and the discrepancy.
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", print_date(self.at), self.message)
    }
}

/// Append-only collection of [`Warning`]s produced while parsing one report.
#[derive(Debug, Default)]
pub struct WarningLog {
    entries: Vec<Warning>,
}

impl WarningLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning and emits it through `tracing::warn!`.
    pub fn push(&mut self, at: DateTime<Utc>, message: impl Into<String>) {
        let message = message.into();
        warn!(interval = %print_date(at), "{message}");
        self.entries.push(Warning { at, message });
    }

    pub fn entries(&self) -> &[Warning] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
