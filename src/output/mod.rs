//! Output formatters for presence reports.
//!
//! This module provides a trait for turning a [`PresenceReport`] into a line
//! of text. Currently supports InfluxDB line protocol, which Telegraf can
//! ingest directly through its `execd` input.

pub mod influxdb;

use crate::presence::PresenceReport;

/// Trait for formatting presence reports into output strings.
pub trait OutputFormatter: Send + Sync {
    /// Format a report (includes timestamp) as a single line without the
    /// trailing newline.
    fn format(&self, report: &PresenceReport) -> String;
}
