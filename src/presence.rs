//! Presence reports and the sink they are delivered to.

use crate::address::MacAddress;
use crate::output::OutputFormatter;
use std::io::Write;
use std::time::SystemTime;

/// One "device is present" observation, emitted per tracked device per cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceReport {
    pub address: MacAddress,
    /// Normalized display name, if one is known
    pub name: Option<String>,
    /// Battery level in percent, only set on cycles where it was read
    pub battery: Option<u8>,
    /// Start time of the cycle that produced this report
    pub timestamp: SystemTime,
}

/// Receiver of presence reports. Delivery is fire-and-forget.
pub trait PresenceSink {
    fn report(&mut self, report: PresenceReport);
}

/// How advertised names are reduced before they are stored or reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum NamePolicy {
    /// Keep only the first character of the trimmed name
    #[default]
    FirstCharacter,
    /// Keep the whole trimmed name
    Full,
}

impl NamePolicy {
    /// Normalize a raw name. Blank names normalize to `None`.
    pub fn normalize(self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        match self {
            NamePolicy::FirstCharacter => trimmed.chars().next().map(String::from),
            NamePolicy::Full if trimmed.is_empty() => None,
            NamePolicy::Full => Some(trimmed.to_string()),
        }
    }
}

/// Sink that writes one formatted line per report.
///
/// Write failures are logged and the report is dropped; a broken output
/// stream must not stop the scan schedule.
pub struct LineSink<W: Write> {
    formatter: Box<dyn OutputFormatter>,
    out: W,
}

impl<W: Write> LineSink<W> {
    pub fn new(formatter: Box<dyn OutputFormatter>, out: W) -> Self {
        Self { formatter, out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> PresenceSink for LineSink<W> {
    fn report(&mut self, report: PresenceReport) {
        let line = self.formatter.format(&report);
        let written = writeln!(self.out, "{line}").and_then(|()| self.out.flush());
        if let Err(error) = written {
            tracing::warn!(%error, address = %report.address, "failed to write presence report");
        }
    }
}
