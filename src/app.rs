//! Core application runner for `ble-tracker`.
//!
//! This module is decoupled from process exit codes and from the BlueZ
//! backend so it can be tested deterministically with an injected radio and
//! output stream.

use crate::address::MacAddress;
use crate::battery_schedule::parse_duration;
use crate::known_devices::{self, KnownDevice, KnownDevicesError, parse_address};
use crate::output::influxdb::InfluxDbFormatter;
use crate::presence::{LineSink, NamePolicy};
use crate::radio::{Radio, ScanError};
use crate::scheduler::{ConfigError, Scheduler, TrackerSettings};
use clap::Parser;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Command-line configuration.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Time between the end of one scan cycle and the start of the next.
    /// Accepts duration with suffix: 500ms, 12s, 1m, 2h, 1d.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, default_value = "12s", value_parser = parse_duration)]
    pub scan_interval: Duration,

    /// Length of the discovery window of each scan.
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub scan_duration: Duration,

    /// Track devices that are seen repeatedly but are not in the known list
    #[arg(long)]
    pub track_new: bool,

    /// Forget a new device that has not been seen for this long before it
    /// was promoted. By default sightings are kept until promotion.
    #[arg(long, value_parser = parse_duration, value_name = "DURATION")]
    pub vote_expiry: Option<Duration>,

    /// Periodically read the battery level of tracked devices
    #[arg(long)]
    pub track_battery: bool,

    /// Minimum time between battery reads of the same device.
    /// Zero disables battery reads.
    #[arg(long, default_value = "1d", value_parser = parse_duration)]
    pub battery_interval: Duration,

    /// TOML file listing known devices
    #[arg(long, value_name = "FILE")]
    pub known_devices: Option<PathBuf>,

    /// Track a device. Format: --track BLE_AA:BB:CC:DD:EE:FF
    #[arg(long = "track", value_parser = parse_address, value_name = "ADDRESS")]
    pub track: Vec<MacAddress>,

    /// Ignore a device, never promoting it
    #[arg(long = "ignore", value_parser = parse_address, value_name = "ADDRESS")]
    pub ignore: Vec<MacAddress>,

    /// How advertised names are shortened before reporting
    #[arg(long, default_value_t, value_enum)]
    pub name_policy: NamePolicy,

    /// The name of the measurement in InfluxDB line protocol.
    #[arg(long, default_value = "ble_presence")]
    pub measurement: String,

    /// Run a single scan cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Options {
    pub fn settings(&self) -> TrackerSettings {
        TrackerSettings {
            track_new: self.track_new,
            scan_interval: self.scan_interval,
            battery_interval: (self.track_battery && !self.battery_interval.is_zero())
                .then_some(self.battery_interval),
            name_policy: self.name_policy,
            vote_expiry: self.vote_expiry,
        }
    }

    /// File entries first, then `--track` and `--ignore`.
    pub fn known_devices(&self) -> Result<Vec<KnownDevice>, KnownDevicesError> {
        let mut devices = match &self.known_devices {
            Some(path) => known_devices::load(path)?,
            None => Vec::new(),
        };
        devices.extend(self.track.iter().map(|&address| KnownDevice {
            address,
            track: true,
        }));
        devices.extend(self.ignore.iter().map(|&address| KnownDevice {
            address,
            track: false,
        }));
        Ok(devices)
    }
}

/// Errors returned by the application runner.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    KnownDevices(#[from] KnownDevicesError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Run the tracker with `radio`, writing one line per presence report to
/// `out` until `shutdown` resolves (or after one cycle with `--once`).
///
/// Returns the output stream so callers can inspect it.
pub async fn run_with_radio<R: Radio, W: Write>(
    options: Options,
    radio: R,
    out: W,
    shutdown: impl Future<Output = ()>,
) -> Result<W, RunError> {
    let known = options.known_devices()?;
    let formatter = InfluxDbFormatter::new(options.measurement.clone());
    let sink = LineSink::new(Box::new(formatter), out);

    let mut scheduler = Scheduler::new(radio, sink, &known, options.settings())?;
    tracing::info!(
        tracked = scheduler.registry().tracked().len(),
        track_new = options.track_new,
        track_battery = options.track_battery,
        "starting Bluetooth LE tracker"
    );

    if options.once {
        scheduler.run_cycle(SystemTime::now()).await;
    } else {
        scheduler.run(shutdown).await;
    }

    Ok(scheduler.into_sink().into_inner())
}
