//! The periodic scan-and-classify loop.
//!
//! One cycle scans once, reports every tracked device that was seen
//! (reading its battery when due), and feeds unclassified devices to the
//! promotion vote. Cycles never overlap: the next one is armed only after
//! the current one, battery reads included, has completed. No error escapes
//! a cycle.

use crate::battery_schedule::BatterySchedule;
use crate::classifier::{Classification, DeviceRegistry, PresenceVote};
use crate::gatt::{BatteryReading, read_battery_level};
use crate::known_devices::KnownDevice;
use crate::presence::{NamePolicy, PresenceReport, PresenceSink};
use crate::radio::{DiscoveredDevice, Radio};
use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Default time between the end of one cycle and the start of the next.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(12);

/// Tracker settings, already validated.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub track_new: bool,
    pub scan_interval: Duration,
    /// Battery poll interval; `None` disables battery tracking
    pub battery_interval: Option<Duration>,
    pub name_policy: NamePolicy,
    /// Votes of unclassified devices not seen for this long are dropped;
    /// `None` keeps them for the life of the process
    pub vote_expiry: Option<Duration>,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            track_new: false,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            battery_interval: None,
            name_policy: NamePolicy::default(),
            vote_expiry: None,
        }
    }
}

/// Errors that prevent the scheduler from starting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("no Bluetooth LE devices to track and tracking of new devices is disabled")]
    NothingToTrack,
}

pub struct Scheduler<R: Radio, S: PresenceSink> {
    radio: R,
    sink: S,
    registry: DeviceRegistry,
    battery: Option<BatterySchedule>,
    settings: TrackerSettings,
}

impl<R: Radio, S: PresenceSink> Scheduler<R, S> {
    /// Build a scheduler from the known-device list.
    ///
    /// Every tracked device is enrolled for an immediate battery read when
    /// battery tracking is enabled.
    pub fn new(
        radio: R,
        sink: S,
        known: &[KnownDevice],
        settings: TrackerSettings,
    ) -> Result<Self, ConfigError> {
        let registry = DeviceRegistry::from_known(known);

        if registry.tracked().is_empty() && !settings.track_new {
            tracing::warn!("no Bluetooth LE devices to track");
            return Err(ConfigError::NothingToTrack);
        }

        let battery = settings.battery_interval.map(|interval| {
            let mut schedule = BatterySchedule::new(interval);
            for address in registry.tracked() {
                schedule.enroll(*address);
            }
            schedule
        });

        Ok(Self {
            radio,
            sink,
            registry,
            battery,
            settings,
        })
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn battery_schedule(&self) -> Option<&BatterySchedule> {
        self.battery.as_ref()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    async fn discover(&self) -> Vec<DiscoveredDevice> {
        tracing::info!("discovering Bluetooth LE devices");
        match self.radio.scan().await {
            Ok(devices) => {
                tracing::info!(count = devices.len(), "Bluetooth LE devices discovered");
                devices
            }
            Err(error) => {
                tracing::error!(%error, "error during Bluetooth LE scan");
                Vec::new()
            }
        }
    }

    /// Read the battery of `device` if a read is due, applying the outcome
    /// to the schedule.
    async fn poll_battery(&mut self, device: &DiscoveredDevice, now: SystemTime) -> Option<u8> {
        let schedule = self.battery.as_mut()?;
        if !schedule.is_due(&device.address, now) {
            return None;
        }

        let address = device.address;
        tracing::info!(%address, "reading battery");
        match read_battery_level(&self.radio, address, device.address_type).await {
            BatteryReading::Level(level) => {
                tracing::info!(%address, level, "read battery level");
                schedule.record(&address, now);
                Some(level)
            }
            BatteryReading::ServiceUnavailable(error) => {
                tracing::warn!(%address, %error, "battery level not available, no longer polling it");
                schedule.disable(&address);
                None
            }
            BatteryReading::TransientFailure(error) => {
                tracing::warn!(
                    %address,
                    %error,
                    retry_in = ?schedule.interval(),
                    "could not read battery level"
                );
                schedule.record(&address, now);
                None
            }
        }
    }

    /// Run one scan cycle.
    pub async fn run_cycle(&mut self, now: SystemTime) {
        let devices = self.discover().await;

        let tracked = self.registry.tracked().to_vec();
        for address in tracked {
            let Some(device) = devices.iter().find(|d| d.address == address) else {
                continue;
            };
            let battery = self.poll_battery(device, now).await;
            let name = self.settings.name_policy.normalize(&device.display_name());
            self.sink.report(PresenceReport {
                address,
                name,
                battery,
                timestamp: now,
            });
        }

        if !self.settings.track_new {
            return;
        }

        let mut observed = HashSet::new();
        for device in &devices {
            if !observed.insert(device.address)
                || self.registry.classify(&device.address) != Classification::Unclassified
            {
                continue;
            }
            tracing::debug!(address = %device.address, "discovered Bluetooth LE device");

            let name = self.settings.name_policy.normalize(&device.display_name());
            if let PresenceVote::Promoted { name } =
                self.registry.observe_unclassified(device.address, name, now)
            {
                if let Some(schedule) = self.battery.as_mut() {
                    schedule.enroll(device.address);
                }
                self.sink.report(PresenceReport {
                    address: device.address,
                    name,
                    battery: None,
                    timestamp: now,
                });
            }
        }

        if let Some(cutoff) = self.settings.vote_expiry.and_then(|expiry| now.checked_sub(expiry)) {
            let dropped = self.registry.prune_votes(cutoff);
            if dropped > 0 {
                tracing::info!(dropped, "forgot stale unclassified devices");
            }
        }
    }

    /// Run cycles until `shutdown` resolves, sleeping `scan_interval` after
    /// each completed cycle.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            self.run_cycle(SystemTime::now()).await;
            tokio::select! {
                _ = tokio::time::sleep(self.settings.scan_interval) => {}
                _ = &mut shutdown => {
                    tracing::info!("stopping Bluetooth LE tracker");
                    return;
                }
            }
        }
    }
}
