//! `ble-tracker` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup
//! and process exit codes. The scan loop lives in [`crate::scheduler`] and
//! talks to Bluetooth only through the [`crate::radio`] traits, so it can be
//! tested deterministically with an injected radio and sink.

pub mod address;
pub mod app;
pub mod battery_schedule;
pub mod classifier;
pub mod gatt;
pub mod known_devices;
pub mod logging;
pub mod output;
pub mod presence;
pub mod radio;
pub mod scheduler;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use address::{AddressType, MacAddress};
pub use battery_schedule::{BatterySchedule, parse_duration};
pub use classifier::{Classification, DeviceRegistry, MIN_SEEN_NEW, PresenceVote};
pub use gatt::{BatteryReading, GattClient, GattError};
pub use known_devices::KnownDevice;
pub use output::OutputFormatter;
pub use output::influxdb::InfluxDbFormatter;
pub use presence::{LineSink, NamePolicy, PresenceReport, PresenceSink};
pub use radio::{DiscoveredDevice, GattLink, LinkError, Radio, ScanError};
pub use scheduler::{ConfigError, Scheduler, TrackerSettings};
