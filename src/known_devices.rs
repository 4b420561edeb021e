//! The persisted list of known devices.
//!
//! The list is read once at startup. Each entry names a device and whether
//! it is tracked or explicitly ignored. Only entries carrying the `BLE_`
//! marker belong to this tracker; others are left for other transports.
//!
//! ```toml
//! [[device]]
//! mac = "BLE_AA:BB:CC:DD:EE:FF"
//! track = true
//!
//! [[device]]
//! mac = "BLE_11:22:33:44:55:66"
//! track = false
//! ```

use crate::address::{MacAddress, ParseMacError};
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A known device after marker stripping and address parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownDevice {
    pub address: MacAddress,
    pub track: bool,
}

/// Errors returned while loading the known-device list.
#[derive(Error, Debug)]
pub enum KnownDevicesError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize)]
struct DeviceFile {
    #[serde(default, rename = "device")]
    devices: Vec<DeviceEntry>,
}

#[derive(Debug, Deserialize)]
struct DeviceEntry {
    mac: String,
    #[serde(default = "default_track")]
    track: bool,
}

fn default_track() -> bool {
    true
}

/// Load the known-device list from a TOML file.
pub fn load(path: &Path) -> Result<Vec<KnownDevice>, KnownDevicesError> {
    let content = std::fs::read_to_string(path).map_err(|source| KnownDevicesError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content).map_err(|source| KnownDevicesError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse known-device TOML, keeping only BLE entries.
///
/// Entries with an unparsable address are logged and skipped.
pub fn parse(content: &str) -> Result<Vec<KnownDevice>, toml::de::Error> {
    let file: DeviceFile = toml::from_str(content)?;

    let devices = file
        .devices
        .into_iter()
        .filter_map(|entry| {
            let Some(address) = MacAddress::strip_ble_prefix(&entry.mac) else {
                tracing::debug!(mac = %entry.mac, "skipping non-BLE device");
                return None;
            };
            match address.parse::<MacAddress>() {
                Ok(address) => Some(KnownDevice {
                    address,
                    track: entry.track,
                }),
                Err(error) => {
                    tracing::warn!(mac = %entry.mac, %error, "skipping known device");
                    None
                }
            }
        })
        .collect();

    Ok(devices)
}

/// Parse a command-line device address, with or without the `BLE_` marker.
pub fn parse_address(src: &str) -> Result<MacAddress, ParseMacError> {
    src.parse()
}
