//! Bluetooth LE device addressing.
//!
//! [`MacAddress`] is the identity every tracker map is keyed by. It is kept
//! independent of the Bluetooth backend so the scheduling core can be
//! exercised without BlueZ.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Marker that distinguishes BLE entries in the known-device list from
/// entries belonging to other transports.
pub const BLE_PREFIX: &str = "BLE_";

/// A Bluetooth hardware address stored as a compact 6-byte array.
///
/// Displays in canonical uppercase form (`AA:BB:CC:DD:EE:FF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Parse an address that may carry the [`BLE_PREFIX`] marker.
    ///
    /// Returns `None` for entries that carry a different transport marker or
    /// no marker at all.
    pub fn strip_ble_prefix(src: &str) -> Option<&str> {
        let src = src.trim();
        let marker = src.get(..BLE_PREFIX.len())?;
        marker
            .eq_ignore_ascii_case(BLE_PREFIX)
            .then(|| &src[BLE_PREFIX.len()..])
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Errors returned when parsing an address string.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseMacError {
    #[error("invalid address: expected 6 parts, got {0}")]
    InvalidLength(usize),
    #[error("invalid address: part {0} has wrong length")]
    InvalidPartLength(usize),
    #[error("invalid address: '{0}' is not valid hex")]
    InvalidHex(String),
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    /// Accepts `AA:BB:CC:DD:EE:FF` in either case, optionally prefixed with
    /// `BLE_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = MacAddress::strip_ble_prefix(s).unwrap_or(s.trim());
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(ParseMacError::InvalidLength(parts.len()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(ParseMacError::InvalidPartLength(i));
            }
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseMacError::InvalidHex(part.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(feature = "bluer")]
impl From<MacAddress> for bluer::Address {
    fn from(addr: MacAddress) -> Self {
        bluer::Address(addr.0)
    }
}

/// LE addressing mode a central must use when connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressType {
    #[default]
    Public,
    Random,
}

impl AddressType {
    /// The other addressing mode.
    pub fn flipped(self) -> Self {
        match self {
            AddressType::Public => AddressType::Random,
            AddressType::Random => AddressType::Public,
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressType::Public => write!(f, "public"),
            AddressType::Random => write!(f, "random"),
        }
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::AddressType> for AddressType {
    fn from(kind: bluer::AddressType) -> Self {
        match kind {
            bluer::AddressType::LeRandom => AddressType::Random,
            _ => AddressType::Public,
        }
    }
}

#[cfg(feature = "bluer")]
impl From<AddressType> for bluer::AddressType {
    fn from(kind: AddressType) -> Self {
        match kind {
            AddressType::Public => bluer::AddressType::LePublic,
            AddressType::Random => bluer::AddressType::LeRandom,
        }
    }
}
