//! GATT client subsystem.
//!
//! Connection establishment with address-type fallback ([`connect`]), the
//! protocol client that resolves services and performs typed reads and
//! notification exchanges ([`client`]), and the accessory drivers built on
//! it ([`driver`]).

pub mod battery;
pub mod client;
pub mod connect;
pub mod driver;
pub mod notification;

use crate::radio::LinkError;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub use battery::{BatteryReading, read_battery_level};
pub use client::GattClient;
pub use connect::{MAX_CONNECT_ATTEMPTS, connect};
pub use notification::NotificationBuffer;

/// Bluetooth base UUID `00000000-0000-1000-8000-00805f9b34fb`.
const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Expand a 16-bit SIG assigned number over the Bluetooth base UUID.
pub const fn short_uuid(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

pub const BATTERY_SERVICE: Uuid = short_uuid(0x180F);
pub const BATTERY_LEVEL: Uuid = short_uuid(0x2A19);

pub const DEVICE_INFORMATION_SERVICE: Uuid = short_uuid(0x180A);
pub const MANUFACTURER_NAME: Uuid = short_uuid(0x2A29);
pub const MODEL_NUMBER: Uuid = short_uuid(0x2A24);
pub const SERIAL_NUMBER: Uuid = short_uuid(0x2A25);
pub const HARDWARE_REVISION: Uuid = short_uuid(0x2A27);
pub const FIRMWARE_REVISION: Uuid = short_uuid(0x2A26);
pub const SYSTEM_ID: Uuid = short_uuid(0x2A23);

pub const GENERIC_ACCESS_SERVICE: Uuid = short_uuid(0x1800);
pub const DEVICE_NAME: Uuid = short_uuid(0x2A00);
pub const APPEARANCE: Uuid = short_uuid(0x2A01);
pub const PREFERRED_CONNECTION_PARAMETERS: Uuid = short_uuid(0x2A04);

/// Client Characteristic Configuration descriptor.
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid = short_uuid(0x2902);

/// Value written to the configuration descriptor to enable notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

pub const NORDIC_UART_SERVICE: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
pub const NORDIC_UART_TX: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
pub const NORDIC_UART_RX: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Upper bound for a single link operation.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a request waits for its notification reply.
pub const NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors raised by the protocol client.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GattError {
    #[error("service {0} not found")]
    ServiceNotFound(Uuid),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error(transparent)]
    Link(#[from] LinkError),
}

impl GattError {
    /// Whether the peripheral plainly does not offer what was asked for, as
    /// opposed to a failure that might not repeat.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            GattError::ServiceNotFound(_)
                | GattError::CharacteristicNotFound(_)
                | GattError::MalformedResponse(_)
        )
    }
}
