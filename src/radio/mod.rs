//! Radio abstraction: LE discovery and GATT links.
//!
//! The scheduler and the GATT client only talk to the [`Radio`] and
//! [`GattLink`] traits, so they can be driven by deterministic fakes in
//! tests. The BlueZ implementation lives in [`bluer`] behind the `bluer`
//! feature.

#[cfg(feature = "bluer")]
pub mod bluer;

use crate::address::{AddressType, MacAddress};
use futures::future::BoxFuture;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// A device seen during one scan. Not retained between cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDevice {
    pub address: MacAddress,
    pub address_type: AddressType,
    /// Advertised local name, if any
    pub name: Option<String>,
}

impl DiscoveredDevice {
    /// Advertised name, falling back to the address text.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.address.to_string(),
        }
    }
}

/// Errors raised by the scan primitive. The scheduler treats all of them as
/// "no devices found this cycle".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    /// Adapter missing, powered off or refusing management commands
    #[error("Bluetooth management error: {0}")]
    Management(String),
    /// Link to the adapter or daemon dropped mid-scan
    #[error("Bluetooth disconnected: {0}")]
    Disconnected(String),
    #[error("Bluetooth error: {0}")]
    Runtime(String),
}

/// Errors raised by a GATT link or while establishing one.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("peripheral disconnected: {0}")]
    Disconnected(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("no attribute with handle {0:#06x}")]
    UnknownHandle(u16),
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

impl LinkError {
    /// Disconnect-class errors are the ones a connect retry with the other
    /// address type can recover from.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, LinkError::Disconnected(_) | LinkError::Timeout(_))
    }
}

/// How a write is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Write request, acknowledged by the peripheral
    WithResponse,
    /// Write command, fire-and-forget
    WithoutResponse,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub handle: u16,
}

/// Characteristic properties relevant to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    /// Value handle; reads, writes and notifications refer to it
    pub handle: u16,
    pub properties: CharacteristicProperties,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorInfo {
    pub uuid: Uuid,
    pub handle: u16,
}

/// A notification payload received on a value handle.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub handle: u16,
    pub data: Vec<u8>,
}

/// An open connection to a peripheral.
pub trait GattLink: Send + 'static {
    fn services(&mut self) -> BoxFuture<'_, Result<Vec<ServiceInfo>, LinkError>>;

    fn characteristics<'a>(
        &'a mut self,
        service: &'a ServiceInfo,
    ) -> BoxFuture<'a, Result<Vec<CharacteristicInfo>, LinkError>>;

    fn descriptors<'a>(
        &'a mut self,
        characteristic: &'a CharacteristicInfo,
    ) -> BoxFuture<'a, Result<Vec<DescriptorInfo>, LinkError>>;

    fn read(&mut self, handle: u16) -> BoxFuture<'_, Result<Vec<u8>, LinkError>>;

    fn write<'a>(
        &'a mut self,
        handle: u16,
        data: &'a [u8],
        mode: WriteMode,
    ) -> BoxFuture<'a, Result<(), LinkError>>;

    /// Wait up to `timeout` for the next notification.
    fn next_notification(
        &mut self,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Option<Notification>, LinkError>>;

    fn disconnect(&mut self) -> BoxFuture<'_, Result<(), LinkError>>;
}

/// Radio abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Radio: Send + Sync {
    type Link: GattLink;

    /// Run one discovery window and return the devices seen in it.
    fn scan(&self) -> BoxFuture<'_, Result<Vec<DiscoveredDevice>, ScanError>>;

    /// Make a single transport-level connection attempt.
    fn connect(
        &self,
        address: MacAddress,
        address_type: AddressType,
    ) -> BoxFuture<'_, Result<Self::Link, LinkError>>;
}
