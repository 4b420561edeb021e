//! Accessory drivers for standard and common vendor GATT services.
//!
//! Each driver resolves its service when opened. Drivers that can be
//! summarized declare a static table of `(label, field)` pairs; the summary
//! walks that table instead of discovering accessors at runtime.

use super::client::GattClient;
use super::{
    APPEARANCE, BATTERY_LEVEL, BATTERY_SERVICE, DEVICE_INFORMATION_SERVICE, DEVICE_NAME,
    FIRMWARE_REVISION, GENERIC_ACCESS_SERVICE, GattError, HARDWARE_REVISION, MANUFACTURER_NAME,
    MODEL_NUMBER, NORDIC_UART_RX, NORDIC_UART_SERVICE, NORDIC_UART_TX,
    PREFERRED_CONNECTION_PARAMETERS, SERIAL_NUMBER, SYSTEM_ID,
};
use crate::radio::{CharacteristicInfo, GattLink, ServiceInfo};
use uuid::Uuid;

/// Render a driver summary: the driver name followed by one
/// `[+] Label: value` line per field.
pub fn render_summary(name: &str, fields: &[(&str, String)]) -> String {
    let mut lines = vec![name.to_string()];
    lines.extend(
        fields
            .iter()
            .map(|(label, value)| format!("[+] {label}: {value}")),
    );
    lines.join("\n")
}

/// Battery Service (`0x180F`).
pub struct BatteryService<'c, L: GattLink> {
    client: &'c mut GattClient<L>,
    service: ServiceInfo,
}

impl<'c, L: GattLink> BatteryService<'c, L> {
    pub const NAME: &'static str = "Battery Service";

    pub async fn open(client: &'c mut GattClient<L>) -> Result<Self, GattError> {
        let service = client.service(BATTERY_SERVICE).await?;
        Ok(Self { client, service })
    }

    /// Battery level in percent.
    pub async fn level(&mut self) -> Result<u8, GattError> {
        let characteristic = self.client.characteristic(&self.service, BATTERY_LEVEL).await?;
        self.client.read_byte(&characteristic).await
    }

    pub async fn summary(&mut self) -> Result<String, GattError> {
        let level = self.level().await?;
        Ok(render_summary(Self::NAME, &[("Battery Level", level.to_string())]))
    }
}

/// Readable fields of the Device Information service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceInformationField {
    ManufacturerName,
    ModelNumber,
    SerialNumber,
    HardwareRevision,
    FirmwareRevision,
    SystemId,
}

impl DeviceInformationField {
    fn uuid(self) -> Uuid {
        match self {
            Self::ManufacturerName => MANUFACTURER_NAME,
            Self::ModelNumber => MODEL_NUMBER,
            Self::SerialNumber => SERIAL_NUMBER,
            Self::HardwareRevision => HARDWARE_REVISION,
            Self::FirmwareRevision => FIRMWARE_REVISION,
            Self::SystemId => SYSTEM_ID,
        }
    }
}

/// Device Information service (`0x180A`).
pub struct DeviceInformation<'c, L: GattLink> {
    client: &'c mut GattClient<L>,
    service: ServiceInfo,
}

impl<'c, L: GattLink> DeviceInformation<'c, L> {
    pub const NAME: &'static str = "Device Information";

    pub const FIELDS: [(&'static str, DeviceInformationField); 6] = [
        ("Firmware Revision", DeviceInformationField::FirmwareRevision),
        ("Hardware Revision", DeviceInformationField::HardwareRevision),
        ("Manufacturer Name", DeviceInformationField::ManufacturerName),
        ("Model Number", DeviceInformationField::ModelNumber),
        ("Serial Number", DeviceInformationField::SerialNumber),
        ("System Id", DeviceInformationField::SystemId),
    ];

    pub async fn open(client: &'c mut GattClient<L>) -> Result<Self, GattError> {
        let service = client.service(DEVICE_INFORMATION_SERVICE).await?;
        Ok(Self { client, service })
    }

    async fn characteristic(&mut self, uuid: Uuid) -> Result<CharacteristicInfo, GattError> {
        self.client.characteristic(&self.service, uuid).await
    }

    /// Read one field. The system id is rendered as hex, the rest are strings.
    pub async fn read(&mut self, field: DeviceInformationField) -> Result<String, GattError> {
        let characteristic = self.characteristic(field.uuid()).await?;
        match field {
            DeviceInformationField::SystemId => self.client.read_hex(&characteristic).await,
            _ => self.client.read_string(&characteristic).await,
        }
    }

    pub async fn manufacturer_name(&mut self) -> Result<String, GattError> {
        self.read(DeviceInformationField::ManufacturerName).await
    }

    pub async fn model_number(&mut self) -> Result<String, GattError> {
        self.read(DeviceInformationField::ModelNumber).await
    }

    pub async fn serial_number(&mut self) -> Result<String, GattError> {
        self.read(DeviceInformationField::SerialNumber).await
    }

    pub async fn hardware_revision(&mut self) -> Result<String, GattError> {
        self.read(DeviceInformationField::HardwareRevision).await
    }

    pub async fn firmware_revision(&mut self) -> Result<String, GattError> {
        self.read(DeviceInformationField::FirmwareRevision).await
    }

    pub async fn system_id(&mut self) -> Result<String, GattError> {
        self.read(DeviceInformationField::SystemId).await
    }

    pub async fn summary(&mut self) -> Result<String, GattError> {
        let mut values = Vec::with_capacity(Self::FIELDS.len());
        for (label, field) in Self::FIELDS {
            values.push((label, self.read(field).await?));
        }
        Ok(render_summary(Self::NAME, &values))
    }
}

/// Readable fields of the Generic Access service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericAccessField {
    DeviceName,
    Appearance,
    PreferredConnectionParameters,
}

/// Generic Access service (`0x1800`).
pub struct GenericAccess<'c, L: GattLink> {
    client: &'c mut GattClient<L>,
    service: ServiceInfo,
}

impl<'c, L: GattLink> GenericAccess<'c, L> {
    pub const NAME: &'static str = "Generic Access";

    pub const FIELDS: [(&'static str, GenericAccessField); 3] = [
        ("Appearance", GenericAccessField::Appearance),
        ("Device Name", GenericAccessField::DeviceName),
        (
            "Peripheral Preferred Connection Parameters",
            GenericAccessField::PreferredConnectionParameters,
        ),
    ];

    pub async fn open(client: &'c mut GattClient<L>) -> Result<Self, GattError> {
        let service = client.service(GENERIC_ACCESS_SERVICE).await?;
        Ok(Self { client, service })
    }

    pub async fn device_name(&mut self) -> Result<String, GattError> {
        let characteristic = self.client.characteristic(&self.service, DEVICE_NAME).await?;
        self.client.read_string(&characteristic).await
    }

    /// Raw appearance code as assigned by the Bluetooth SIG.
    pub async fn appearance(&mut self) -> Result<u16, GattError> {
        let characteristic = self.client.characteristic(&self.service, APPEARANCE).await?;
        self.client.read_u16(&characteristic).await
    }

    pub async fn preferred_connection_parameters(&mut self) -> Result<String, GattError> {
        let characteristic = self
            .client
            .characteristic(&self.service, PREFERRED_CONNECTION_PARAMETERS)
            .await?;
        self.client.read_hex(&characteristic).await
    }

    pub async fn read(&mut self, field: GenericAccessField) -> Result<String, GattError> {
        match field {
            GenericAccessField::DeviceName => self.device_name().await,
            GenericAccessField::Appearance => self.appearance().await.map(|code| code.to_string()),
            GenericAccessField::PreferredConnectionParameters => {
                self.preferred_connection_parameters().await
            }
        }
    }

    pub async fn summary(&mut self) -> Result<String, GattError> {
        let mut values = Vec::with_capacity(Self::FIELDS.len());
        for (label, field) in Self::FIELDS {
            values.push((label, self.read(field).await?));
        }
        Ok(render_summary(Self::NAME, &values))
    }
}

/// Nordic UART service: a byte pipe with writes on TX and replies as
/// notifications on RX.
pub struct NordicUart<'c, L: GattLink> {
    client: &'c mut GattClient<L>,
    rx: CharacteristicInfo,
    tx: CharacteristicInfo,
}

impl<'c, L: GattLink> NordicUart<'c, L> {
    pub const NAME: &'static str = "Nordic UART";

    /// Resolve the service and enable notifications on RX.
    pub async fn open(client: &'c mut GattClient<L>) -> Result<Self, GattError> {
        let service = client.service(NORDIC_UART_SERVICE).await?;
        let rx = client.characteristic(&service, NORDIC_UART_RX).await?;
        let tx = client.characteristic(&service, NORDIC_UART_TX).await?;
        client.enable_notify(&rx).await?;
        Ok(Self { client, rx, tx })
    }

    /// Send a packet. With `expect_reply`, returns the reply accumulated on
    /// RX within the notification timeout.
    pub async fn send(&mut self, packet: &[u8], expect_reply: bool) -> Result<Option<Vec<u8>>, GattError> {
        self.client.request(&self.tx, &self.rx, packet, expect_reply).await
    }
}
