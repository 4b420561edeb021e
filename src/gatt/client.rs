//! GATT protocol client over an open link.
//!
//! A client lives exactly as long as one connection:
//! connected → service resolved → characteristic resolved → (notifications
//! enabled) → value read → closed. [`GattClient::close`] must be called on
//! every exit path; [`GattClient::run`] does that for callers.

use super::notification::NotificationBuffer;
use super::{
    CLIENT_CHARACTERISTIC_CONFIGURATION, ENABLE_NOTIFICATION_VALUE, GattError,
    NOTIFICATION_TIMEOUT, OPERATION_TIMEOUT,
};
use crate::radio::{CharacteristicInfo, GattLink, LinkError, ServiceInfo, WriteMode};
use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

pub struct GattClient<L: GattLink> {
    link: L,
    notifications: NotificationBuffer,
}

/// Bound a link operation by [`OPERATION_TIMEOUT`].
async fn bounded<T>(
    op: &'static str,
    fut: impl Future<Output = Result<T, LinkError>>,
) -> Result<T, GattError> {
    match tokio::time::timeout(OPERATION_TIMEOUT, fut).await {
        Ok(result) => result.map_err(GattError::from),
        Err(_) => Err(GattError::Timeout(op)),
    }
}

fn expect_len(bytes: &[u8], len: usize) -> Result<(), GattError> {
    if bytes.len() == len {
        Ok(())
    } else {
        Err(GattError::MalformedResponse(format!(
            "expected {len} byte(s), got {}",
            bytes.len()
        )))
    }
}

impl<L: GattLink> GattClient<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            notifications: NotificationBuffer::new(),
        }
    }

    pub fn notifications(&self) -> &NotificationBuffer {
        &self.notifications
    }

    /// Resolve a service by UUID.
    pub async fn service(&mut self, uuid: Uuid) -> Result<ServiceInfo, GattError> {
        let services = bounded("service discovery", self.link.services()).await?;
        services
            .into_iter()
            .find(|s| s.uuid == uuid)
            .ok_or(GattError::ServiceNotFound(uuid))
    }

    /// Resolve a characteristic of `service` by UUID.
    pub async fn characteristic(
        &mut self,
        service: &ServiceInfo,
        uuid: Uuid,
    ) -> Result<CharacteristicInfo, GattError> {
        let characteristics =
            bounded("characteristic discovery", self.link.characteristics(service)).await?;
        characteristics
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(GattError::CharacteristicNotFound(uuid))
    }

    pub async fn read_raw(&mut self, characteristic: &CharacteristicInfo) -> Result<Vec<u8>, GattError> {
        bounded("read", self.link.read(characteristic.handle)).await
    }

    /// Read exactly one unsigned byte.
    pub async fn read_byte(&mut self, characteristic: &CharacteristicInfo) -> Result<u8, GattError> {
        let bytes = self.read_raw(characteristic).await?;
        expect_len(&bytes, 1)?;
        Ok(bytes[0])
    }

    /// Read exactly two bytes as a little-endian integer.
    pub async fn read_u16(&mut self, characteristic: &CharacteristicInfo) -> Result<u16, GattError> {
        let bytes = self.read_raw(characteristic).await?;
        expect_len(&bytes, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub async fn read_string(&mut self, characteristic: &CharacteristicInfo) -> Result<String, GattError> {
        let bytes = self.read_raw(characteristic).await?;
        String::from_utf8(bytes).map_err(|e| GattError::MalformedResponse(e.to_string()))
    }

    /// Read the raw value rendered as lowercase hex.
    pub async fn read_hex(&mut self, characteristic: &CharacteristicInfo) -> Result<String, GattError> {
        let bytes = self.read_raw(characteristic).await?;
        Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub async fn write(
        &mut self,
        characteristic: &CharacteristicInfo,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), GattError> {
        bounded("write", self.link.write(characteristic.handle, data, mode)).await
    }

    /// Enable notifications for `characteristic`.
    ///
    /// Writes to the configuration descriptor when the peripheral exposes
    /// one, otherwise to the handle right after the value handle, where the
    /// descriptor conventionally lives.
    pub async fn enable_notify(&mut self, characteristic: &CharacteristicInfo) -> Result<(), GattError> {
        let descriptors = bounded("descriptor discovery", self.link.descriptors(characteristic)).await?;

        let handle = match descriptors
            .iter()
            .find(|d| d.uuid == CLIENT_CHARACTERISTIC_CONFIGURATION)
        {
            Some(descriptor) => descriptor.handle,
            None => characteristic
                .handle
                .checked_add(1)
                .ok_or(GattError::CharacteristicNotFound(CLIENT_CHARACTERISTIC_CONFIGURATION))?,
        };

        bounded(
            "enable notifications",
            self.link
                .write(handle, &ENABLE_NOTIFICATION_VALUE, WriteMode::WithResponse),
        )
        .await
    }

    /// Wait up to `timeout` for notifications and buffer everything that
    /// arrived. Returns `true` if at least one notification was received.
    pub async fn wait_for_notifications(&mut self, timeout: Duration) -> Result<bool, GattError> {
        let Some(first) = self.link.next_notification(timeout).await? else {
            return Ok(false);
        };
        self.notifications.on_notification(first.handle, &first.data);

        // Drain whatever else is already queued without waiting again.
        while let Some(next) = self.link.next_notification(Duration::ZERO).await? {
            self.notifications.on_notification(next.handle, &next.data);
        }
        Ok(true)
    }

    /// Write `payload` to `tx` and wait for a notification reply on `rx`.
    ///
    /// The write goes without response when `tx` allows it. When
    /// `expect_reply` is set and a reply arrived, the accumulated payload for
    /// `rx` is returned and all buffers are cleared. Returns `None` when
    /// nothing arrived within [`NOTIFICATION_TIMEOUT`].
    pub async fn request(
        &mut self,
        tx: &CharacteristicInfo,
        rx: &CharacteristicInfo,
        payload: &[u8],
        expect_reply: bool,
    ) -> Result<Option<Vec<u8>>, GattError> {
        let mode = if tx.properties.write_without_response {
            WriteMode::WithoutResponse
        } else {
            WriteMode::WithResponse
        };
        self.write(tx, payload, mode).await?;
        self.wait_for_notifications(NOTIFICATION_TIMEOUT).await?;

        if !expect_reply {
            return Ok(None);
        }

        match self.notifications.take(rx.handle) {
            Some(reply) if !reply.is_empty() => {
                self.notifications.clear();
                Ok(Some(reply))
            }
            _ => Ok(None),
        }
    }

    /// Disconnect, logging failures.
    pub async fn close(mut self) {
        if let Err(error) = bounded("disconnect", self.link.disconnect()).await {
            tracing::warn!(%error, "failed to disconnect peripheral");
        }
    }

    /// Run `op` against this client and close the connection afterwards,
    /// whatever the outcome.
    pub async fn run<T>(
        mut self,
        op: impl for<'c> FnOnce(&'c mut GattClient<L>) -> BoxFuture<'c, Result<T, GattError>>,
    ) -> Result<T, GattError> {
        let result = op(&mut self).await;
        self.close().await;
        result
    }
}
