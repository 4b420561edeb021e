//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.
//!
//! Attribute handles exposed through [`GattLink`] are the BlueZ object ids
//! of the resolved services, characteristics and descriptors. BlueZ owns the
//! Client Characteristic Configuration descriptors, so enabling notifications
//! by writing `01 00` to one is translated into a notify session on the
//! owning characteristic.

use super::{
    CharacteristicInfo, CharacteristicProperties, DescriptorInfo, DiscoveredDevice, GattLink,
    LinkError, Notification, Radio, ScanError, ServiceInfo, WriteMode,
};
use crate::address::{AddressType, MacAddress};
use crate::gatt::{CLIENT_CHARACTERISTIC_CONFIGURATION, ENABLE_NOTIFICATION_VALUE};
use bluer::gatt::WriteOp;
use bluer::gatt::remote::{Characteristic, CharacteristicWriteRequest, Descriptor, Service};
use bluer::{
    Adapter, AdapterEvent, Address, Device, DiscoveryFilter, DiscoveryTransport, ErrorKind,
    InternalErrorKind, Session,
};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt, pin_mut};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Upper bound for the Connect call, and separately for service resolution.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default length of one discovery window.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(10);

/// Channel buffer size for forwarded notifications.
const NOTIFICATION_CHANNEL_BUFFER_SIZE: usize = 64;

const SERVICES_RESOLVED_POLL: Duration = Duration::from_millis(100);

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        match &err.kind {
            ErrorKind::NotReady
            | ErrorKind::NotAvailable
            | ErrorKind::NotSupported
            | ErrorKind::NotPermitted
            | ErrorKind::NotAuthorized
            | ErrorKind::InProgress => ScanError::Management(err.to_string()),
            ErrorKind::Internal(InternalErrorKind::DBusConnectionLost) => {
                ScanError::Disconnected(err.to_string())
            }
            _ => ScanError::Runtime(err.to_string()),
        }
    }
}

impl From<bluer::Error> for LinkError {
    fn from(err: bluer::Error) -> Self {
        match &err.kind {
            ErrorKind::ConnectionAttemptFailed
            | ErrorKind::Failed
            | ErrorKind::Internal(InternalErrorKind::DBusConnectionLost) => {
                LinkError::Disconnected(err.to_string())
            }
            _ => LinkError::Bluetooth(err.to_string()),
        }
    }
}

/// Default adapter of the BlueZ daemon.
pub struct BluerRadio {
    _session: Session,
    adapter: Adapter,
    scan_duration: Duration,
}

impl BluerRadio {
    /// Open a session to `bluetoothd` and power on the default adapter.
    pub async fn new(scan_duration: Duration) -> Result<Self, ScanError> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        tracing::info!(adapter = adapter.name(), "using Bluetooth adapter");

        Ok(Self {
            _session: session,
            adapter,
            scan_duration,
        })
    }

    /// Read the properties of a device reported during the discovery
    /// window. Cached devices that did not advertise have no RSSI.
    async fn sighting(&self, address: Address) -> bluer::Result<Option<DiscoveredDevice>> {
        let device = self.adapter.device(address)?;
        if device.rssi().await?.is_none() {
            return Ok(None);
        }
        Ok(Some(DiscoveredDevice {
            address: address.into(),
            address_type: device.address_type().await?.into(),
            name: device.name().await?,
        }))
    }

    async fn discover(&self) -> Result<Vec<DiscoveredDevice>, ScanError> {
        self.adapter
            .set_discovery_filter(DiscoveryFilter {
                transport: DiscoveryTransport::Le,
                duplicate_data: false,
                ..Default::default()
            })
            .await?;

        // Discovery stops when the event stream is dropped, and BlueZ then
        // invalidates RSSI, so properties are read while it is still running.
        let events = self.adapter.discover_devices_with_changes().await?;
        pin_mut!(events);
        let window = tokio::time::sleep(self.scan_duration);
        pin_mut!(window);

        let mut devices = Vec::new();
        loop {
            tokio::select! {
                _ = &mut window => break,
                event = events.next() => match event {
                    Some(AdapterEvent::DeviceAdded(address)) => match self.sighting(address).await {
                        Ok(Some(device)) => merge_sighting(&mut devices, device),
                        Ok(None) => {}
                        Err(error) => {
                            tracing::debug!(%address, %error, "skipping device");
                        }
                    },
                    Some(_) => {}
                    None => break,
                },
            }
        }
        Ok(devices)
    }

    async fn open(&self, address: MacAddress, address_type: AddressType) -> Result<Device, LinkError> {
        let address: Address = address.into();

        let device = or_cleanup(
            CONNECT_TIMEOUT,
            self.connect_device(address, address_type),
            // A Connect that outlived the deadline may still complete
            || self.abandon(address),
        )
        .await?;

        or_cleanup(
            CONNECT_TIMEOUT,
            wait_for_services(&device),
            || disconnect_quietly(&device),
        )
        .await?;
        Ok(device)
    }

    async fn connect_device(&self, address: Address, address_type: AddressType) -> Result<Device, LinkError> {
        match self
            .adapter
            .connect_device(address, address_type.into())
            .await
        {
            Ok(device) => Ok(device),
            Err(err) if matches!(err.kind, ErrorKind::AlreadyExists) => {
                let device = self.adapter.device(address)?;
                device.connect().await?;
                Ok(device)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn abandon(&self, address: Address) {
        if let Ok(device) = self.adapter.device(address) {
            disconnect_quietly(&device).await;
        }
    }
}

/// Add a sighting, replacing an earlier one for the same address. A name
/// seen earlier in the window is kept when the newer sighting has none.
fn merge_sighting(devices: &mut Vec<DiscoveredDevice>, mut device: DiscoveredDevice) {
    match devices.iter_mut().find(|d| d.address == device.address) {
        Some(existing) => {
            if device.name.is_none() {
                device.name = existing.name.take();
            }
            *existing = device;
        }
        None => devices.push(device),
    }
}

/// Await `step` for at most `limit`. On error or timeout `cleanup` runs
/// before the error is returned.
async fn or_cleanup<T, C>(
    limit: Duration,
    step: impl Future<Output = Result<T, LinkError>>,
    cleanup: impl FnOnce() -> C,
) -> Result<T, LinkError>
where
    C: Future<Output = ()>,
{
    let result = match tokio::time::timeout(limit, step).await {
        Ok(result) => result,
        Err(_) => Err(LinkError::Timeout(limit)),
    };
    if result.is_err() {
        cleanup().await;
    }
    result
}

async fn wait_for_services(device: &Device) -> Result<(), LinkError> {
    while !device.is_services_resolved().await? {
        if !device.is_connected().await? {
            return Err(LinkError::Disconnected(format!(
                "{} disconnected before services resolved",
                device.address()
            )));
        }
        tokio::time::sleep(SERVICES_RESOLVED_POLL).await;
    }
    Ok(())
}

async fn disconnect_quietly(device: &Device) {
    if let Err(error) = device.disconnect().await {
        tracing::debug!(address = %device.address(), %error, "disconnect after failed connect");
    }
}

impl Radio for BluerRadio {
    type Link = BluerLink;

    fn scan(&self) -> BoxFuture<'_, Result<Vec<DiscoveredDevice>, ScanError>> {
        self.discover().boxed()
    }

    fn connect(
        &self,
        address: MacAddress,
        address_type: AddressType,
    ) -> BoxFuture<'_, Result<Self::Link, LinkError>> {
        async move {
            let device = self.open(address, address_type).await?;
            Ok(BluerLink::new(device))
        }
        .boxed()
    }
}

/// Connected BlueZ device.
pub struct BluerLink {
    device: Device,
    services: HashMap<u16, Service>,
    characteristics: HashMap<u16, Characteristic>,
    /// Descriptor by id, with the id of the owning characteristic
    descriptors: HashMap<u16, (u16, Uuid, Descriptor)>,
    tx: mpsc::Sender<Notification>,
    rx: mpsc::Receiver<Notification>,
    subscriptions: Vec<JoinHandle<()>>,
}

impl BluerLink {
    fn new(device: Device) -> Self {
        let (tx, rx) = mpsc::channel(NOTIFICATION_CHANNEL_BUFFER_SIZE);
        Self {
            device,
            services: HashMap::new(),
            characteristics: HashMap::new(),
            descriptors: HashMap::new(),
            tx,
            rx,
            subscriptions: Vec::new(),
        }
    }

    /// Characteristic whose notifications a CCCD write at `handle` enables.
    fn notify_target(&self, handle: u16) -> Option<(u16, Characteristic)> {
        if let Some((owner, uuid, _)) = self.descriptors.get(&handle)
            && *uuid == CLIENT_CHARACTERISTIC_CONFIGURATION
        {
            return self.characteristics.get(owner).map(|c| (*owner, c.clone()));
        }
        let owner = handle.checked_sub(1)?;
        self.characteristics.get(&owner).map(|c| (owner, c.clone()))
    }

    async fn subscribe(&mut self, handle: u16, characteristic: Characteristic) -> Result<(), LinkError> {
        let stream = characteristic.notify().await?;
        let tx = self.tx.clone();
        self.subscriptions.push(tokio::spawn(async move {
            pin_mut!(stream);
            while let Some(data) = stream.next().await {
                if tx.send(Notification { handle, data }).await.is_err() {
                    break;
                }
            }
        }));
        tracing::debug!(handle, "notifications enabled");
        Ok(())
    }

    async fn write_value(&mut self, handle: u16, data: &[u8], mode: WriteMode) -> Result<(), LinkError> {
        if let Some(characteristic) = self.characteristics.get(&handle) {
            let request = CharacteristicWriteRequest {
                op_type: match mode {
                    WriteMode::WithResponse => WriteOp::Request,
                    WriteMode::WithoutResponse => WriteOp::Command,
                },
                ..Default::default()
            };
            characteristic.write_ext(data, &request).await?;
            return Ok(());
        }

        if data == ENABLE_NOTIFICATION_VALUE
            && let Some((owner, characteristic)) = self.notify_target(handle)
        {
            return self.subscribe(owner, characteristic).await;
        }

        match self.descriptors.get(&handle) {
            Some((_, _, descriptor)) => Ok(descriptor.write(data).await?),
            None => Err(LinkError::UnknownHandle(handle)),
        }
    }
}

impl GattLink for BluerLink {
    fn services(&mut self) -> BoxFuture<'_, Result<Vec<ServiceInfo>, LinkError>> {
        async move {
            let mut services = Vec::new();
            for service in self.device.services().await? {
                let handle = service.id();
                services.push(ServiceInfo {
                    uuid: service.uuid().await?,
                    handle,
                });
                self.services.insert(handle, service);
            }
            Ok(services)
        }
        .boxed()
    }

    fn characteristics<'a>(
        &'a mut self,
        service: &'a ServiceInfo,
    ) -> BoxFuture<'a, Result<Vec<CharacteristicInfo>, LinkError>> {
        async move {
            let remote = self
                .services
                .get(&service.handle)
                .ok_or(LinkError::UnknownHandle(service.handle))?;

            let mut characteristics = Vec::new();
            for characteristic in remote.characteristics().await? {
                let handle = characteristic.id();
                let flags = characteristic.flags().await?;
                characteristics.push(CharacteristicInfo {
                    uuid: characteristic.uuid().await?,
                    handle,
                    properties: CharacteristicProperties {
                        read: flags.read,
                        write: flags.write,
                        write_without_response: flags.write_without_response,
                        notify: flags.notify || flags.indicate,
                    },
                });
                self.characteristics.insert(handle, characteristic);
            }
            Ok(characteristics)
        }
        .boxed()
    }

    fn descriptors<'a>(
        &'a mut self,
        characteristic: &'a CharacteristicInfo,
    ) -> BoxFuture<'a, Result<Vec<DescriptorInfo>, LinkError>> {
        async move {
            let remote = self
                .characteristics
                .get(&characteristic.handle)
                .ok_or(LinkError::UnknownHandle(characteristic.handle))?;

            let mut descriptors = Vec::new();
            for descriptor in remote.descriptors().await? {
                let handle = descriptor.id();
                let uuid = descriptor.uuid().await?;
                descriptors.push(DescriptorInfo { uuid, handle });
                self.descriptors
                    .insert(handle, (characteristic.handle, uuid, descriptor));
            }
            Ok(descriptors)
        }
        .boxed()
    }

    fn read(&mut self, handle: u16) -> BoxFuture<'_, Result<Vec<u8>, LinkError>> {
        async move {
            if let Some(characteristic) = self.characteristics.get(&handle) {
                return Ok(characteristic.read().await?);
            }
            match self.descriptors.get(&handle) {
                Some((_, _, descriptor)) => Ok(descriptor.read().await?),
                None => Err(LinkError::UnknownHandle(handle)),
            }
        }
        .boxed()
    }

    fn write<'a>(
        &'a mut self,
        handle: u16,
        data: &'a [u8],
        mode: WriteMode,
    ) -> BoxFuture<'a, Result<(), LinkError>> {
        self.write_value(handle, data, mode).boxed()
    }

    fn next_notification(
        &mut self,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Option<Notification>, LinkError>> {
        async move {
            match tokio::time::timeout(timeout, self.rx.recv()).await {
                Ok(notification) => Ok(notification),
                Err(_) => Ok(None),
            }
        }
        .boxed()
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<(), LinkError>> {
        async move {
            for subscription in self.subscriptions.drain(..) {
                subscription.abort();
            }
            self.device.disconnect().await?;
            Ok(())
        }
        .boxed()
    }
}

impl Drop for BluerLink {
    fn drop(&mut self) {
        for subscription in &self.subscriptions {
            subscription.abort();
        }
    }
}
