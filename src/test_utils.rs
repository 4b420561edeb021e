use crate::address::{AddressType, MacAddress};
use crate::gatt::{BATTERY_LEVEL, BATTERY_SERVICE};
use crate::presence::{PresenceReport, PresenceSink};
use crate::radio::{
    CharacteristicInfo, CharacteristicProperties, DescriptorInfo, DiscoveredDevice, GattLink,
    LinkError, Notification, Radio, ScanError, ServiceInfo, WriteMode,
};
use futures::FutureExt;
use futures::future::{BoxFuture, pending, ready};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// `secs` seconds after the Unix epoch.
pub fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

/// A device seen with a public address.
pub fn seen(address: MacAddress, name: Option<&str>) -> DiscoveredDevice {
    DiscoveredDevice {
        address,
        address_type: AddressType::Public,
        name: name.map(String::from),
    }
}

#[derive(Default)]
struct PeripheralState {
    services: Vec<ServiceInfo>,
    characteristics: Vec<(u16, CharacteristicInfo)>,
    descriptors: Vec<(u16, DescriptorInfo)>,
    values: HashMap<u16, Vec<u8>>,
    replies: VecDeque<Notification>,
    read_error: Option<LinkError>,
    read_hang: bool,
    accepts: Option<AddressType>,
    writes: Vec<(u16, Vec<u8>, WriteMode)>,
    disconnects: usize,
}

/// Scripted GATT peripheral.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the radio hands links to the code under test.
#[derive(Clone, Default)]
pub struct FakePeripheral {
    state: Arc<Mutex<PeripheralState>>,
}

impl FakePeripheral {
    pub fn new() -> Self {
        Self::default()
    }

    /// A peripheral exposing only the Battery Level characteristic.
    pub fn battery(level: u8) -> Self {
        Self::new()
            .service(BATTERY_SERVICE, 0x0010)
            .characteristic(0x0010, BATTERY_LEVEL, 0x0012, vec![level])
    }

    pub fn service(self, uuid: Uuid, handle: u16) -> Self {
        self.state.lock().unwrap().services.push(ServiceInfo { uuid, handle });
        self
    }

    /// Readable and writable characteristic in the service at `service`.
    pub fn characteristic(self, service: u16, uuid: Uuid, handle: u16, value: Vec<u8>) -> Self {
        let properties = CharacteristicProperties {
            read: true,
            write: true,
            write_without_response: true,
            notify: false,
        };
        {
            let mut state = self.state.lock().unwrap();
            state
                .characteristics
                .push((service, CharacteristicInfo { uuid, handle, properties }));
            state.values.insert(handle, value);
        }
        self
    }

    /// Characteristic that only accepts writes with response.
    pub fn write_characteristic(self, service: u16, uuid: Uuid, handle: u16) -> Self {
        let properties = CharacteristicProperties {
            write: true,
            ..CharacteristicProperties::default()
        };
        self.state
            .lock()
            .unwrap()
            .characteristics
            .push((service, CharacteristicInfo { uuid, handle, properties }));
        self
    }

    pub fn notify_characteristic(self, service: u16, uuid: Uuid, handle: u16) -> Self {
        let properties = CharacteristicProperties {
            notify: true,
            ..CharacteristicProperties::default()
        };
        self.state
            .lock()
            .unwrap()
            .characteristics
            .push((service, CharacteristicInfo { uuid, handle, properties }));
        self
    }

    pub fn descriptor(self, characteristic: u16, uuid: Uuid, handle: u16) -> Self {
        self.state
            .lock()
            .unwrap()
            .descriptors
            .push((characteristic, DescriptorInfo { uuid, handle }));
        self
    }

    /// Notifications delivered, in order, to `next_notification`.
    pub fn reply_with(self, notifications: Vec<Notification>) -> Self {
        self.state.lock().unwrap().replies.extend(notifications);
        self
    }

    pub fn fail_reads(self, error: LinkError) -> Self {
        self.state.lock().unwrap().read_error = Some(error);
        self
    }

    /// Reads never complete.
    pub fn hang_reads(self) -> Self {
        self.state.lock().unwrap().read_hang = true;
        self
    }

    /// Only accept connections using `address_type`.
    pub fn accepts(self, address_type: AddressType) -> Self {
        self.state.lock().unwrap().accepts = Some(address_type);
        self
    }

    pub fn link(&self) -> FakeLink {
        FakeLink {
            state: Arc::clone(&self.state),
        }
    }

    pub fn writes(&self) -> Vec<(u16, Vec<u8>, WriteMode)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }

    fn accepts_type(&self, address_type: AddressType) -> bool {
        self.state
            .lock()
            .unwrap()
            .accepts
            .is_none_or(|accepted| accepted == address_type)
    }
}

pub struct FakeLink {
    state: Arc<Mutex<PeripheralState>>,
}

impl GattLink for FakeLink {
    fn services(&mut self) -> BoxFuture<'_, Result<Vec<ServiceInfo>, LinkError>> {
        let services = self.state.lock().unwrap().services.clone();
        ready(Ok(services)).boxed()
    }

    fn characteristics<'a>(
        &'a mut self,
        service: &'a ServiceInfo,
    ) -> BoxFuture<'a, Result<Vec<CharacteristicInfo>, LinkError>> {
        let characteristics = self
            .state
            .lock()
            .unwrap()
            .characteristics
            .iter()
            .filter(|(owner, _)| *owner == service.handle)
            .map(|(_, c)| c.clone())
            .collect();
        ready(Ok(characteristics)).boxed()
    }

    fn descriptors<'a>(
        &'a mut self,
        characteristic: &'a CharacteristicInfo,
    ) -> BoxFuture<'a, Result<Vec<DescriptorInfo>, LinkError>> {
        let descriptors = self
            .state
            .lock()
            .unwrap()
            .descriptors
            .iter()
            .filter(|(owner, _)| *owner == characteristic.handle)
            .map(|(_, d)| d.clone())
            .collect();
        ready(Ok(descriptors)).boxed()
    }

    fn read(&mut self, handle: u16) -> BoxFuture<'_, Result<Vec<u8>, LinkError>> {
        let state = self.state.lock().unwrap();
        if state.read_hang {
            return pending().boxed();
        }
        let result = match &state.read_error {
            Some(error) => Err(error.clone()),
            None => state
                .values
                .get(&handle)
                .cloned()
                .ok_or(LinkError::UnknownHandle(handle)),
        };
        ready(result).boxed()
    }

    fn write<'a>(
        &'a mut self,
        handle: u16,
        data: &'a [u8],
        mode: WriteMode,
    ) -> BoxFuture<'a, Result<(), LinkError>> {
        self.state
            .lock()
            .unwrap()
            .writes
            .push((handle, data.to_vec(), mode));
        ready(Ok(())).boxed()
    }

    /// Queued replies are delivered at once; an empty queue waits out
    /// `timeout`.
    fn next_notification(
        &mut self,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Option<Notification>, LinkError>> {
        match self.state.lock().unwrap().replies.pop_front() {
            Some(next) => ready(Ok(Some(next))).boxed(),
            None => async move {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
            .boxed(),
        }
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<(), LinkError>> {
        self.state.lock().unwrap().disconnects += 1;
        ready(Ok(())).boxed()
    }
}

#[derive(Default)]
struct RadioState {
    scans: VecDeque<Result<Vec<DiscoveredDevice>, ScanError>>,
    repeat: Vec<DiscoveredDevice>,
    scan_count: usize,
    connect_error: Option<LinkError>,
    connect_attempts: Vec<(MacAddress, AddressType)>,
}

/// Scripted radio.
///
/// Scans return the queued results first, then the repeating device list.
/// Connecting to an address without a registered peripheral fails with a
/// disconnect-class error.
#[derive(Default)]
pub struct FakeRadio {
    peripherals: HashMap<MacAddress, FakePeripheral>,
    state: Mutex<RadioState>,
}

impl FakeRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peripheral(mut self, address: MacAddress, peripheral: FakePeripheral) -> Self {
        self.peripherals.insert(address, peripheral);
        self
    }

    /// Fail every connection attempt with `error`.
    pub fn connect_error(self, error: LinkError) -> Self {
        self.state.lock().unwrap().connect_error = Some(error);
        self
    }

    /// Queue the result of one scan.
    pub fn scan_result(self, result: Result<Vec<DiscoveredDevice>, ScanError>) -> Self {
        self.state.lock().unwrap().scans.push_back(result);
        self
    }

    /// Devices returned by every scan once the queue is drained.
    pub fn repeat_scan(self, devices: Vec<DiscoveredDevice>) -> Self {
        self.state.lock().unwrap().repeat = devices;
        self
    }

    pub fn scan_count(&self) -> usize {
        self.state.lock().unwrap().scan_count
    }

    pub fn connect_attempts(&self) -> Vec<(MacAddress, AddressType)> {
        self.state.lock().unwrap().connect_attempts.clone()
    }
}

impl Radio for FakeRadio {
    type Link = FakeLink;

    fn scan(&self) -> BoxFuture<'_, Result<Vec<DiscoveredDevice>, ScanError>> {
        let mut state = self.state.lock().unwrap();
        state.scan_count += 1;
        let result = match state.scans.pop_front() {
            Some(result) => result,
            None => Ok(state.repeat.clone()),
        };
        ready(result).boxed()
    }

    fn connect(
        &self,
        address: MacAddress,
        address_type: AddressType,
    ) -> BoxFuture<'_, Result<Self::Link, LinkError>> {
        let mut state = self.state.lock().unwrap();
        state.connect_attempts.push((address, address_type));

        let result = if let Some(error) = &state.connect_error {
            Err(error.clone())
        } else {
            match self.peripherals.get(&address) {
                Some(peripheral) if peripheral.accepts_type(address_type) => Ok(peripheral.link()),
                _ => Err(LinkError::Disconnected(format!(
                    "{address} did not answer as {address_type}"
                ))),
            }
        };
        ready(result).boxed()
    }
}

/// Sink that keeps every report in memory.
#[derive(Default)]
pub struct RecordingSink {
    reports: Vec<PresenceReport>,
    count: Arc<AtomicUsize>,
}

impl RecordingSink {
    pub fn reports(&self) -> &[PresenceReport] {
        &self.reports
    }

    /// Shared count of received reports, readable while the sink is owned
    /// by a running scheduler.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.count)
    }
}

impl PresenceSink for RecordingSink {
    fn report(&mut self, report: PresenceReport) {
        self.reports.push(report);
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
