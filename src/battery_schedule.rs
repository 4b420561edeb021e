//! Per-device battery polling schedule.
//!
//! Battery reads require a GATT connection, which costs the accessory far
//! more power than an advertisement. Each tracked device is therefore polled
//! at most once per interval, and a device that turns out not to expose a
//! battery level is dropped from the schedule for the rest of the process
//! lifetime.

use crate::address::MacAddress;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// Default interval between battery reads of the same device.
pub const DEFAULT_BATTERY_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Tracks when each battery-polled device was last read.
///
/// Entries start at [`SystemTime::UNIX_EPOCH`] so a freshly enrolled device
/// is due on the next cycle. Removing an entry is permanent: nothing in the
/// tracker enrolls an address twice.
#[derive(Debug)]
pub struct BatterySchedule {
    /// Minimum time between reads for each device
    interval: Duration,
    /// Last read attempt for each enrolled device
    last_attempt: HashMap<MacAddress, SystemTime>,
}

impl BatterySchedule {
    /// Create an empty schedule.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use ble_tracker::battery_schedule::BatterySchedule;
    ///
    /// let schedule = BatterySchedule::new(Duration::from_secs(3600));
    /// assert!(schedule.is_empty());
    /// ```
    pub fn new(interval: Duration) -> Self {
        BatterySchedule {
            interval,
            last_attempt: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Enroll a device so its battery is read on the next cycle.
    ///
    /// Enrolling an already scheduled device keeps its current timestamp.
    pub fn enroll(&mut self, mac: MacAddress) {
        self.last_attempt.entry(mac).or_insert(SystemTime::UNIX_EPOCH);
    }

    /// Whether a battery read is due for `mac` at `now`.
    ///
    /// Devices that are not enrolled are never due.
    pub fn is_due(&self, mac: &MacAddress, now: SystemTime) -> bool {
        match self.last_attempt.get(mac) {
            Some(last) => last
                .checked_add(self.interval)
                .is_some_and(|next| now > next),
            None => false,
        }
    }

    /// Record a read attempt. Devices that were removed stay removed.
    pub fn record(&mut self, mac: &MacAddress, now: SystemTime) {
        if let Some(last) = self.last_attempt.get_mut(mac) {
            *last = now;
        }
    }

    /// Stop polling `mac` permanently. Returns `true` if it was enrolled.
    pub fn disable(&mut self, mac: &MacAddress) -> bool {
        self.last_attempt.remove(mac).is_some()
    }

    pub fn contains(&self, mac: &MacAddress) -> bool {
        self.last_attempt.contains_key(mac)
    }

    pub fn last_attempt(&self, mac: &MacAddress) -> Option<SystemTime> {
        self.last_attempt.get(mac).copied()
    }

    pub fn len(&self) -> usize {
        self.last_attempt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_attempt.is_empty()
    }
}

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `s` or no suffix: seconds
/// - `m`: minutes
/// - `h`: hours
/// - `d`: days
/// - `ms`: milliseconds
///
/// # Examples
/// ```
/// use ble_tracker::battery_schedule::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("12s").unwrap(), Duration::from_secs(12));
/// assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    let parse = |num: &str, unit: &str| -> Result<u64, String> {
        num.trim()
            .parse()
            .map_err(|_| format!("invalid {unit}: {num}"))
    };

    if let Some(num) = src.strip_suffix("ms") {
        return Ok(Duration::from_millis(parse(num, "milliseconds")?));
    }

    let scaled = |value: u64, factor: u64, unit: &str| -> Result<Duration, String> {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("{unit} out of range: {value}"))
    };

    if let Some(num) = src.strip_suffix('d') {
        return scaled(parse(num, "days")?, 86_400, "days");
    }

    if let Some(num) = src.strip_suffix('h') {
        return scaled(parse(num, "hours")?, 3600, "hours");
    }

    if let Some(num) = src.strip_suffix('m') {
        return scaled(parse(num, "minutes")?, 60, "minutes");
    }

    if let Some(num) = src.strip_suffix('s') {
        return Ok(Duration::from_secs(parse(num, "seconds")?));
    }

    Ok(Duration::from_secs(parse(src, "duration")?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_MAC, at};

    const OTHER_MAC: MacAddress = MacAddress([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

    #[test]
    fn test_enrolled_device_is_due_immediately() {
        let mut schedule = BatterySchedule::new(DEFAULT_BATTERY_INTERVAL);
        schedule.enroll(TEST_MAC);
        assert_eq!(schedule.last_attempt(&TEST_MAC), Some(SystemTime::UNIX_EPOCH));
        assert!(schedule.is_due(&TEST_MAC, at(2 * 86_400)));
    }

    #[test]
    fn test_unknown_device_is_never_due() {
        let schedule = BatterySchedule::new(Duration::ZERO);
        assert!(!schedule.is_due(&TEST_MAC, at(1_000_000)));
    }

    #[test]
    fn test_due_only_strictly_after_interval() {
        let mut schedule = BatterySchedule::new(Duration::from_secs(100));
        schedule.enroll(TEST_MAC);
        schedule.record(&TEST_MAC, at(1000));

        assert!(!schedule.is_due(&TEST_MAC, at(1050)));
        assert!(!schedule.is_due(&TEST_MAC, at(1100)));
        assert!(schedule.is_due(&TEST_MAC, at(1101)));
    }

    #[test]
    fn test_devices_are_independent() {
        let mut schedule = BatterySchedule::new(Duration::from_secs(100));
        schedule.enroll(TEST_MAC);
        schedule.enroll(OTHER_MAC);
        schedule.record(&TEST_MAC, at(1000));

        assert!(!schedule.is_due(&TEST_MAC, at(1010)));
        assert!(schedule.is_due(&OTHER_MAC, at(1010)));
    }

    #[test]
    fn test_disable_is_permanent() {
        let mut schedule = BatterySchedule::new(Duration::from_secs(100));
        schedule.enroll(TEST_MAC);

        assert!(schedule.disable(&TEST_MAC));
        assert!(!schedule.disable(&TEST_MAC));

        // A late record for a disabled device must not resurrect it
        schedule.record(&TEST_MAC, at(5000));
        assert!(!schedule.contains(&TEST_MAC));
        assert!(!schedule.is_due(&TEST_MAC, at(1_000_000)));
    }

    #[test]
    fn test_enroll_keeps_existing_timestamp() {
        let mut schedule = BatterySchedule::new(Duration::from_secs(100));
        schedule.enroll(TEST_MAC);
        schedule.record(&TEST_MAC, at(1000));
        schedule.enroll(TEST_MAC);
        assert_eq!(schedule.last_attempt(&TEST_MAC), Some(at(1000)));
        assert_eq!(schedule.len(), 1);
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), DEFAULT_BATTERY_INTERVAL);
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_duration_with_whitespace() {
        assert_eq!(parse_duration(" 3s ").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("7 d").unwrap(), Duration::from_secs(7 * 86_400));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("1w").is_err());
        assert!(parse_duration(&format!("{}d", u64::MAX)).is_err());
    }
}
