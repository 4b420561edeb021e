//! Device classification and the new-device promotion vote.
//!
//! Every address the radio reports is in exactly one of three states:
//! tracked, explicitly ignored, or unclassified. Unclassified addresses
//! collect sightings and are promoted to tracked once they have been seen
//! [`MIN_SEEN_NEW`] times, which keeps one-off advertisement captures out of
//! the presence feed.

use crate::address::MacAddress;
use crate::known_devices::KnownDevice;
use std::collections::{HashMap, HashSet};
use std::time::SystemTime;

/// Number of sightings after which an unclassified device becomes tracked.
pub const MIN_SEEN_NEW: u32 = 5;

/// Classification state of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Tracked,
    Ignored,
    Unclassified,
}

/// Sightings collected for a device that is not classified yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeviceVote {
    pub seen: u32,
    /// Most recent non-empty name seen for the device
    pub name: Option<String>,
    pub last_seen: SystemTime,
}

/// Outcome of observing an unclassified device.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceVote {
    /// First sighting; nothing is reported
    FirstSighting,
    /// Seen again but still below the promotion threshold
    Pending { seen: u32 },
    /// Threshold reached on this sighting; the device is now tracked
    Promoted { name: Option<String> },
    /// The address was already tracked or ignored; nothing changed
    Classified,
}

/// Owner of the tracked set, the ignore set and the new-device votes.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    /// Tracked devices in startup order followed by promotion order
    tracked: Vec<MacAddress>,
    ignored: HashSet<MacAddress>,
    votes: HashMap<MacAddress, NewDeviceVote>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from the known-device list.
    ///
    /// When an address is listed more than once the last entry wins.
    pub fn from_known(devices: &[KnownDevice]) -> Self {
        let mut registry = Self::new();
        for device in devices {
            if device.track {
                tracing::info!(address = %device.address, "tracking BLE device");
                registry.ignored.remove(&device.address);
                registry.insert_tracked(device.address);
            } else {
                tracing::info!(address = %device.address, "ignoring BLE device");
                registry.tracked.retain(|a| *a != device.address);
                registry.ignored.insert(device.address);
            }
        }
        registry
    }

    fn insert_tracked(&mut self, address: MacAddress) {
        if !self.tracked.contains(&address) {
            self.tracked.push(address);
        }
    }

    pub fn classify(&self, address: &MacAddress) -> Classification {
        if self.tracked.contains(address) {
            Classification::Tracked
        } else if self.ignored.contains(address) {
            Classification::Ignored
        } else {
            Classification::Unclassified
        }
    }

    pub fn tracked(&self) -> &[MacAddress] {
        &self.tracked
    }

    pub fn vote(&self, address: &MacAddress) -> Option<&NewDeviceVote> {
        self.votes.get(address)
    }

    pub fn pending_votes(&self) -> usize {
        self.votes.len()
    }

    /// Record a sighting of a device that is neither tracked nor ignored.
    ///
    /// `name` must already be normalized. A blank name never replaces a
    /// previously stored one.
    pub fn observe_unclassified(
        &mut self,
        address: MacAddress,
        name: Option<String>,
        now: SystemTime,
    ) -> PresenceVote {
        if self.classify(&address) != Classification::Unclassified {
            return PresenceVote::Classified;
        }

        let name = name.filter(|n| !n.is_empty());

        let Some(vote) = self.votes.get_mut(&address) else {
            tracing::info!(%address, "seen for the first time");
            self.votes.insert(
                address,
                NewDeviceVote {
                    seen: 1,
                    name,
                    last_seen: now,
                },
            );
            return PresenceVote::FirstSighting;
        };

        vote.seen += 1;
        vote.last_seen = now;
        if name.is_some() {
            vote.name = name;
        }
        tracing::info!(%address, seen = vote.seen, "seen again");

        if vote.seen < MIN_SEEN_NEW {
            return PresenceVote::Pending { seen: vote.seen };
        }

        let name = self.votes.remove(&address).and_then(|vote| vote.name);
        tracing::info!(%address, "adding to tracked devices");
        self.insert_tracked(address);
        PresenceVote::Promoted { name }
    }

    /// Forget votes of devices last seen before `cutoff`. Returns how many
    /// were dropped; a forgotten device starts over at its next sighting.
    pub fn prune_votes(&mut self, cutoff: SystemTime) -> usize {
        let before = self.votes.len();
        self.votes.retain(|address, vote| {
            let keep = vote.last_seen >= cutoff;
            if !keep {
                tracing::debug!(%address, seen = vote.seen, "forgetting unclassified device");
            }
            keep
        });
        before - self.votes.len()
    }
}
