//! Per-connection notification buffer.

use std::collections::HashMap;

/// Accumulates notification payloads by value handle.
///
/// Peripherals split long replies across several notifications; the buffer
/// concatenates them in arrival order until the caller takes or clears them.
#[derive(Debug, Default)]
pub struct NotificationBuffer {
    buffers: HashMap<u16, Vec<u8>>,
}

impl NotificationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_notification(&mut self, handle: u16, data: &[u8]) {
        self.buffers.entry(handle).or_default().extend_from_slice(data);
    }

    pub fn get(&self, handle: u16) -> Option<&[u8]> {
        self.buffers.get(&handle).map(Vec::as_slice)
    }

    /// Remove and return the accumulated payload for `handle`.
    pub fn take(&mut self, handle: u16) -> Option<Vec<u8>> {
        self.buffers.remove(&handle)
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
