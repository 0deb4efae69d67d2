//! Double-buffered device state
//!
//! Each update type owns a current and a previous buffer holding the state of
//! every device side by side. Devices get a 4-byte-aligned slice when they are
//! added; the slice is released when they are removed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

use crate::device::DeviceId;

/// Alignment of every device's state slice
pub const STATE_ALIGNMENT: u32 = 4;

/// Category of update tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Dynamic,
    Fixed,
}

impl UpdateType {
    fn index(self) -> usize {
        match self {
            Self::Dynamic => 0,
            Self::Fixed => 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Allocation {
    offset: u32,
    size: u32,
}

#[derive(Debug, Default, Clone)]
struct DoubleBuffer {
    current: Vec<u8>,
    previous: Vec<u8>,
}

/// State memory for all devices
#[derive(Debug, Default)]
pub struct StateBuffers {
    buffers: [DoubleBuffer; 2],
    defaults: Vec<u8>,
    allocations: HashMap<DeviceId, Allocation>,
}

fn align(value: u32) -> u32 {
    value.div_ceil(STATE_ALIGNMENT) * STATE_ALIGNMENT
}

impl StateBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign state memory to a device, initialized from its default state
    ///
    /// # Returns
    /// Byte offset of the device's slice (always a multiple of 4)
    pub fn allocate(&mut self, device: DeviceId, default_state: &[u8]) -> u32 {
        self.release(device);

        let size = default_state.len() as u32;
        let offset = self.find_free_offset(size);
        let end = (offset + align(size)) as usize;

        if self.defaults.len() < end {
            self.defaults.resize(end, 0);
            for buffer in &mut self.buffers {
                buffer.current.resize(end, 0);
                buffer.previous.resize(end, 0);
            }
        }

        let range = offset as usize..offset as usize + default_state.len();
        self.defaults[range.clone()].copy_from_slice(default_state);
        for buffer in &mut self.buffers {
            buffer.current[range.clone()].copy_from_slice(default_state);
            buffer.previous[range.clone()].copy_from_slice(default_state);
        }

        self.allocations.insert(device, Allocation { offset, size });
        trace!("Allocated {} state bytes for {} at offset {}", size, device, offset);
        offset
    }

    /// First aligned gap large enough for `size` bytes
    fn find_free_offset(&self, size: u32) -> u32 {
        let mut taken: Vec<Allocation> = self.allocations.values().copied().collect();
        taken.sort_by_key(|a| a.offset);

        let mut candidate = 0;
        for allocation in taken {
            if candidate + size <= allocation.offset {
                return candidate;
            }
            candidate = candidate.max(align(allocation.offset + allocation.size));
        }
        candidate
    }

    /// Release a device's slice
    pub fn release(&mut self, device: DeviceId) {
        if let Some(allocation) = self.allocations.remove(&device) {
            let range = allocation.offset as usize..(allocation.offset + allocation.size) as usize;
            self.defaults[range.clone()].fill(0);
            for buffer in &mut self.buffers {
                buffer.current[range.clone()].fill(0);
                buffer.previous[range.clone()].fill(0);
            }
        }
    }

    pub fn device_offset(&self, device: DeviceId) -> Option<u32> {
        self.allocations.get(&device).map(|a| a.offset)
    }

    fn range(&self, device: DeviceId) -> Option<std::ops::Range<usize>> {
        self.allocations
            .get(&device)
            .map(|a| a.offset as usize..(a.offset + a.size) as usize)
    }

    /// Current state of a device
    pub fn current(&self, device: DeviceId) -> Option<&[u8]> {
        self.current_for(device, UpdateType::Dynamic)
    }

    pub fn current_for(&self, device: DeviceId, update: UpdateType) -> Option<&[u8]> {
        let range = self.range(device)?;
        self.buffers[update.index()].current.get(range)
    }

    /// State of a device as of the start of the last update of this type
    pub fn previous_for(&self, device: DeviceId, update: UpdateType) -> Option<&[u8]> {
        let range = self.range(device)?;
        self.buffers[update.index()].previous.get(range)
    }

    /// Default state baked into the device's layout
    pub fn defaults(&self, device: DeviceId) -> Option<&[u8]> {
        let range = self.range(device)?;
        self.defaults.get(range)
    }

    /// Copy of a device's current state
    pub fn snapshot(&self, device: DeviceId) -> Option<Vec<u8>> {
        self.current(device).map(|s| s.to_vec())
    }

    /// Write bytes into the current buffers at an offset within the device
    ///
    /// Bytes past the end of the device's state are ignored.
    pub fn write(&mut self, device: DeviceId, offset: u32, bytes: &[u8]) {
        let Some(range) = self.range(device) else {
            return;
        };
        let start = range.start + offset as usize;
        if start >= range.end {
            return;
        }
        let len = bytes.len().min(range.end - start);
        for buffer in &mut self.buffers {
            buffer.current[start..start + len].copy_from_slice(&bytes[..len]);
        }
    }

    /// Start an update: the current state becomes the previous state
    pub fn swap(&mut self, update: UpdateType) {
        let buffer = &mut self.buffers[update.index()];
        buffer.previous.clone_from(&buffer.current);
    }
}
