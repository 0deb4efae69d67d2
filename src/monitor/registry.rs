//! Change monitor arena
//!
//! Monitors live in stable slots. Removing a monitor tombstones its slot and
//! bumps the slot's generation, so handles held by an in-flight firing pass
//! simply stop resolving. A pass works on a snapshot of the handles that were
//! signalled when it started; monitors added during the pass are not part of
//! it and first fire for the next event.

use std::collections::HashMap;

use super::{MonitorHandle, StateChangeMonitor};
use crate::action::ActionId;
use crate::device::{ControlId, DeviceId, DeviceRegistry};
use crate::error::{InputError, Result};
use crate::rebind::RebindId;
use crate::state::{bits, BitRegion};

/// Who receives a monitor's notifications
pub(crate) enum MonitorTarget {
    /// User code; `None` while the callback is out being invoked
    Callback(Option<Box<dyn StateChangeMonitor>>),
    /// A bound control of an action (owner index = bound control)
    Action(ActionId),
    /// A listening rebind session
    Rebind(RebindId),
}

/// Owner of a monitor, without the callback itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TargetKind {
    Callback,
    Action(ActionId),
    Rebind(RebindId),
}

struct MonitorEntry {
    control: ControlId,
    region: BitRegion,
    owner_index: usize,
    target: MonitorTarget,
}

#[derive(Default)]
struct Slot {
    generation: u32,
    entry: Option<MonitorEntry>,
}

/// A monitor whose control changed during an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Signal {
    pub handle: MonitorHandle,
    pub control: ControlId,
    pub owner_index: usize,
}

/// Registered change monitors, grouped by device
#[derive(Default)]
pub struct MonitorRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Live handles per device in registration order
    by_device: HashMap<DeviceId, Vec<MonitorHandle>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a monitor on a control
    pub(crate) fn add(
        &mut self,
        devices: &DeviceRegistry,
        control: ControlId,
        owner_index: usize,
        target: MonitorTarget,
    ) -> Result<MonitorHandle> {
        let region = devices
            .control(control)
            .map(|c| c.region())
            .ok_or_else(|| InputError::UnknownControl {
                control: control.to_string(),
            })?;

        let entry = MonitorEntry {
            control,
            region,
            owner_index,
            target,
        };

        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                MonitorHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                MonitorHandle {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };

        self.by_device.entry(control.device).or_default().push(handle);
        Ok(handle)
    }

    fn entry(&self, handle: MonitorHandle) -> Option<&MonitorEntry> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.entry.as_ref())
    }

    fn entry_mut(&mut self, handle: MonitorHandle) -> Option<&mut MonitorEntry> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.entry.as_mut())
    }

    pub fn is_alive(&self, handle: MonitorHandle) -> bool {
        self.entry(handle).is_some()
    }

    /// Tombstone a monitor. Returns false for unknown or already removed handles.
    pub fn remove(&mut self, handle: MonitorHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation {
            return false;
        }
        let Some(entry) = slot.entry.take() else {
            return false;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);

        let device = entry.control.device;
        if let Some(handles) = self.by_device.get_mut(&device) {
            handles.retain(|&h| h != handle);
            if handles.is_empty() {
                self.by_device.remove(&device);
            }
        }
        true
    }

    /// Remove every monitor on a device
    pub fn remove_device(&mut self, device: DeviceId) -> Vec<MonitorHandle> {
        let handles = self.by_device.remove(&device).unwrap_or_default();
        handles.into_iter().filter(|&h| self.remove(h)).collect()
    }

    pub fn control(&self, handle: MonitorHandle) -> Option<ControlId> {
        self.entry(handle).map(|e| e.control)
    }

    pub(crate) fn owner_index(&self, handle: MonitorHandle) -> Option<usize> {
        self.entry(handle).map(|e| e.owner_index)
    }

    pub(crate) fn target_kind(&self, handle: MonitorHandle) -> Option<TargetKind> {
        self.entry(handle).map(|e| match e.target {
            MonitorTarget::Callback(_) => TargetKind::Callback,
            MonitorTarget::Action(id) => TargetKind::Action(id),
            MonitorTarget::Rebind(id) => TargetKind::Rebind(id),
        })
    }

    /// Take a user callback out of its slot for invocation
    pub(crate) fn take_callback(
        &mut self,
        handle: MonitorHandle,
    ) -> Option<Box<dyn StateChangeMonitor>> {
        match &mut self.entry_mut(handle)?.target {
            MonitorTarget::Callback(callback) => callback.take(),
            _ => None,
        }
    }

    /// Put a callback back; dropped if the monitor was removed meanwhile
    pub(crate) fn restore_callback(
        &mut self,
        handle: MonitorHandle,
        callback: Box<dyn StateChangeMonitor>,
    ) {
        if let Some(entry) = self.entry_mut(handle) {
            if let MonitorTarget::Callback(slot @ None) = &mut entry.target {
                *slot = Some(callback);
            }
        }
    }

    /// Monitors whose bits differ between `old` and `new` inside `changed`
    ///
    /// Ordered by control declaration order, then registration order.
    pub(crate) fn signalled(
        &self,
        device: DeviceId,
        old: &[u8],
        new: &[u8],
        changed: BitRegion,
    ) -> Vec<Signal> {
        let Some(handles) = self.by_device.get(&device) else {
            return Vec::new();
        };

        let mut signals: Vec<Signal> = handles
            .iter()
            .filter_map(|&handle| {
                let entry = self.entry(handle)?;
                let overlap = entry.region.overlap(&changed)?;
                bits::regions_differ(old, new, overlap).then_some(Signal {
                    handle,
                    control: entry.control,
                    owner_index: entry.owner_index,
                })
            })
            .collect();

        signals.sort_by_key(|s| s.control.index);
        signals
    }

    /// Number of live monitors
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live monitors on a control
    pub fn monitors_on(&self, control: ControlId) -> Vec<MonitorHandle> {
        self.by_device
            .get(&control.device)
            .map(|handles| {
                handles
                    .iter()
                    .copied()
                    .filter(|&h| self.control(h) == Some(control))
                    .collect()
            })
            .unwrap_or_default()
    }
}
