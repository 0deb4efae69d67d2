//! State events and the ingestion queue
//!
//! Producers push raw state images (or slices of them) for a device; the
//! input system drains the queue in arrival order during `update()`.

use crossbeam::channel::{self, Receiver, Sender};
use tracing::warn;

use crate::device::{ControlId, Device, DeviceId, Value};
use crate::error::{InputError, Result};
use crate::state::BitRegion;

/// Raw state update for one device
#[derive(Debug, Clone, PartialEq)]
pub struct StateEvent {
    pub device: DeviceId,
    /// Seconds; `None` stamps the event with the clock time when it is applied
    pub time: Option<f64>,
    /// Byte offset of `payload` within the device state (0 for full state)
    pub offset: u32,
    pub payload: Vec<u8>,
}

impl StateEvent {
    /// Full state event
    pub fn new(device: DeviceId, payload: Vec<u8>) -> Self {
        Self {
            device,
            time: None,
            offset: 0,
            payload,
        }
    }

    /// Delta event covering part of the device state
    pub fn delta(device: DeviceId, offset: u32, payload: Vec<u8>) -> Self {
        Self {
            device,
            time: None,
            offset,
            payload,
        }
    }

    pub fn at(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    /// Bits of the device state covered by the payload
    pub fn region(&self) -> BitRegion {
        BitRegion::from_bytes(self.offset, self.payload.len() as u32)
    }
}

/// Builds a full state event starting from a device's current state
#[derive(Debug, Clone)]
pub struct StateEventBuilder<'a> {
    device: &'a Device,
    state: Vec<u8>,
    time: Option<f64>,
}

impl<'a> StateEventBuilder<'a> {
    pub(crate) fn new(device: &'a Device, current: Vec<u8>) -> Self {
        Self {
            device,
            state: current,
            time: None,
        }
    }

    /// Write a raw value for the named control
    pub fn set(mut self, control: &str, value: impl Into<Value>) -> Result<Self> {
        let target = self
            .device
            .control_by_name(control)
            .ok_or_else(|| InputError::UnknownControl {
                control: format!("/{}/{}", self.device.name, control),
            })?;
        target.write_raw(&mut self.state, value.into())?;
        Ok(self)
    }

    /// Write a raw value for a control of this device
    pub fn set_control(mut self, control: ControlId, value: impl Into<Value>) -> Result<Self> {
        let target = match self.device.control(control.index as usize) {
            Some(c) if control.device == self.device.id() => c,
            _ => {
                return Err(InputError::UnknownControl {
                    control: control.to_string(),
                })
            }
        };
        target.write_raw(&mut self.state, value.into())?;
        Ok(self)
    }

    pub fn at(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn build(self) -> StateEvent {
        StateEvent {
            device: self.device.id(),
            time: self.time,
            offset: 0,
            payload: self.state,
        }
    }
}

/// Cloneable handle for queueing events, usable from other threads
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<StateEvent>,
}

impl EventSender {
    pub fn send(&self, event: StateEvent) {
        if self.tx.send(event).is_err() {
            warn!("Input system dropped; state event discarded");
        }
    }
}

/// Ingestion queue
#[derive(Debug)]
pub(crate) struct EventQueue {
    tx: Sender<StateEvent>,
    rx: Receiver<StateEvent>,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    pub(crate) fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    pub(crate) fn push(&self, event: StateEvent) {
        // Cannot fail: the queue holds its own receiver
        let _ = self.tx.send(event);
    }

    /// Events queued so far; events queued while draining wait for the next update
    pub(crate) fn drain(&self) -> Vec<StateEvent> {
        let pending = self.rx.len();
        self.rx.try_iter().take(pending).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_preserves_order() {
        let queue = EventQueue::new();
        let sender = queue.sender();
        sender.send(StateEvent::new(DeviceId(1), vec![1]).at(1.0));
        queue.push(StateEvent::new(DeviceId(1), vec![2]).at(2.0));

        let events = queue.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload, vec![1]);
        assert_eq!(events[1].time, Some(2.0));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_sender_works_across_threads() {
        let queue = EventQueue::new();
        let sender = queue.sender();
        std::thread::spawn(move || sender.send(StateEvent::delta(DeviceId(2), 4, vec![0; 4])))
            .join()
            .unwrap();

        let events = queue.drain();
        assert_eq!(events[0].region(), BitRegion::new(32, 32));
    }
}
