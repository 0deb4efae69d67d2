//! Event ingestion and the update loop
//!
//! Every queued event is written to the state buffers in arrival order and
//! the monitors whose bits it changed are notified. One timeout pass at the
//! clock's time closes the update.

use tracing::{error, trace, warn};

use crate::action::trigger::TriggerEnv;
use crate::device::{ControlId, DeviceId, Value};
use crate::error::{InputError, Result};
use crate::event::{EventSender, StateEvent, StateEventBuilder};
use crate::monitor::{MonitorContext, Signal, StateChange, TargetKind, TimerEntry, TimerExpiry};
use crate::rebind::{RebindId, WAIT_TIMER};
use crate::state::UpdateType;

impl super::InputSystem {
    /// Handle for queueing events from any thread
    pub fn event_sender(&self) -> EventSender {
        self.queue.sender()
    }

    pub fn queue_event(&self, event: StateEvent) {
        self.queue.push(event);
    }

    /// Events waiting for the next update
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Full state event for a device, starting from its current state
    pub fn state_event(&self, device: DeviceId) -> Result<StateEventBuilder<'_>> {
        let d = self.devices.device(device).ok_or_else(|| InputError::UnknownDevice {
            device: device.to_string(),
        })?;
        let current = self
            .state
            .snapshot(device)
            .unwrap_or_else(|| d.default_state().to_vec());
        Ok(StateEventBuilder::new(d, current))
    }

    /// Queue a delta event writing one control's raw value
    ///
    /// The delta covers the bytes of the control; other bits in those bytes
    /// keep their current value.
    pub fn queue_value(&self, control: ControlId, value: impl Into<Value>) -> Result<()> {
        let (device, c) = self.devices.lookup(control).ok_or_else(|| InputError::UnknownControl {
            control: control.to_string(),
        })?;
        let mut image = self
            .state
            .snapshot(device.id())
            .unwrap_or_else(|| device.default_state().to_vec());
        c.write_raw(&mut image, value.into())?;

        let start = c.block.byte_offset as usize;
        let end = (c.block.byte_end() as usize).min(image.len());
        let payload = image.get(start..end).map(<[u8]>::to_vec).unwrap_or_default();
        self.queue.push(StateEvent::delta(device.id(), c.block.byte_offset, payload));
        Ok(())
    }

    /// Run a dynamic update
    pub fn update(&mut self) {
        self.update_type(UpdateType::Dynamic);
    }

    /// Run an update of the given type
    ///
    /// Drains the queue in arrival order, then runs one timeout pass at the
    /// clock's time. Events without a time are stamped with the clock's time
    /// at the start of the update.
    pub fn update_type(&mut self, update: UpdateType) {
        self.update_count += 1;
        self.state.swap(update);
        let now = self.clock.now();

        let events = self.queue.drain();
        trace!("Update #{} ({:?}) with {} event(s)", self.update_count, update, events.len());
        for event in events {
            let time = event.time.unwrap_or(now);
            self.apply_event(&event, time);
        }
        self.process_timeouts(now);
    }

    fn apply_event(&mut self, event: &StateEvent, time: f64) {
        let device = event.device;
        let Some(old) = self.state.snapshot(device) else {
            warn!("Dropping state event for unknown device {}", device);
            return;
        };
        self.state.write(device, event.offset, &event.payload);
        let Some(new) = self.state.snapshot(device) else {
            return;
        };

        let signals = self.monitors.signalled(device, &old, &new, event.region());
        if signals.is_empty() {
            return;
        }

        let mut sessions: Vec<RebindId> = Vec::new();
        for signal in &signals {
            if let Some(TargetKind::Rebind(id)) = self.monitors.target_kind(signal.handle) {
                if let Some(op) = self.rebinds.get_mut(id.0 as usize).and_then(Option::as_mut) {
                    op.note_change(signal.control);
                    if !sessions.contains(&id) {
                        sessions.push(id);
                    }
                }
            }
        }

        // Suppressing sessions see the event before anyone else and may swallow it
        let (suppressing, listening): (Vec<RebindId>, Vec<RebindId>) =
            sessions.into_iter().partition(|id| self.rebind_suppresses(*id));
        let mut swallowed = false;
        for id in suppressing {
            swallowed |= self.evaluate_rebind(id, time).matched;
        }
        if swallowed {
            trace!("Event for {} swallowed by rebind", device);
            self.state.write(device, 0, &old);
            return;
        }

        for signal in signals {
            match self.monitors.target_kind(signal.handle) {
                // Removed by an earlier monitor of this event
                None => {}
                Some(TargetKind::Callback) => self.fire_change_callback(signal, event, time),
                Some(TargetKind::Action(id)) => {
                    self.fire_action_change(id, signal.owner_index, time)
                }
                Some(TargetKind::Rebind(_)) => {}
            }
        }

        for id in listening {
            self.evaluate_rebind(id, time);
        }
    }

    fn fire_change_callback(&mut self, signal: Signal, event: &StateEvent, time: f64) {
        let Some(mut callback) = self.monitors.take_callback(signal.handle) else {
            return;
        };
        trace!(
            "Monitor {} fired for {}",
            signal.handle,
            self.devices.control_path(signal.control)
        );

        let change = StateChange {
            control: signal.control,
            time,
            event,
            monitor: signal.handle,
            owner_index: signal.owner_index,
        };
        let result = {
            let mut cx = MonitorContext {
                monitors: &mut self.monitors,
                timers: &mut self.timers,
                devices: &self.devices,
                state: &self.state,
                settings: &self.settings,
                time,
            };
            callback.notify_control_state_changed(&mut cx, &change)
        };
        if let Err(e) = result {
            self.log_callback_error(signal.control, "change", &e);
        }
        self.monitors.restore_callback(signal.handle, callback);
    }

    fn fire_action_change(&mut self, id: crate::action::ActionId, key: usize, time: f64) {
        let Some(action) = self.actions.get_mut(id.0 as usize) else {
            return;
        };
        let mut env = TriggerEnv {
            devices: &self.devices,
            state: &self.state,
            settings: &self.settings,
            timers: &mut self.timers,
            update: self.update_count,
        };
        let events = action.on_change(&mut env, key, time);
        super::actions::dispatch(action, &mut self.any_action_listeners, &events);
    }

    /// Fire every timeout due at `now` that was armed before this pass
    pub(crate) fn process_timeouts(&mut self, now: f64) {
        let count = self.timers.pass_len();
        for index in 0..count {
            let Some(entry) = self.timers.take_expired(index, now) else {
                continue;
            };
            trace!(
                "Timeout {} of {} expired at {:.3}",
                entry.timer_index,
                entry.monitor,
                now
            );
            match self.monitors.target_kind(entry.monitor) {
                None => {}
                Some(TargetKind::Callback) => self.fire_timer_callback(entry, now),
                Some(TargetKind::Action(id)) => self.fire_action_timer(id, entry, now),
                Some(TargetKind::Rebind(id)) if entry.timer_index == WAIT_TIMER => {
                    self.finish_rebind(id);
                }
                Some(TargetKind::Rebind(_)) => {}
            }
        }
        self.timers.compact();
    }

    fn fire_timer_callback(&mut self, entry: TimerEntry, now: f64) {
        let Some(mut callback) = self.monitors.take_callback(entry.monitor) else {
            return;
        };
        let expiry = TimerExpiry {
            control: entry.control,
            time: now,
            monitor: entry.monitor,
            owner_index: self.monitors.owner_index(entry.monitor).unwrap_or_default(),
            timer_index: entry.timer_index,
        };
        let result = {
            let mut cx = MonitorContext {
                monitors: &mut self.monitors,
                timers: &mut self.timers,
                devices: &self.devices,
                state: &self.state,
                settings: &self.settings,
                time: now,
            };
            callback.notify_timer_expired(&mut cx, &expiry)
        };
        if let Err(e) = result {
            self.log_callback_error(entry.control, "timeout", &e);
        }
        self.monitors.restore_callback(entry.monitor, callback);
    }

    fn fire_action_timer(&mut self, id: crate::action::ActionId, entry: TimerEntry, now: f64) {
        let Some(key) = self.monitors.owner_index(entry.monitor) else {
            return;
        };
        let Some(action) = self.actions.get_mut(id.0 as usize) else {
            return;
        };
        let mut env = TriggerEnv {
            devices: &self.devices,
            state: &self.state,
            settings: &self.settings,
            timers: &mut self.timers,
            update: self.update_count,
        };
        let events = action.on_timer(&mut env, key, entry.timer_index, now);
        super::actions::dispatch(action, &mut self.any_action_listeners, &events);
    }

    fn log_callback_error(&self, control: ControlId, kind: &str, e: &anyhow::Error) {
        let device = self
            .devices
            .device(control.device)
            .map(|d| d.name.as_str())
            .unwrap_or("<removed>");
        error!(
            "Monitor {} callback for {} on device {} failed: {:#}",
            kind,
            self.devices.control_path(control),
            device,
            e
        );
    }
}
