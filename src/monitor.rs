//! State change monitors and timeouts
//!
//! A monitor watches the bits of one control and is notified whenever an
//! event changes them. Timeouts are attached to monitors and fire once the
//! clock passes their expiration.

mod registry;
mod timeout;

use std::fmt;

pub use registry::MonitorRegistry;
pub(crate) use registry::{MonitorTarget, Signal, TargetKind};
pub use timeout::{TimeoutScheduler, TimerEntry};

use crate::config::InputSettings;
use crate::device::{ControlId, DeviceRegistry, Value};
use crate::error::Result;
use crate::event::StateEvent;
use crate::state::StateBuffers;

/// Handle returned when registering a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for MonitorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "monitor#{}.{}", self.index, self.generation)
    }
}

/// Notification that a monitored control changed
#[derive(Debug, Clone, Copy)]
pub struct StateChange<'a> {
    pub control: ControlId,
    pub time: f64,
    pub event: &'a StateEvent,
    pub monitor: MonitorHandle,
    pub owner_index: usize,
}

/// Notification that a timeout expired
#[derive(Debug, Clone, Copy)]
pub struct TimerExpiry {
    pub control: ControlId,
    pub time: f64,
    pub monitor: MonitorHandle,
    pub owner_index: usize,
    pub timer_index: usize,
}

/// User-supplied monitor
///
/// Errors are logged with the control's path and do not stop other monitors
/// from firing.
pub trait StateChangeMonitor: Send {
    fn notify_control_state_changed(
        &mut self,
        cx: &mut MonitorContext<'_>,
        change: &StateChange<'_>,
    ) -> anyhow::Result<()>;

    fn notify_timer_expired(
        &mut self,
        _cx: &mut MonitorContext<'_>,
        _expiry: &TimerExpiry,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Monitor built from a change closure
pub struct OnChange<F>(pub F);

/// Wrap a closure as a [`StateChangeMonitor`]
pub fn on_change<F>(f: F) -> OnChange<F>
where
    F: FnMut(&mut MonitorContext<'_>, &StateChange<'_>) -> anyhow::Result<()> + Send,
{
    OnChange(f)
}

impl<F> StateChangeMonitor for OnChange<F>
where
    F: FnMut(&mut MonitorContext<'_>, &StateChange<'_>) -> anyhow::Result<()> + Send,
{
    fn notify_control_state_changed(
        &mut self,
        cx: &mut MonitorContext<'_>,
        change: &StateChange<'_>,
    ) -> anyhow::Result<()> {
        (self.0)(cx, change)
    }
}

/// Access to the monitor substrate from inside a callback
///
/// Monitors added here are not part of the firing pass in progress; monitors
/// removed here never fire again, even if already signalled for this event.
pub struct MonitorContext<'a> {
    pub(crate) monitors: &'a mut MonitorRegistry,
    pub(crate) timers: &'a mut TimeoutScheduler,
    pub(crate) devices: &'a DeviceRegistry,
    pub(crate) state: &'a StateBuffers,
    pub(crate) settings: &'a InputSettings,
    pub(crate) time: f64,
}

impl MonitorContext<'_> {
    /// Time of the event or timer pass being processed
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn add_change_monitor(
        &mut self,
        control: ControlId,
        monitor: impl StateChangeMonitor + 'static,
        owner_index: usize,
    ) -> Result<MonitorHandle> {
        self.monitors.add(
            self.devices,
            control,
            owner_index,
            MonitorTarget::Callback(Some(Box::new(monitor))),
        )
    }

    /// Remove a monitor and all of its timeouts
    pub fn remove_change_monitor(&mut self, handle: MonitorHandle) -> bool {
        self.timers.remove_for_monitor(handle);
        self.monitors.remove(handle)
    }

    pub fn add_change_monitor_timeout(
        &mut self,
        control: ControlId,
        handle: MonitorHandle,
        expiration: f64,
        timer_index: usize,
    ) {
        self.timers.add(control, handle, expiration, timer_index);
    }

    pub fn remove_change_monitor_timeout(&mut self, handle: MonitorHandle, timer_index: usize) {
        self.timers.remove(handle, timer_index);
    }

    /// Processed value of a control in the current state
    pub fn read_value(&self, control: ControlId) -> Option<Value> {
        let (device, control) = self.devices.lookup(control)?;
        let state = self.state.current(device.id())?;
        Some(control.read_value(state, self.settings))
    }

    pub fn control_path(&self, control: ControlId) -> String {
        self.devices.control_path(control)
    }
}
