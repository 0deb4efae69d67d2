//! Input system - owner of every input component
//!
//! The InputSystem ties together:
//! - Devices and their double-buffered state
//! - Change monitors and their timeouts
//! - Actions, their interactions and listeners
//! - Interactive rebinding operations
//!
//! Everything happens inside [`InputSystem::update`], on the caller's thread.
//! Producers on other threads only ever touch the event queue through an
//! [`EventSender`](crate::event::EventSender).

mod actions;
mod events;
mod rebinding;
#[cfg(test)]
mod tests;

use tracing::{debug, warn};

use crate::action::trigger::ActionState;
use crate::action::ActionListener;
use crate::clock::{Clock, SystemClock};
use crate::config::InputSettings;
use crate::device::{
    BindingPath, ControlId, Device, DeviceId, DeviceRegistry, Layout, LayoutRegistry, Value,
};
use crate::error::{InputError, Result};
use crate::event::EventQueue;
use crate::interactions::{Interaction, InteractionParams, InteractionRegistry};
use crate::monitor::{
    MonitorHandle, MonitorRegistry, MonitorTarget, StateChangeMonitor, TimeoutScheduler,
};
use crate::rebind::RebindingOperation;
use crate::state::{StateBuffers, UpdateType};

/// The input system
pub struct InputSystem {
    settings: InputSettings,
    clock: Box<dyn Clock>,
    devices: DeviceRegistry,
    state: StateBuffers,
    monitors: MonitorRegistry,
    timers: TimeoutScheduler,
    /// Indexed by `ActionId`
    actions: Vec<ActionState>,
    /// Indexed by `RebindId`; `None` once removed (or while out being processed)
    rebinds: Vec<Option<RebindingOperation>>,
    interactions: InteractionRegistry,
    queue: EventQueue,
    update_count: u64,
    any_action_listeners: Vec<ActionListener>,
}

impl Default for InputSystem {
    fn default() -> Self {
        Self::build(InputSettings::default(), Box::new(SystemClock::new()))
    }
}

impl InputSystem {
    /// Create an input system on the wall clock
    pub fn new(settings: InputSettings) -> Result<Self> {
        Self::with_clock(settings, SystemClock::new())
    }

    /// Create an input system driven by a custom clock
    pub fn with_clock(settings: InputSettings, clock: impl Clock + 'static) -> Result<Self> {
        settings.validate()?;
        Ok(Self::build(settings, Box::new(clock)))
    }

    fn build(settings: InputSettings, clock: Box<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            devices: DeviceRegistry::new(LayoutRegistry::new()),
            state: StateBuffers::new(),
            monitors: MonitorRegistry::new(),
            timers: TimeoutScheduler::new(),
            actions: Vec::new(),
            rebinds: Vec::new(),
            interactions: InteractionRegistry::new(),
            queue: EventQueue::new(),
            update_count: 0,
            any_action_listeners: Vec::new(),
        }
    }

    pub fn settings(&self) -> &InputSettings {
        &self.settings
    }

    /// Replace the settings; they apply from the next processed event
    pub fn set_settings(&mut self, settings: InputSettings) -> Result<()> {
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    /// Current clock time in seconds
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Number of updates run so far
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    // Interactions

    pub fn interactions(&self) -> &InteractionRegistry {
        &self.interactions
    }

    /// Register a custom interaction under a case-insensitive name
    pub fn register_interaction<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(&InteractionParams) -> Result<Box<dyn Interaction>> + Send + Sync + 'static,
    {
        self.interactions.register(name, constructor);
    }

    // Devices

    pub fn register_layout(&mut self, layout: Layout) -> Result<()> {
        self.devices.layouts_mut().register(layout)
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.device(id)
    }

    pub fn device_by_name(&self, name: &str) -> Option<&Device> {
        self.devices.device_by_name(name)
    }

    /// Build a device from a layout and give it state memory
    ///
    /// Enabled actions pick up matching controls of the new device.
    pub fn add_device(&mut self, layout: &str) -> Result<DeviceId> {
        let id = self.devices.add_device(layout)?;
        if let Some(device) = self.devices.device(id) {
            let offset = self.state.allocate(id, device.default_state());
            debug!(
                "Added device {} ({}) with {} state bytes at offset {}",
                device.name,
                id,
                device.state_size(),
                offset
            );
        }
        self.resolve_enabled_actions();
        Ok(id)
    }

    /// Remove a device with all monitors and timeouts on its controls
    pub fn remove_device(&mut self, id: DeviceId) -> Result<()> {
        let device = self
            .devices
            .remove_device(id)
            .ok_or_else(|| InputError::UnknownDevice {
                device: id.to_string(),
            })?;

        for handle in self.monitors.remove_device(id) {
            self.timers.remove_for_monitor(handle);
        }
        for op in self.rebinds.iter_mut().flatten() {
            op.forget_device(id);
        }
        self.state.release(id);
        debug!("Removed device {} ({})", device.name, id);

        self.resolve_enabled_actions();
        Ok(())
    }

    /// Replace a device's usage tags (`LeftHand`, `RightHand`, ...)
    pub fn set_device_usages<S: AsRef<str>>(&mut self, id: DeviceId, usages: &[S]) -> Result<()> {
        let usages = usages.iter().map(|u| u.as_ref().to_string()).collect();
        self.devices.set_usages(id, usages)?;
        self.resolve_enabled_actions();
        Ok(())
    }

    /// Every control matching a binding path
    pub fn find_controls(&self, path: &str) -> Result<Vec<ControlId>> {
        Ok(self.devices.find_controls(&BindingPath::parse(path)?))
    }

    /// First control matching a binding path
    pub fn control(&self, path: &str) -> Result<ControlId> {
        self.find_controls(path)?
            .into_iter()
            .next()
            .ok_or_else(|| InputError::UnknownControl {
                control: path.to_string(),
            })
    }

    pub fn control_path(&self, control: ControlId) -> String {
        self.devices.control_path(control)
    }

    // Values

    /// Processed value of a control in the current state
    pub fn read_value(&self, control: ControlId) -> Option<Value> {
        let (device, c) = self.devices.lookup(control)?;
        let state = self.state.current(device.id())?;
        Some(c.read_value(state, &self.settings))
    }

    /// Value as of the start of the last update of this type
    pub fn read_previous_value(&self, control: ControlId, update: UpdateType) -> Option<Value> {
        let (device, c) = self.devices.lookup(control)?;
        let state = self.state.previous_for(device.id(), update)?;
        Some(c.read_value(state, &self.settings))
    }

    /// Value defined by the layout, regardless of the current state
    pub fn read_default_value(&self, control: ControlId) -> Option<Value> {
        let (device, c) = self.devices.lookup(control)?;
        let state = self.state.defaults(device.id())?;
        Some(c.read_value(state, &self.settings))
    }

    /// Actuation in [0,1]; 0 for unknown controls
    pub fn magnitude(&self, control: ControlId) -> f32 {
        self.read_value(control).map(|v| v.magnitude()).unwrap_or(0.0)
    }

    // Monitors

    /// Watch a control; the monitor fires for every event changing its bits
    pub fn add_change_monitor(
        &mut self,
        control: ControlId,
        monitor: impl StateChangeMonitor + 'static,
        owner_index: usize,
    ) -> Result<MonitorHandle> {
        self.monitors.add(
            &self.devices,
            control,
            owner_index,
            MonitorTarget::Callback(Some(Box::new(monitor))),
        )
    }

    /// Remove a monitor; its timeouts are dropped without firing
    pub fn remove_change_monitor(&mut self, handle: MonitorHandle) -> bool {
        self.timers.remove_for_monitor(handle);
        self.monitors.remove(handle)
    }

    /// Arm (or re-arm) timeout `timer_index` of a monitor
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

    pub fn monitors(&self) -> &MonitorRegistry {
        &self.monitors
    }

    pub fn timers(&self) -> &TimeoutScheduler {
        &self.timers
    }

    /// Re-resolve enabled actions after the device set changed
    fn resolve_enabled_actions(&mut self) {
        for action in self.actions.iter_mut().filter(|a| a.enabled) {
            let resolved = action.resolve(
                &self.devices,
                &mut self.monitors,
                &mut self.timers,
                &self.interactions,
            );
            if let Err(e) = resolved {
                warn!("Failed to re-resolve action '{}': {}", action.def.name, e);
            }
        }
    }
}
