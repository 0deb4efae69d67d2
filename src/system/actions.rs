//! Action management
//!
//! Enabling resolves bindings and installs monitors; everything after that
//! is driven by the update loop in `events.rs`.

use tracing::debug;

use crate::action::trigger::{ActionState, TriggerEnv};
use crate::action::{ActionDef, ActionEvent, ActionId, ActionListener, BindingDef};
use crate::device::{BindingPath, ControlId, FromValue};
use crate::error::{InputError, Result};
use crate::interactions::Phase;

/// Deliver events to the action's listeners, then to the global ones
pub(super) fn dispatch(
    action: &mut ActionState,
    global: &mut [ActionListener],
    events: &[ActionEvent],
) {
    for event in events {
        for listener in action.listeners.iter_mut() {
            listener(event);
        }
        for listener in global.iter_mut() {
            listener(event);
        }
    }
}

impl super::InputSystem {
    /// Register an action; it starts out disabled
    pub fn add_action(&mut self, def: ActionDef) -> ActionId {
        let id = ActionId(self.actions.len() as u32);
        debug!("Added action '{}' ({})", def.name, id);
        self.actions.push(ActionState::new(id, def));
        id
    }

    pub(crate) fn action_state(&self, id: ActionId) -> Result<&ActionState> {
        self.actions
            .get(id.0 as usize)
            .ok_or_else(|| InputError::UnknownAction {
                action: id.to_string(),
            })
    }

    pub(crate) fn action_state_mut(&mut self, id: ActionId) -> Result<&mut ActionState> {
        self.actions
            .get_mut(id.0 as usize)
            .ok_or_else(|| InputError::UnknownAction {
                action: id.to_string(),
            })
    }

    pub fn action(&self, id: ActionId) -> Result<&ActionDef> {
        Ok(&self.action_state(id)?.def)
    }

    pub fn action_by_name(&self, name: &str) -> Option<ActionId> {
        self.actions
            .iter()
            .find(|a| a.def.name.eq_ignore_ascii_case(name))
            .map(|a| a.id)
    }

    pub fn action_ids(&self) -> Vec<ActionId> {
        self.actions.iter().map(|a| a.id).collect()
    }

    /// Resolve bindings and start listening
    ///
    /// Malformed interaction strings or binding paths fail here, before any
    /// monitor is installed.
    pub fn enable_action(&mut self, id: ActionId) -> Result<()> {
        let action = self
            .actions
            .get_mut(id.0 as usize)
            .ok_or_else(|| InputError::UnknownAction {
                action: id.to_string(),
            })?;
        if action.enabled {
            return Ok(());
        }
        action.resolve(&self.devices, &mut self.monitors, &mut self.timers, &self.interactions)?;
        action.enabled = true;
        debug!("Enabled action '{}' on {} control(s)", action.def.name, action.bound.len());
        Ok(())
    }

    /// Stop listening; an action in progress reports `Canceled`
    pub fn disable_action(&mut self, id: ActionId) -> Result<()> {
        let now = self.clock.now();
        let action = self
            .actions
            .get_mut(id.0 as usize)
            .ok_or_else(|| InputError::UnknownAction {
                action: id.to_string(),
            })?;
        if !action.enabled {
            return Ok(());
        }
        let mut env = TriggerEnv {
            devices: &self.devices,
            state: &self.state,
            settings: &self.settings,
            timers: &mut self.timers,
            update: self.update_count,
        };
        let events = action.disable(&mut env, &mut self.monitors, now);
        dispatch(action, &mut self.any_action_listeners, &events);
        debug!("Disabled action '{}'", action.def.name);
        Ok(())
    }

    pub fn is_action_enabled(&self, id: ActionId) -> Result<bool> {
        Ok(self.action_state(id)?.enabled)
    }

    /// Listen to phase changes of one action
    pub fn on_action(
        &mut self,
        id: ActionId,
        listener: impl FnMut(&ActionEvent) + Send + 'static,
    ) -> Result<()> {
        self.action_state_mut(id)?.listeners.push(Box::new(listener));
        Ok(())
    }

    /// Listen to phase changes of every action
    pub fn on_any_action(&mut self, listener: impl FnMut(&ActionEvent) + Send + 'static) {
        self.any_action_listeners.push(Box::new(listener));
    }

    pub fn action_phase(&self, id: ActionId) -> Result<Phase> {
        Ok(self.action_state(id)?.trigger.phase)
    }

    /// Value of the driving control, or zero while the action is waiting
    pub fn read_action_value<T: FromValue>(&self, id: ActionId) -> Result<T> {
        let trigger = self.action_state(id)?.trigger;
        let value = match (trigger.phase, trigger.control) {
            (Phase::Waiting, _) | (_, None) => Default::default(),
            (_, Some(control)) => self.read_value(control).unwrap_or_default(),
        };
        Ok(value.read())
    }

    /// Controls the action's bindings currently resolve to
    pub fn action_controls(&self, id: ActionId) -> Result<Vec<ControlId>> {
        let action = self.action_state(id)?;
        if action.enabled {
            return Ok(action.controls());
        }
        let mut controls = Vec::new();
        for binding in &action.def.bindings {
            let path = BindingPath::parse(binding.effective_path())?;
            controls.extend(self.devices.find_controls(&path));
        }
        Ok(controls)
    }

    /// Progress in [0,1] of the timeout the driving interaction is waiting on
    ///
    /// Advances with the clock alone; no update is needed.
    pub fn timeout_completion_percentage(&self, id: ActionId) -> Result<f32> {
        let now = self.clock.now();
        Ok(self.action_state(id)?.completion(now))
    }

    /// Whether the action performed during the most recent update
    pub fn was_performed_this_update(&self, id: ActionId) -> Result<bool> {
        Ok(self.action_state(id)?.was_performed_in(self.update_count))
    }

    // Bindings

    /// Append a binding; returns its index
    pub fn add_binding(&mut self, id: ActionId, binding: BindingDef) -> Result<usize> {
        BindingPath::parse(&binding.path)?;
        let action = self.action_state_mut(id)?;
        action.def.bindings.push(binding);
        let index = action.def.bindings.len() - 1;
        self.refresh_action(id)?;
        Ok(index)
    }

    /// Resolve binding `index` through `path` instead of its own path
    pub fn apply_binding_override(&mut self, id: ActionId, index: usize, path: &str) -> Result<()> {
        BindingPath::parse(path)?;
        let binding = self.binding_mut(id, index)?;
        binding.override_path = Some(path.to_string());
        debug!("Binding {} of {} overridden with {}", index, id, path);
        self.refresh_action(id)
    }

    pub fn remove_binding_override(&mut self, id: ActionId, index: usize) -> Result<()> {
        self.binding_mut(id, index)?.override_path = None;
        self.refresh_action(id)
    }

    pub fn remove_all_binding_overrides(&mut self, id: ActionId) -> Result<()> {
        for binding in &mut self.action_state_mut(id)?.def.bindings {
            binding.override_path = None;
        }
        self.refresh_action(id)
    }

    fn binding_mut(&mut self, id: ActionId, index: usize) -> Result<&mut BindingDef> {
        let action = self.action_state_mut(id)?;
        let name = action.def.name.clone();
        let count = action.def.bindings.len();
        action.def.bindings.get_mut(index).ok_or_else(|| {
            InputError::invalid_operation(format!(
                "Action '{}' has {} binding(s); index {} is out of range",
                name, count, index
            ))
        })
    }

    /// Re-resolve an enabled action after its bindings changed
    pub(crate) fn refresh_action(&mut self, id: ActionId) -> Result<()> {
        let action = self
            .actions
            .get_mut(id.0 as usize)
            .ok_or_else(|| InputError::UnknownAction {
                action: id.to_string(),
            })?;
        if action.enabled {
            action.resolve(
                &self.devices,
                &mut self.monitors,
                &mut self.timers,
                &self.interactions,
            )?;
        }
        Ok(())
    }
}
