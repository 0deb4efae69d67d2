//! Rebinding lifecycle
//!
//! Operations are taken out of their slot while being processed so their
//! callbacks and the action they write to can be borrowed independently.

use tracing::{debug, info, warn};

use crate::action::{ActionId, BindingDef};
use crate::error::{InputError, Result};
use crate::rebind::{Evaluation, RebindEnv, RebindId, RebindingOperation, Request};

impl super::InputSystem {
    /// Register a rebinding operation; it stays idle until started
    pub fn add_rebind(&mut self, op: RebindingOperation) -> RebindId {
        let id = RebindId(self.rebinds.len() as u32);
        self.rebinds.push(Some(op));
        id
    }

    pub fn rebind(&self, id: RebindId) -> Option<&RebindingOperation> {
        self.rebinds.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Rebuild an idle or finished operation with more builder calls
    pub fn configure_rebind(
        &mut self,
        id: RebindId,
        configure: impl FnOnce(RebindingOperation) -> RebindingOperation,
    ) -> Result<()> {
        let slot = self.rebind_slot(id)?;
        if slot.as_ref().is_some_and(RebindingOperation::is_listening) {
            return Err(InputError::invalid_operation(format!(
                "Rebind {} is listening; cancel it before reconfiguring",
                id
            )));
        }
        if let Some(op) = slot.take() {
            *slot = Some(configure(op));
        }
        Ok(())
    }

    /// Remove an operation, stopping it without callbacks
    pub fn remove_rebind(&mut self, id: RebindId) -> Option<RebindingOperation> {
        let mut op = self.rebinds.get_mut(id.0 as usize)?.take()?;
        op.stop_listening(&mut self.monitors, &mut self.timers);
        Some(op)
    }

    fn rebind_slot(&mut self, id: RebindId) -> Result<&mut Option<RebindingOperation>> {
        self.rebinds
            .get_mut(id.0 as usize)
            .filter(|slot| slot.is_some())
            .ok_or_else(|| InputError::invalid_operation(format!("Unknown rebind {}", id)))
    }

    /// Start listening
    ///
    /// Fails if the target action is enabled, or if there is nowhere to put
    /// the result (no binding to override and no `on_apply_binding`).
    pub fn start_rebind(&mut self, id: RebindId) -> Result<()> {
        let mut op = self.rebind_slot(id)?.take().ok_or_else(|| {
            InputError::invalid_operation(format!("Unknown rebind {}", id))
        })?;
        let result = self.begin_rebind(id, &mut op);
        self.rebinds[id.0 as usize] = Some(op);
        result
    }

    fn begin_rebind(&mut self, id: RebindId, op: &mut RebindingOperation) -> Result<()> {
        let expected = match op.action() {
            Some(action) => {
                let state = self.action_state(action)?;
                op.validate(Some((&state.def, state.enabled)))?;
                state.def.expected_control_type.clone()
            }
            None => {
                op.validate(None)?;
                None
            }
        };
        let env = RebindEnv {
            devices: &self.devices,
            state: &self.state,
            settings: &self.settings,
        };
        op.begin(id, &env, &mut self.monitors, expected.as_deref())
    }

    /// Stop listening and invoke `on_cancel`; no-op unless listening
    pub fn cancel_rebind(&mut self, id: RebindId) -> Result<()> {
        let mut op = self.take_listening(id)?;
        if let Some(op) = op.as_mut() {
            self.cancel_taken(id, op);
        }
        self.put_back(id, op);
        Ok(())
    }

    /// Accept the current top candidate; no-op unless listening
    pub fn complete_rebind(&mut self, id: RebindId) -> Result<()> {
        let mut op = self.take_listening(id)?;
        if let Some(op) = op.as_mut() {
            self.complete_taken(id, op);
        }
        self.put_back(id, op);
        Ok(())
    }

    /// Take a listening operation out of its slot; `None` for idle or finished ones
    fn take_listening(&mut self, id: RebindId) -> Result<Option<RebindingOperation>> {
        let slot = self.rebind_slot(id)?;
        if slot.as_ref().is_some_and(RebindingOperation::is_listening) {
            Ok(slot.take())
        } else {
            Ok(None)
        }
    }

    fn put_back(&mut self, id: RebindId, op: Option<RebindingOperation>) {
        if let (Some(op), Some(slot)) = (op, self.rebinds.get_mut(id.0 as usize)) {
            *slot = Some(op);
        }
    }

    pub(super) fn rebind_suppresses(&self, id: RebindId) -> bool {
        self.rebind(id).is_some_and(|op| op.is_listening() && op.suppresses_events())
    }

    /// Offer the current event to a session and act on what it decides
    pub(super) fn evaluate_rebind(&mut self, id: RebindId, time: f64) -> Evaluation {
        let Ok(Some(mut op)) = self.take_listening(id) else {
            return Evaluation::default();
        };
        if !op.has_pending() {
            self.put_back(id, Some(op));
            return Evaluation::default();
        }
        let env = RebindEnv {
            devices: &self.devices,
            state: &self.state,
            settings: &self.settings,
        };
        let evaluation = op.evaluate(&env, &mut self.timers, time);
        match evaluation.request {
            Some(Request::Complete) => self.complete_taken(id, &mut op),
            Some(Request::Cancel) => self.cancel_taken(id, &mut op),
            None => {}
        }
        self.put_back(id, Some(op));
        evaluation
    }

    /// Wait window elapsed
    pub(super) fn finish_rebind(&mut self, id: RebindId) {
        if let Ok(Some(mut op)) = self.take_listening(id) {
            self.complete_taken(id, &mut op);
            self.put_back(id, Some(op));
        }
    }

    fn cancel_taken(&mut self, id: RebindId, op: &mut RebindingOperation) {
        op.stop_listening(&mut self.monitors, &mut self.timers);
        op.mark_canceled();
        debug!("Rebind {} canceled", id);
    }

    fn complete_taken(&mut self, id: RebindId, op: &mut RebindingOperation) {
        let Some(selected) = op.candidates().first().cloned() else {
            warn!("Rebind {} completed without any candidate; canceling", id);
            self.cancel_taken(id, op);
            return;
        };
        let Some(path) = op.path_for(&self.devices, selected.control) else {
            warn!("Selected control of rebind {} is gone; canceling", id);
            self.cancel_taken(id, op);
            return;
        };
        op.stop_listening(&mut self.monitors, &mut self.timers);

        if !op.apply_through_callback(&path) {
            if let Some(action) = op.action() {
                self.write_rebind_result(op, action, &path);
            }
        }
        info!("Rebind {} selected {} as {}", id, selected.path, path);
        op.mark_completed(selected, path);
    }

    fn write_rebind_result(&mut self, op: &RebindingOperation, action: ActionId, path: &str) {
        let Ok(state) = self.action_state_mut(action) else {
            warn!("Rebind target {} no longer exists", action);
            return;
        };
        if op.adds_new_binding() {
            let mut binding = BindingDef::new(path);
            if let Some(group) = op.binding_group() {
                binding = binding.with_group(group);
            }
            state.def.bindings.push(binding);
        } else {
            match op.target_index(&state.def) {
                Some(index) => state.def.bindings[index].override_path = Some(path.to_string()),
                None => {
                    warn!(
                        "Rebind target binding no longer exists on action '{}'",
                        state.def.name
                    );
                    return;
                }
            }
        }
        if let Err(e) = self.refresh_action(action) {
            warn!("Failed to re-resolve action {} after rebind: {}", action, e);
        }
    }
}
