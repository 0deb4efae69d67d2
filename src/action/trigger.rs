//! Trigger state machine
//!
//! Every resolved control of an action gets its own interaction instances and
//! a chain cursor. While the cursor is free, a change is offered to the
//! interactions in order and the first one to report a phase change claims
//! the cursor. If the claiming interaction cancels without having performed,
//! the gesture is handed to the next interaction in the chain, which is
//! replayed from the canceled interaction's start time.
//!
//! While an action is in progress it is driven by one bound control. Another
//! control takes over once it is actuated further than the driving one, and
//! a driving control that falls below another hands the action to the most
//! actuated one. Hand-over requires both controls to run the same
//! interactions; their interaction state and timers move with the action.

use tracing::{debug, trace};

use super::{ActionDef, ActionEvent, ActionId, ActionKind, ActionListener};
use crate::config::InputSettings;
use crate::device::{BindingPath, ControlId, DeviceRegistry, Value};
use crate::error::Result;
use crate::interactions::{
    Interaction, InteractionContext, InteractionRegistry, Phase, SlotState, TimerRequest,
    Transition,
};
use crate::monitor::{MonitorHandle, MonitorRegistry, MonitorTarget, TimeoutScheduler};
use crate::state::StateBuffers;

pub(crate) struct InteractionSlot {
    pub name: String,
    pub interaction: Box<dyn Interaction>,
    pub state: SlotState,
}

/// A control an action is listening to
pub(crate) struct BoundControl {
    /// Stable across re-resolution; used as the monitor's owner index
    pub key: usize,
    pub binding: usize,
    pub control: ControlId,
    pub monitor: MonitorHandle,
    pub slots: Vec<InteractionSlot>,
    pub cursor: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct TriggerState {
    pub phase: Phase,
    pub start_time: f64,
    pub time: f64,
    /// Key of the driving bound control
    pub bound: Option<usize>,
    pub interaction: Option<usize>,
    pub control: Option<ControlId>,
}

/// Everything a trigger update reads or schedules
pub(crate) struct TriggerEnv<'a> {
    pub devices: &'a DeviceRegistry,
    pub state: &'a StateBuffers,
    pub settings: &'a InputSettings,
    pub timers: &'a mut TimeoutScheduler,
    pub update: u64,
}

impl TriggerEnv<'_> {
    pub fn read_value(&self, control: ControlId) -> Value {
        self.devices
            .lookup(control)
            .and_then(|(device, c)| {
                self.state
                    .current(device.id())
                    .map(|state| c.read_value(state, self.settings))
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy)]
struct Stimulus {
    time: f64,
    value: Value,
    expired: bool,
}

/// Runtime state of one action
pub(crate) struct ActionState {
    pub id: ActionId,
    pub def: ActionDef,
    pub enabled: bool,
    pub bound: Vec<BoundControl>,
    pub trigger: TriggerState,
    pub listeners: Vec<ActionListener>,
    pub performed_in_update: Option<u64>,
    next_key: usize,
}

impl ActionState {
    pub fn new(id: ActionId, def: ActionDef) -> Self {
        Self {
            id,
            def,
            enabled: false,
            bound: Vec::new(),
            trigger: TriggerState::default(),
            listeners: Vec::new(),
            performed_in_update: None,
            next_key: 0,
        }
    }

    fn bound_index(&self, key: usize) -> Option<usize> {
        self.bound.iter().position(|b| b.key == key)
    }

    pub fn controls(&self) -> Vec<ControlId> {
        self.bound.iter().map(|b| b.control).collect()
    }

    /// Resolve every binding and register monitors on new controls
    ///
    /// Controls that were already bound keep their monitor and interaction
    /// state. Interaction strings are validated even for bindings that
    /// currently match nothing.
    pub fn resolve(
        &mut self,
        devices: &DeviceRegistry,
        monitors: &mut MonitorRegistry,
        timers: &mut TimeoutScheduler,
        interactions: &InteractionRegistry,
    ) -> Result<()> {
        let mut plan = Vec::new();
        for (index, binding) in self.def.bindings.iter().enumerate() {
            let chain = self.def.interactions_for(index);
            interactions.instantiate_all(&chain)?;
            let path = BindingPath::parse(binding.effective_path())?;
            for control in devices.find_controls(&path) {
                plan.push((index, control, chain.clone()));
            }
        }

        let mut previous = std::mem::take(&mut self.bound);
        let mut bound = Vec::with_capacity(plan.len());
        for (binding, control, chain) in plan {
            let reusable = previous.iter().position(|b| {
                b.binding == binding && b.control == control && monitors.is_alive(b.monitor)
            });
            if let Some(position) = reusable {
                bound.push(previous.swap_remove(position));
                continue;
            }

            let slots = interactions
                .instantiate_all(&chain)?
                .into_iter()
                .map(|(name, interaction)| InteractionSlot {
                    name,
                    interaction,
                    state: SlotState::default(),
                })
                .collect();
            let key = self.next_key;
            self.next_key += 1;
            let monitor = monitors.add(devices, control, key, MonitorTarget::Action(self.id))?;
            bound.push(BoundControl {
                key,
                binding,
                control,
                monitor,
                slots,
                cursor: None,
            });
        }

        for stale in previous {
            timers.remove_for_monitor(stale.monitor);
            monitors.remove(stale.monitor);
            if self.trigger.bound == Some(stale.key) {
                // Driving control is gone
                self.trigger = TriggerState::default();
            }
        }

        debug!(
            "Resolved action '{}' to {} control(s)",
            self.def.name,
            bound.len()
        );
        self.bound = bound;
        Ok(())
    }

    /// Drop every monitor and forget all trigger state, emitting `Canceled`
    /// if the action was in progress
    pub fn disable(
        &mut self,
        env: &mut TriggerEnv<'_>,
        monitors: &mut MonitorRegistry,
        time: f64,
    ) -> Vec<ActionEvent> {
        let mut events = Vec::new();
        if self.trigger.phase != Phase::Waiting {
            if let Some(control) = self.trigger.control {
                let interaction = self.driving_interaction_name();
                let value = env.read_value(control).zero_like();
                let transition = Transition {
                    phase: Phase::Canceled,
                    time,
                    start_time: self.trigger.start_time,
                };
                self.record(env, &mut events, transition, interaction.as_deref(), control, value);
            }
        }

        for bound in self.bound.drain(..) {
            env.timers.remove_for_monitor(bound.monitor);
            monitors.remove(bound.monitor);
        }
        self.trigger = TriggerState::default();
        self.enabled = false;
        events
    }

    fn driving_interaction_name(&self) -> Option<String> {
        let b = self.bound_index(self.trigger.bound?)?;
        let slot = self.bound[b].slots.get(self.trigger.interaction?)?;
        Some(slot.name.clone())
    }

    /// A bound control changed
    pub fn on_change(
        &mut self,
        env: &mut TriggerEnv<'_>,
        key: usize,
        time: f64,
    ) -> Vec<ActionEvent> {
        let mut events = Vec::new();
        let Some(mut b) = self.bound_index(key) else {
            return events;
        };
        let control = self.bound[b].control;
        let mut value = env.read_value(control);
        let has_interactions = !self.bound[b].slots.is_empty();

        if self.def.kind == ActionKind::PassThrough && !has_interactions {
            self.trigger = TriggerState {
                phase: Phase::Performed,
                start_time: time,
                time,
                bound: Some(key),
                interaction: None,
                control: Some(control),
            };
            let transition = Transition {
                phase: Phase::Performed,
                time,
                start_time: time,
            };
            self.record(env, &mut events, transition, None, control, value);
            return events;
        }

        if self.trigger.phase != Phase::Waiting {
            let Some(driver) = self.trigger.bound.and_then(|k| self.bound_index(k)) else {
                return events;
            };
            let driving = env.read_value(self.bound[driver].control).magnitude();
            if driver != b {
                if self.strongest_other(env, driver, driving) != Some(b) {
                    trace!(
                        "Action '{}' ignores {} while driven by another control",
                        self.def.name,
                        env.devices.control_path(control)
                    );
                    return events;
                }
                self.hand_over(env, driver, b);
            } else if let Some(other) = self.strongest_other(env, b, driving) {
                self.hand_over(env, b, other);
                b = other;
                value = env.read_value(self.bound[b].control);
            }
        }

        let stimulus = Stimulus {
            time,
            value,
            expired: false,
        };
        if has_interactions {
            self.run_interactions(env, b, stimulus, None, &mut events);
        } else {
            self.default_behavior(env, b, stimulus, &mut events);
        }
        events
    }

    /// Bound control other than `driver` actuated beyond `floor` that the
    /// action can be handed to; the most actuated one wins
    fn strongest_other(&self, env: &TriggerEnv<'_>, driver: usize, floor: f32) -> Option<usize> {
        let chain = |b: usize| self.bound[b].slots.iter().map(|slot| slot.name.as_str());
        let mut best = None;
        let mut best_magnitude = floor;
        for (b, bound) in self.bound.iter().enumerate() {
            if b == driver || !chain(b).eq(chain(driver)) {
                continue;
            }
            let magnitude = env.read_value(bound.control).magnitude();
            if magnitude > best_magnitude {
                best = Some(b);
                best_magnitude = magnitude;
            }
        }
        best
    }

    /// Move the running gesture from bound control `from` to `to`
    fn hand_over(&mut self, env: &mut TriggerEnv<'_>, from: usize, to: usize) {
        let old_monitor = self.bound[from].monitor;
        let new_monitor = self.bound[to].monitor;
        let new_control = self.bound[to].control;

        env.timers.remove_for_monitor(new_monitor);
        for k in 0..self.bound[from].slots.len() {
            if let Some(expiration) = env.timers.get(old_monitor, k).map(|entry| entry.expiration) {
                env.timers.remove(old_monitor, k);
                env.timers.add(new_control, new_monitor, expiration, k);
            }
        }

        let running = std::mem::take(&mut self.bound[from].slots);
        self.bound[from].slots = std::mem::replace(&mut self.bound[to].slots, running);
        self.bound[to].cursor = self.bound[from].cursor.take();
        for k in 0..self.bound[from].slots.len() {
            self.reset_slot(env, from, k);
        }

        debug!(
            "Action '{}' handed from {} to {}",
            self.def.name,
            env.devices.control_path(self.bound[from].control),
            env.devices.control_path(new_control)
        );
        self.trigger.bound = Some(self.bound[to].key);
        self.trigger.control = Some(new_control);
    }

    /// A timeout armed by interaction `slot` of a bound control expired
    pub fn on_timer(
        &mut self,
        env: &mut TriggerEnv<'_>,
        key: usize,
        slot: usize,
        time: f64,
    ) -> Vec<ActionEvent> {
        let mut events = Vec::new();
        let Some(b) = self.bound_index(key) else {
            return events;
        };
        if slot >= self.bound[b].slots.len() {
            return events;
        }
        if self.trigger.phase != Phase::Waiting && self.trigger.bound != Some(key) {
            return events;
        }
        let value = env.read_value(self.bound[b].control);
        let stimulus = Stimulus {
            time,
            value,
            expired: true,
        };
        self.run_interactions(env, b, stimulus, Some(slot), &mut events);
        events
    }

    fn default_behavior(
        &mut self,
        env: &mut TriggerEnv<'_>,
        b: usize,
        input: Stimulus,
        events: &mut Vec<ActionEvent>,
    ) {
        let key = self.bound[b].key;
        let control = self.bound[b].control;
        let value = input.value;

        let (press, release) = match self.def.kind {
            ActionKind::Button => {
                let press = env.settings.effective_press_point();
                (press, env.settings.release_point(press))
            }
            // Any actuation counts
            _ => (f32::MIN_POSITIVE, 0.0),
        };
        let magnitude = value.magnitude();
        let at = |phase| Transition {
            phase,
            time: input.time,
            start_time: input.time,
        };

        match self.trigger.phase {
            Phase::Waiting if magnitude >= press => {
                self.trigger = TriggerState {
                    phase: Phase::Performed,
                    start_time: input.time,
                    time: input.time,
                    bound: Some(key),
                    interaction: None,
                    control: Some(control),
                };
                self.record(env, events, at(Phase::Started), None, control, value);
                self.record(env, events, at(Phase::Performed), None, control, value);
            }
            Phase::Started | Phase::Performed if magnitude <= release => {
                let transition = Transition {
                    start_time: self.trigger.start_time,
                    ..at(Phase::Canceled)
                };
                self.trigger = TriggerState::default();
                self.record(env, events, transition, None, control, value.zero_like());
            }
            Phase::Started | Phase::Performed if self.def.kind == ActionKind::Value => {
                self.trigger.phase = Phase::Performed;
                self.trigger.time = input.time;
                let transition = Transition {
                    start_time: self.trigger.start_time,
                    ..at(Phase::Performed)
                };
                self.record(env, events, transition, None, control, value);
            }
            _ => {}
        }
    }

    fn run_interactions(
        &mut self,
        env: &mut TriggerEnv<'_>,
        b: usize,
        input: Stimulus,
        expired: Option<usize>,
        events: &mut Vec<ActionEvent>,
    ) {
        let candidates: Vec<usize> = match (expired, self.bound[b].cursor) {
            (Some(slot), Some(cursor)) if slot != cursor => return,
            (Some(slot), _) => vec![slot],
            (None, Some(cursor)) => vec![cursor],
            (None, None) => (0..self.bound[b].slots.len()).collect(),
        };
        for k in candidates {
            if self.process_slot(env, b, k, input, events) {
                break;
            }
        }
    }

    /// Run one interaction; returns whether it reported any phase change
    fn process_slot(
        &mut self,
        env: &mut TriggerEnv<'_>,
        b: usize,
        k: usize,
        input: Stimulus,
        events: &mut Vec<ActionEvent>,
    ) -> bool {
        let key = self.bound[b].key;
        let control = self.bound[b].control;
        let monitor = self.bound[b].monitor;
        let phase_before = self.bound[b].slots[k].state.phase;

        let (transitions, request) = {
            let slot = &mut self.bound[b].slots[k];
            let mut cx = InteractionContext::new(
                &mut slot.state,
                env.settings,
                input.value,
                input.time,
                input.expired,
            );
            slot.interaction.process(&mut cx);
            cx.finish()
        };
        match request {
            TimerRequest::Arm { expiration } => env.timers.add(control, monitor, expiration, k),
            TimerRequest::Clear => env.timers.remove(monitor, k),
            TimerRequest::Unchanged => {}
        }
        if transitions.is_empty() {
            return false;
        }

        self.bound[b].cursor = Some(k);
        let name = self.bound[b].slots[k].name.clone();
        let mut performed = phase_before == Phase::Performed;
        let mut canceled = None;
        for transition in &transitions {
            let reported = match transition.phase {
                Phase::Started => {
                    self.trigger = TriggerState {
                        phase: Phase::Started,
                        start_time: transition.start_time,
                        time: transition.time,
                        bound: Some(key),
                        interaction: Some(k),
                        control: Some(control),
                    };
                    input.value
                }
                Phase::Performed => {
                    performed = true;
                    self.trigger.phase = Phase::Performed;
                    self.trigger.time = transition.time;
                    input.value
                }
                Phase::Canceled => {
                    canceled = Some(*transition);
                    self.trigger.phase = Phase::Waiting;
                    input.value.zero_like()
                }
                Phase::Waiting => input.value,
            };
            self.record(env, events, *transition, Some(&name), control, reported);
        }

        let slot_phase = self.bound[b].slots[k].state.phase;
        if slot_phase != Phase::Waiting {
            self.trigger.phase = slot_phase;
            return true;
        }

        self.reset_slot(env, b, k);
        if let (Some(cancel), false) = (canceled, performed) {
            self.trigger = TriggerState::default();
            let current = env.read_value(control);
            for next in k + 1..self.bound[b].slots.len() {
                self.reset_slot(env, b, next);
                let replay = Stimulus {
                    time: cancel.start_time,
                    value: current,
                    expired: false,
                };
                if self.process_slot(env, b, next, replay, events) {
                    return true;
                }
            }
        }
        self.finish_gesture(env, b);
        true
    }

    fn reset_slot(&mut self, env: &mut TriggerEnv<'_>, b: usize, k: usize) {
        let bound = &mut self.bound[b];
        env.timers.remove(bound.monitor, k);
        if let Some(slot) = bound.slots.get_mut(k) {
            slot.interaction.reset();
            slot.state = SlotState::default();
        }
    }

    fn finish_gesture(&mut self, env: &mut TriggerEnv<'_>, b: usize) {
        for k in 0..self.bound[b].slots.len() {
            self.reset_slot(env, b, k);
        }
        self.bound[b].cursor = None;
        self.trigger = TriggerState::default();
    }

    fn record(
        &mut self,
        env: &TriggerEnv<'_>,
        events: &mut Vec<ActionEvent>,
        transition: Transition,
        interaction: Option<&str>,
        control: ControlId,
        value: Value,
    ) {
        if transition.phase == Phase::Performed {
            self.performed_in_update = Some(env.update);
        }
        let control_path = env.devices.control_path(control);
        trace!(
            "Action '{}' {} via {} at {:.3}",
            self.def.name,
            transition.phase,
            control_path,
            transition.time
        );
        events.push(ActionEvent {
            action: self.id,
            action_name: self.def.name.clone(),
            phase: transition.phase,
            interaction: interaction.map(str::to_string),
            control,
            control_path,
            time: transition.time,
            start_time: transition.start_time,
            value,
        });
    }

    /// Completion in [0,1] of the timeout tracked by the driving interaction
    pub fn completion(&self, now: f64) -> f32 {
        let slot = self
            .trigger
            .bound
            .zip(self.trigger.interaction)
            .and_then(|(key, k)| self.bound.get(self.bound_index(key)?)?.slots.get(k));
        match slot {
            Some(slot) => slot.state.completion(slot.interaction.as_ref(), now),
            None if self.trigger.phase == Phase::Performed => 1.0,
            None => 0.0,
        }
    }

    pub fn was_performed_in(&self, update: u64) -> bool {
        self.performed_in_update == Some(update)
    }
}
