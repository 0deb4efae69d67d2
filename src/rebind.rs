//! Interactive rebinding
//!
//! A [`RebindingOperation`] listens to every eligible control and picks the
//! one the user actuated the most, measured from where each control stood
//! when listening began. The winner's path is then written to an action's
//! binding (or handed to a callback).
//!
//! Operations are registered with an [`InputSystem`](crate::InputSystem),
//! which owns the monitors they listen through:
//!
//! ```ignore
//! let rebind = system.add_rebind(RebindingOperation::new().with_action(jump));
//! system.start_rebind(rebind)?;
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, trace};

use crate::action::{ActionDef, ActionId};
use crate::config::InputSettings;
use crate::device::{BindingPath, ControlId, DeviceId, DeviceRegistry};
use crate::error::{InputError, Result};
use crate::monitor::{MonitorHandle, MonitorRegistry, MonitorTarget, TimeoutScheduler};
use crate::state::StateBuffers;

/// Timer index of the wait-for-another window
pub(crate) const WAIT_TIMER: usize = 0;

/// Identifier of a rebinding operation within an input system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct RebindId(pub(crate) u32);

impl fmt::Display for RebindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rebind#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RebindStatus {
    #[default]
    Idle,
    Listening,
    Completed,
    Canceled,
}

/// A control the user actuated while listening
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub control: ControlId,
    /// Instance path, e.g. `/Gamepad1/leftStick`
    pub path: String,
    pub magnitude: f32,
    /// Magnitude, minus one for synthetic controls
    pub score: f32,
    /// Magnitude the control had when listening started
    pub baseline: f32,
}

pub type RebindCallback = Box<dyn FnMut(&mut RebindingOperation) + Send>;
pub type ApplyBindingCallback = Box<dyn FnMut(&RebindingOperation, &str) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Request {
    Complete,
    Cancel,
}

/// Listening state of a started operation
#[derive(Default)]
pub(crate) struct Session {
    pub monitors: Vec<(ControlId, MonitorHandle)>,
    baselines: HashMap<ControlId, f32>,
    eligible: Vec<ControlId>,
    cancel_controls: Vec<ControlId>,
    /// Controls signalled by the event being processed
    pending: Vec<ControlId>,
    /// Monitor currently carrying the wait timer
    wait_timer: Option<MonitorHandle>,
}

/// Read access to the device model while evaluating a session
pub(crate) struct RebindEnv<'a> {
    pub devices: &'a DeviceRegistry,
    pub state: &'a StateBuffers,
    pub settings: &'a InputSettings,
}

impl RebindEnv<'_> {
    fn magnitude(&self, control: ControlId) -> f32 {
        self.devices
            .lookup(control)
            .and_then(|(device, c)| {
                self.state
                    .current(device.id())
                    .map(|state| c.magnitude(state, self.settings))
            })
            .unwrap_or(0.0)
    }
}

/// Result of offering an event to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Evaluation {
    /// Some control of the event reached the magnitude threshold
    pub matched: bool,
    pub request: Option<Request>,
}

/// Interactive rebind
pub struct RebindingOperation {
    action: Option<ActionId>,
    target_binding: Option<usize>,
    binding_group: Option<String>,
    add_new_binding: bool,
    expected_control_type: Option<String>,
    include_paths: Vec<String>,
    exclude_paths: Vec<String>,
    cancel_paths: Vec<String>,
    magnitude_threshold: f32,
    wait_time: f64,
    ignore_noisy: bool,
    generalize: bool,
    suppress: bool,
    on_potential_match: Option<RebindCallback>,
    on_complete: Option<RebindCallback>,
    on_cancel: Option<RebindCallback>,
    on_apply_binding: Option<ApplyBindingCallback>,

    status: RebindStatus,
    candidates: Vec<Candidate>,
    selected: Option<Candidate>,
    selected_path: Option<String>,
    request: Option<Request>,
    pub(crate) session: Option<Session>,
}

impl Default for RebindingOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RebindingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RebindingOperation")
            .field("action", &self.action)
            .field("status", &self.status)
            .field("candidates", &self.candidates)
            .field("selected_path", &self.selected_path)
            .finish_non_exhaustive()
    }
}

impl RebindingOperation {
    pub fn new() -> Self {
        Self {
            action: None,
            target_binding: None,
            binding_group: None,
            add_new_binding: false,
            expected_control_type: None,
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            cancel_paths: Vec::new(),
            magnitude_threshold: default_magnitude_threshold(),
            wait_time: 0.0,
            ignore_noisy: true,
            generalize: true,
            suppress: false,
            on_potential_match: None,
            on_complete: None,
            on_cancel: None,
            on_apply_binding: None,
            status: RebindStatus::Idle,
            candidates: Vec::new(),
            selected: None,
            selected_path: None,
            request: None,
            session: None,
        }
    }

    // Builder

    pub fn with_action(mut self, action: ActionId) -> Self {
        self.action = Some(action);
        self
    }

    /// Write the result to this binding index instead of the first one
    pub fn with_target_binding(mut self, index: usize) -> Self {
        self.target_binding = Some(index);
        self
    }

    /// Target the first binding in `group`; new bindings join it
    pub fn with_binding_group(mut self, group: impl Into<String>) -> Self {
        self.binding_group = Some(group.into());
        self
    }

    /// Append the result as a new binding instead of overriding one
    pub fn with_rebind_adding_new_binding(mut self, group: Option<&str>) -> Self {
        self.add_new_binding = true;
        if let Some(group) = group {
            self.binding_group = Some(group.to_string());
        }
        self
    }

    pub fn with_expected_control_type(mut self, kind: impl Into<String>) -> Self {
        self.expected_control_type = Some(kind.into());
        self
    }

    /// Only consider controls under one of these paths
    pub fn with_controls_having_to_match_path(mut self, path: impl Into<String>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    pub fn with_controls_excluding(mut self, path: impl Into<String>) -> Self {
        self.exclude_paths.push(path.into());
        self
    }

    /// Cancel when a control under `path` is pressed
    pub fn with_canceling_through(mut self, path: impl Into<String>) -> Self {
        self.cancel_paths.push(path.into());
        self
    }

    /// Minimum actuation gain over the starting level
    pub fn with_magnitude_having_to_be_greater_than(mut self, magnitude: f32) -> Self {
        self.magnitude_threshold = magnitude.max(0.0);
        self
    }

    /// Keep listening `seconds` after the last new candidate before completing
    pub fn on_match_wait_for_another(mut self, seconds: f64) -> Self {
        self.wait_time = seconds.max(0.0);
        self
    }

    pub fn without_ignoring_noisy_controls(mut self) -> Self {
        self.ignore_noisy = false;
        self
    }

    /// Use the instance path (`/Gamepad1/buttonSouth`) of the selected control
    pub fn without_generalizing_path_of_selected_control(mut self) -> Self {
        self.generalize = false;
        self
    }

    /// Swallow events that produce a candidate
    ///
    /// The device state is rolled back to what it was before such an event,
    /// so nothing else observes it.
    pub fn with_matching_events_being_suppressed(mut self) -> Self {
        self.suppress = true;
        self
    }

    /// Called whenever the candidate list changes
    ///
    /// When set, completion is up to the callback (or the wait window);
    /// the first candidate no longer completes the operation by itself.
    pub fn on_potential_match(
        mut self,
        callback: impl FnMut(&mut RebindingOperation) + Send + 'static,
    ) -> Self {
        self.on_potential_match = Some(Box::new(callback));
        self
    }

    pub fn on_complete(
        mut self,
        callback: impl FnMut(&mut RebindingOperation) + Send + 'static,
    ) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn on_cancel(
        mut self,
        callback: impl FnMut(&mut RebindingOperation) + Send + 'static,
    ) -> Self {
        self.on_cancel = Some(Box::new(callback));
        self
    }

    /// Take over applying the selected path; no binding is modified
    pub fn on_apply_binding(
        mut self,
        callback: impl FnMut(&RebindingOperation, &str) + Send + 'static,
    ) -> Self {
        self.on_apply_binding = Some(Box::new(callback));
        self
    }

    // Callback-side controls

    /// Ask for completion with the current top candidate
    pub fn complete(&mut self) {
        self.request = Some(Request::Complete);
    }

    pub fn cancel(&mut self) {
        self.request = Some(Request::Cancel);
    }

    pub fn remove_candidate(&mut self, control: ControlId) {
        self.candidates.retain(|c| c.control != control);
    }

    /// Add or replace a candidate; its score is the given magnitude
    pub fn add_candidate(&mut self, control: ControlId, magnitude: f32) {
        let path = self
            .candidates
            .iter()
            .find(|c| c.control == control)
            .map(|c| c.path.clone())
            .unwrap_or_else(|| control.to_string());
        self.remove_candidate(control);
        self.candidates.push(Candidate {
            control,
            path,
            magnitude,
            score: magnitude,
            baseline: 0.0,
        });
        sort_candidates(&mut self.candidates);
    }

    // Queries

    pub fn action(&self) -> Option<ActionId> {
        self.action
    }

    pub fn status(&self) -> RebindStatus {
        self.status
    }

    pub fn started(&self) -> bool {
        self.status != RebindStatus::Idle
    }

    pub fn completed(&self) -> bool {
        self.status == RebindStatus::Completed
    }

    pub fn canceled(&self) -> bool {
        self.status == RebindStatus::Canceled
    }

    pub fn is_listening(&self) -> bool {
        self.status == RebindStatus::Listening
    }

    /// Candidates, best first
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn scores(&self) -> Vec<f32> {
        self.candidates.iter().map(|c| c.score).collect()
    }

    pub fn magnitudes(&self) -> Vec<f32> {
        self.candidates.iter().map(|c| c.magnitude).collect()
    }

    /// Top candidate while listening, the accepted control afterwards
    pub fn selected_control(&self) -> Option<ControlId> {
        match self.status {
            RebindStatus::Listening => self.candidates.first().map(|c| c.control),
            _ => self.selected.as_ref().map(|c| c.control),
        }
    }

    /// Path written on completion
    pub fn selected_path(&self) -> Option<&str> {
        self.selected_path.as_deref()
    }

    pub fn magnitude_threshold(&self) -> f32 {
        self.magnitude_threshold
    }

    pub(crate) fn suppresses_events(&self) -> bool {
        self.suppress
    }

    pub(crate) fn has_apply_callback(&self) -> bool {
        self.on_apply_binding.is_some()
    }

    pub(crate) fn adds_new_binding(&self) -> bool {
        self.add_new_binding
    }

    pub(crate) fn binding_group(&self) -> Option<&str> {
        self.binding_group.as_deref()
    }

    /// Binding index an override goes to
    pub(crate) fn target_index(&self, action: &ActionDef) -> Option<usize> {
        if let Some(index) = self.target_binding {
            return (index < action.bindings.len()).then_some(index);
        }
        if let Some(group) = &self.binding_group {
            return action.bindings.iter().position(|b| b.in_group(group));
        }
        (!action.bindings.is_empty()).then_some(0)
    }

    /// Check that the operation can start against `action` (definition, enabled)
    pub(crate) fn validate(&self, action: Option<(&ActionDef, bool)>) -> Result<()> {
        if self.is_listening() {
            return Err(InputError::invalid_operation("Rebind is already listening"));
        }
        if let Some((def, enabled)) = action {
            if enabled {
                return Err(InputError::ActionEnabled {
                    action: def.name.clone(),
                });
            }
        }
        if self.has_apply_callback() {
            return Ok(());
        }
        match action {
            None => Err(InputError::invalid_operation(
                "Rebind without an action needs an on_apply_binding callback",
            )),
            Some(_) if self.add_new_binding => Ok(()),
            Some((def, _)) => match self.target_index(def) {
                Some(_) => Ok(()),
                None if def.bindings.is_empty() => Err(InputError::invalid_operation(format!(
                    "Action '{}' has no binding to rebind; add one or use on_apply_binding",
                    def.name
                ))),
                None => Err(InputError::invalid_operation(format!(
                    "Action '{}' has no binding matching the rebind target",
                    def.name
                ))),
            },
        }
    }

    /// Start listening: record baselines and put a monitor on every eligible control
    pub(crate) fn begin(
        &mut self,
        id: RebindId,
        env: &RebindEnv<'_>,
        monitors: &mut MonitorRegistry,
        expected_type: Option<&str>,
    ) -> Result<()> {
        let parse_all = |paths: &[String]| -> Result<Vec<BindingPath>> {
            paths.iter().map(|p| BindingPath::parse(p)).collect()
        };
        let include = parse_all(&self.include_paths)?;
        let exclude = parse_all(&self.exclude_paths)?;
        let cancel = parse_all(&self.cancel_paths)?;
        let expected = self.expected_control_type.as_deref().or(expected_type);

        let mut session = Session::default();
        for control in env.devices.all_controls() {
            let id_ = control.id();
            let under = |paths: &[BindingPath]| {
                paths.iter().any(|p| env.devices.matches_prefix(p, id_))
            };

            let cancels = under(&cancel);
            if cancels {
                session.cancel_controls.push(id_);
            }

            let eligible = (include.is_empty() || under(&include))
                && !under(&exclude)
                && !(self.ignore_noisy && control.noisy)
                && expected.map_or(true, |kind| control.kind.is_a(kind));
            if eligible {
                session.eligible.push(id_);
                session.baselines.insert(id_, env.magnitude(id_));
            }

            if eligible || cancels {
                let handle = monitors.add(env.devices, id_, 0, MonitorTarget::Rebind(id))?;
                session.monitors.push((id_, handle));
            }
        }

        debug!(
            "Rebind {} listening on {} control(s)",
            id,
            session.eligible.len()
        );
        self.candidates.clear();
        self.selected = None;
        self.selected_path = None;
        self.request = None;
        self.session = Some(session);
        self.status = RebindStatus::Listening;
        Ok(())
    }

    /// Remember that `control` changed during the current event
    pub(crate) fn note_change(&mut self, control: ControlId) {
        if let Some(session) = &mut self.session {
            if !session.pending.contains(&control) {
                session.pending.push(control);
            }
        }
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.pending.is_empty())
    }

    /// Process the controls signalled by the last event
    pub(crate) fn evaluate(
        &mut self,
        env: &RebindEnv<'_>,
        timers: &mut TimeoutScheduler,
        time: f64,
    ) -> Evaluation {
        let mut evaluation = Evaluation::default();
        let Some(session) = self.session.as_mut() else {
            return evaluation;
        };
        let pending = std::mem::take(&mut session.pending);

        let press = env.settings.effective_press_point();
        if pending
            .iter()
            .any(|c| session.cancel_controls.contains(c) && env.magnitude(*c) >= press)
        {
            evaluation.matched = true;
            evaluation.request = Some(Request::Cancel);
            return evaluation;
        }

        let mut changed = false;
        let mut newest = None;
        for control in pending {
            if !session.eligible.contains(&control) {
                continue;
            }
            let Some((device, c)) = env.devices.lookup(control) else {
                continue;
            };
            let magnitude = env.magnitude(control);
            let baseline = session.baselines.entry(control).or_insert(magnitude);
            // Releasing below the starting level lowers the bar
            if magnitude < *baseline {
                *baseline = magnitude;
            }
            let baseline = *baseline;

            if magnitude - baseline < self.magnitude_threshold {
                continue;
            }
            evaluation.matched = true;
            let score = if c.synthetic { magnitude - 1.0 } else { magnitude };
            match self.candidates.iter_mut().find(|k| k.control == control) {
                // Candidates only ever improve; letting go keeps them listed
                Some(existing) if score > existing.score => {
                    existing.magnitude = magnitude;
                    existing.score = score;
                    changed = true;
                }
                Some(_) => {}
                None => {
                    let path = device.control_path(c);
                    trace!("Rebind candidate {} (magnitude {:.3})", path, magnitude);
                    self.candidates.push(Candidate {
                        control,
                        path,
                        magnitude,
                        score,
                        baseline,
                    });
                    newest = Some(control);
                    changed = true;
                }
            }
        }

        if !changed {
            return evaluation;
        }
        sort_candidates(&mut self.candidates);

        if let Some(mut callback) = self.on_potential_match.take() {
            callback(self);
            if self.on_potential_match.is_none() {
                self.on_potential_match = Some(callback);
            }
        } else if self.wait_time <= 0.0 && !self.candidates.is_empty() {
            self.request.get_or_insert(Request::Complete);
        }

        if self.request.is_none() && self.wait_time > 0.0 {
            if let Some(control) = newest {
                self.arm_wait_timer(timers, control, time);
            }
        }
        evaluation.request = self.request.take();
        evaluation
    }

    fn arm_wait_timer(&mut self, timers: &mut TimeoutScheduler, control: ControlId, time: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(&(_, handle)) = session.monitors.iter().find(|(c, _)| *c == control) else {
            return;
        };
        if let Some(previous) = session.wait_timer.take() {
            timers.remove(previous, WAIT_TIMER);
        }
        timers.add(control, handle, time + self.wait_time, WAIT_TIMER);
        session.wait_timer = Some(handle);
    }

    /// Drop candidates and baselines of a removed device
    pub(crate) fn forget_device(&mut self, device: DeviceId) {
        self.candidates.retain(|c| c.control.device != device);
        if let Some(session) = &mut self.session {
            session.monitors.retain(|(c, _)| c.device != device);
            session.eligible.retain(|c| c.device != device);
            session.cancel_controls.retain(|c| c.device != device);
            session.baselines.retain(|c, _| c.device != device);
        }
    }

    /// Path to write for the top candidate
    pub(crate) fn path_for(&self, devices: &DeviceRegistry, control: ControlId) -> Option<String> {
        let (device, c) = devices.lookup(control)?;
        if !self.generalize {
            return Some(device.control_path(c));
        }
        let layout = devices.layouts().generalized_layout(&device.layout, &c.name);
        let usages: String = device.usages.iter().map(|u| format!("{{{}}}", u)).collect();
        Some(format!("<{}>{}/{}", layout, usages, c.name))
    }

    /// Release monitors and timers of the session
    pub(crate) fn stop_listening(
        &mut self,
        monitors: &mut MonitorRegistry,
        timers: &mut TimeoutScheduler,
    ) {
        if let Some(session) = self.session.take() {
            for (_, handle) in session.monitors {
                timers.remove_for_monitor(handle);
                monitors.remove(handle);
            }
        }
        self.request = None;
    }

    /// Finish as completed with `selected` and invoke `on_complete`
    pub(crate) fn mark_completed(&mut self, selected: Candidate, path: String) {
        self.selected = Some(selected);
        self.selected_path = Some(path);
        self.status = RebindStatus::Completed;
        if let Some(mut callback) = self.on_complete.take() {
            callback(self);
            self.on_complete.get_or_insert(callback);
        }
        // Requests made from on_complete have nothing left to act on
        self.request = None;
    }

    pub(crate) fn mark_canceled(&mut self) {
        self.candidates.clear();
        self.selected = None;
        self.status = RebindStatus::Canceled;
        if let Some(mut callback) = self.on_cancel.take() {
            callback(self);
            self.on_cancel.get_or_insert(callback);
        }
        self.request = None;
    }

    /// Hand the path to `on_apply_binding`; false if there is no such callback
    pub(crate) fn apply_through_callback(&mut self, path: &str) -> bool {
        let Some(mut callback) = self.on_apply_binding.take() else {
            return false;
        };
        callback(self, path);
        self.on_apply_binding.get_or_insert(callback);
        true
    }
}

/// Best score first; equal scores keep their arrival order
fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
}

fn default_magnitude_threshold() -> f32 { 0.2 }
