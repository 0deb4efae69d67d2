//! Interaction engine
//!
//! An interaction is a small state machine that turns actuation changes and
//! timer expiries into phase changes. The engine owns each instance's phase
//! and timer bookkeeping; the interaction only reports what happened through
//! [`InteractionContext`].
//!
//! Phase rules enforced by the context:
//! - `performed()` or `performed_and_stay_performed()` while waiting inserts
//!   the missing `Started`.
//! - If that `Started` was inserted and the interaction goes back to waiting
//!   through `performed()`, a `Canceled` closes it.
//! - `canceled()` right after a `performed()` in the same call still emits
//!   `Canceled` (perform-and-cancel together).

mod hold;
mod multi_tap;
mod params;
mod press;
mod slow_tap;
mod tap;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use hold::HoldInteraction;
pub use multi_tap::MultiTapInteraction;
pub use params::{parse_interactions, InteractionParams, InteractionSpec};
pub use press::{PressBehavior, PressInteraction};
pub use slow_tap::SlowTapInteraction;
pub use tap::TapInteraction;

use crate::config::InputSettings;
use crate::device::Value;
use crate::error::{InputError, Result};

/// Trigger phase of an interaction or action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
pub enum Phase {
    #[default]
    Waiting,
    Started,
    Performed,
    Canceled,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Waiting => "waiting",
            Phase::Started => "started",
            Phase::Performed => "performed",
            Phase::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Gesture recognizer attached to a binding
pub trait Interaction: Send {
    /// React to a change of the bound control or to an expired timeout
    fn process(&mut self, cx: &mut InteractionContext<'_>);

    /// Forget interaction-local state
    fn reset(&mut self);

    /// Custom completion in [0,1] given the progress of the current timeout
    fn timeout_completion(&self, _timer_fraction: f32) -> Option<f32> {
        None
    }
}

/// Phase change reported by an interaction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub phase: Phase,
    pub time: f64,
    pub start_time: f64,
}

/// Running timeout of an interaction
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TimerState {
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TotalTimeout {
    pub total: f64,
    pub completed: f64,
}

/// Engine-side state of one interaction instance
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct SlotState {
    pub phase: Phase,
    pub start_time: f64,
    pub timer: Option<TimerState>,
    pub total_timeout: Option<TotalTimeout>,
    implicit_start: bool,
}

impl SlotState {
    /// Completion of the running timeout in [0,1]
    pub fn completion(&self, interaction: &dyn Interaction, now: f64) -> f32 {
        match self.phase {
            Phase::Performed => 1.0,
            Phase::Waiting | Phase::Canceled => 0.0,
            Phase::Started => {
                let Some(timer) = self.timer else {
                    return 0.0;
                };
                let elapsed = (now - timer.start).max(0.0);
                let fraction = if timer.duration <= 0.0 {
                    1.0
                } else {
                    (elapsed / timer.duration).min(1.0)
                };
                if let Some(custom) = interaction.timeout_completion(fraction as f32) {
                    return custom.clamp(0.0, 1.0);
                }
                match self.total_timeout {
                    Some(total) if total.total > 0.0 => {
                        let done = total.completed + fraction * timer.duration;
                        (done / total.total).min(1.0) as f32
                    }
                    _ => fraction as f32,
                }
            }
        }
    }
}

/// What the engine should do with the scheduler after a process call
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) enum TimerRequest {
    #[default]
    Unchanged,
    Arm { expiration: f64 },
    Clear,
}

/// Input to [`Interaction::process`]
pub struct InteractionContext<'a> {
    state: &'a mut SlotState,
    settings: &'a InputSettings,
    value: Value,
    time: f64,
    timer_expired: bool,
    transitions: Vec<Transition>,
    performed_this_call: bool,
    timer_request: TimerRequest,
}

impl<'a> InteractionContext<'a> {
    pub(crate) fn new(
        state: &'a mut SlotState,
        settings: &'a InputSettings,
        value: Value,
        time: f64,
        timer_expired: bool,
    ) -> Self {
        Self {
            state,
            settings,
            value,
            time,
            timer_expired,
            transitions: Vec::new(),
            performed_this_call: false,
            timer_request: TimerRequest::Unchanged,
        }
    }

    pub(crate) fn finish(self) -> (Vec<Transition>, TimerRequest) {
        (self.transitions, self.timer_request)
    }

    pub fn settings(&self) -> &InputSettings {
        self.settings
    }

    /// Time of the event or timer pass
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Time the current `Started` phase began
    pub fn start_time(&self) -> f64 {
        self.state.start_time
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn is_waiting(&self) -> bool {
        self.state.phase == Phase::Waiting
    }

    pub fn is_started(&self) -> bool {
        self.state.phase == Phase::Started
    }

    /// Whether this call is due to the interaction's timeout expiring
    pub fn timer_has_expired(&self) -> bool {
        self.timer_expired
    }

    /// Processed value of the triggering control
    pub fn value(&self) -> Value {
        self.value
    }

    pub fn magnitude(&self) -> f32 {
        self.value.magnitude()
    }

    /// Actuation at or above `threshold`; a threshold of 0 means "any actuation"
    pub fn control_is_actuated(&self, threshold: f32) -> bool {
        let magnitude = self.magnitude();
        if threshold <= 0.0 {
            magnitude > 0.0
        } else {
            magnitude >= threshold
        }
    }

    fn push(&mut self, phase: Phase) {
        self.transitions.push(Transition {
            phase,
            time: self.time,
            start_time: self.state.start_time,
        });
    }

    fn begin(&mut self, implicit: bool) {
        self.state.phase = Phase::Started;
        self.state.start_time = self.time;
        self.state.implicit_start = implicit;
        self.push(Phase::Started);
    }

    fn stop_timers(&mut self) {
        self.state.timer = None;
        self.state.total_timeout = None;
        self.timer_request = TimerRequest::Clear;
    }

    pub fn started(&mut self) {
        if self.state.phase == Phase::Waiting {
            self.begin(false);
        }
    }

    /// Perform and go back to waiting
    pub fn performed(&mut self) {
        if self.state.phase == Phase::Waiting {
            self.begin(true);
        }
        self.push(Phase::Performed);
        self.performed_this_call = true;
        self.stop_timers();

        let implicit = self.state.implicit_start;
        self.state.phase = Phase::Waiting;
        self.state.implicit_start = false;
        if implicit {
            self.push(Phase::Canceled);
        }
    }

    /// Perform and remain performed until canceled
    pub fn performed_and_stay_performed(&mut self) {
        if self.state.phase == Phase::Waiting {
            self.begin(true);
        }
        self.push(Phase::Performed);
        self.performed_this_call = true;
        self.stop_timers();
        self.state.phase = Phase::Performed;
    }

    pub fn canceled(&mut self) {
        match self.state.phase {
            Phase::Started | Phase::Performed => {
                self.push(Phase::Canceled);
                self.state.phase = Phase::Waiting;
                self.state.implicit_start = false;
                self.stop_timers();
            }
            Phase::Waiting | Phase::Canceled => {
                let already_closed = self
                    .transitions
                    .last()
                    .is_some_and(|t| t.phase == Phase::Canceled);
                if self.performed_this_call && !already_closed {
                    self.push(Phase::Canceled);
                }
            }
        }
    }

    /// Arm (or re-arm) the interaction's timeout, relative to `time()`
    pub fn set_timeout(&mut self, seconds: f64) {
        let seconds = seconds.max(0.0);
        let total = self.state.total_timeout.as_mut();
        if let (Some(previous), Some(total)) = (self.state.timer, total) {
            total.completed += (self.time - previous.start).clamp(0.0, previous.duration);
        }
        self.state.timer = Some(TimerState {
            start: self.time,
            duration: seconds,
        });
        self.timer_request = TimerRequest::Arm {
            expiration: self.time + seconds,
        };
    }

    /// Total time the whole gesture may take, for completion reporting
    pub fn set_total_timeout_completion_time(&mut self, seconds: f64) {
        self.state.total_timeout = Some(TotalTimeout {
            total: seconds.max(0.0),
            completed: 0.0,
        });
    }
}

/// Builds an interaction from its parameters
pub type InteractionConstructor =
    Arc<dyn Fn(&InteractionParams) -> Result<Box<dyn Interaction>> + Send + Sync>;

/// Name to constructor table
#[derive(Clone)]
pub struct InteractionRegistry {
    constructors: HashMap<String, (String, InteractionConstructor)>,
}

impl Default for InteractionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionRegistry {
    /// Registry with `press`, `hold`, `tap`, `slowTap` and `multiTap`
    pub fn new() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
        };
        registry.register("press", |p| Ok(Box::new(PressInteraction::from_params(p)?)));
        registry.register("hold", |p| Ok(Box::new(HoldInteraction::from_params(p)?)));
        registry.register("tap", |p| Ok(Box::new(TapInteraction::from_params(p)?)));
        registry.register("slowTap", |p| Ok(Box::new(SlowTapInteraction::from_params(p)?)));
        registry.register("multiTap", |p| Ok(Box::new(MultiTapInteraction::from_params(p)?)));
        registry
    }

    /// Add or replace an interaction (names are case-insensitive)
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(&InteractionParams) -> Result<Box<dyn Interaction>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(name.to_ascii_lowercase(), (name.to_string(), Arc::new(constructor)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered names as written at registration
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.values().map(|(n, _)| n.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn instantiate(&self, spec: &InteractionSpec) -> Result<Box<dyn Interaction>> {
        let (_, constructor) = self
            .constructors
            .get(&spec.name.to_ascii_lowercase())
            .ok_or_else(|| InputError::UnknownInteraction {
                name: spec.name.clone(),
            })?;
        constructor(&spec.params)
    }

    /// Parse an interaction string and build every interaction in it
    pub fn instantiate_all(&self, text: &str) -> Result<Vec<(String, Box<dyn Interaction>)>> {
        parse_interactions(text)?
            .into_iter()
            .map(|spec| {
                let interaction = self.instantiate(&spec)?;
                Ok((spec.name, interaction))
            })
            .collect()
    }
}
