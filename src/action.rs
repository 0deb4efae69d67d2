//! Actions
//!
//! An action is a named set of bindings. Enabling it resolves every binding
//! path to controls, instantiates the binding's interactions per control and
//! puts a change monitor on each control. Monitor notifications then drive
//! the action's trigger state machine (see [`trigger`]).

mod trace;
pub(crate) mod trigger;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use trace::ActionTrace;

use crate::device::{ControlId, Value};
use crate::interactions::Phase;

/// Identifier of an action within an input system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct ActionId(pub(crate) u32);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action#{}", self.0)
    }
}

/// How an action reacts to its controls when no interaction is present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum ActionKind {
    /// Started + Performed when the press point is crossed, Canceled on release
    #[default]
    Button,
    /// Started + Performed on actuation, Performed again on every change
    Value,
    /// Performed on every change, no Started or Canceled
    PassThrough,
}

/// One binding of an action
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct BindingDef {
    pub path: String,
    /// Replaces `path` during resolution when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_path: Option<String>,
    /// Interaction chain, e.g. `"tap,slowTap"`
    #[serde(default)]
    pub interactions: String,
    /// Binding groups (control schemes), e.g. `["Gamepad"]`
    #[serde(default)]
    pub groups: Vec<String>,
}

impl BindingDef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_interactions(mut self, interactions: impl Into<String>) -> Self {
        self.interactions = interactions.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Path used for resolution
    pub fn effective_path(&self) -> &str {
        self.override_path.as_deref().unwrap_or(&self.path)
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g.eq_ignore_ascii_case(group))
    }
}

/// Declarative description of an action
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ActionDef {
    pub name: String,
    #[serde(default)]
    pub kind: ActionKind,
    /// Control kind the action expects (`Button`, `Axis`, `Stick`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_control_type: Option<String>,
    /// Interactions applied after each binding's own interactions
    #[serde(default)]
    pub interactions: String,
    #[serde(default)]
    pub bindings: Vec<BindingDef>,
}

impl ActionDef {
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Self::default()
        }
    }

    pub fn button(name: impl Into<String>) -> Self {
        Self::new(name, ActionKind::Button)
    }

    pub fn value(name: impl Into<String>) -> Self {
        Self::new(name, ActionKind::Value)
    }

    pub fn pass_through(name: impl Into<String>) -> Self {
        Self::new(name, ActionKind::PassThrough)
    }

    pub fn with_binding(self, path: impl Into<String>) -> Self {
        self.with_binding_def(BindingDef::new(path))
    }

    pub fn with_binding_def(mut self, binding: BindingDef) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn with_interactions(mut self, interactions: impl Into<String>) -> Self {
        self.interactions = interactions.into();
        self
    }

    pub fn with_expected_control_type(mut self, kind: impl Into<String>) -> Self {
        self.expected_control_type = Some(kind.into());
        self
    }

    /// Interaction string for a binding: the binding's own, then the action's
    pub fn interactions_for(&self, binding: usize) -> String {
        let own = self
            .bindings
            .get(binding)
            .map(|b| b.interactions.trim())
            .unwrap_or_default();
        let shared = self.interactions.trim();
        match (own.is_empty(), shared.is_empty()) {
            (true, _) => shared.to_string(),
            (false, true) => own.to_string(),
            (false, false) => format!("{},{}", own, shared),
        }
    }
}

/// Phase change of an action, as delivered to listeners
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionEvent {
    pub action: ActionId,
    pub action_name: String,
    pub phase: Phase,
    /// Interaction that drove the change; `None` for default behaviors
    pub interaction: Option<String>,
    pub control: ControlId,
    pub control_path: String,
    pub time: f64,
    pub start_time: f64,
    pub value: Value,
}

impl ActionEvent {
    /// Seconds since the interaction started
    pub fn duration(&self) -> f64 {
        self.time - self.start_time
    }

    pub fn read_value<T: crate::device::FromValue>(&self) -> T {
        self.value.read()
    }
}

/// Receives every phase change of an action
pub type ActionListener = Box<dyn FnMut(&ActionEvent) + Send>;
