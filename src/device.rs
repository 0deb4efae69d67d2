//! Devices and controls
//!
//! The minimal device model the input core needs: layouts describing where
//! each control's state lives, built devices with resolved controls, and
//! binding paths that select controls.

mod control;
mod layout;
mod path;
mod registry;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use control::{axis_deadzone, stick_deadzone, Control, ControlKind, FromValue, Processor, Value};
pub use layout::{stick_controls, vector2_controls, ControlItem, Layout, LayoutRegistry};
pub use path::{wildcard_match, BindingPath, PathComponent};
pub use registry::{Device, DeviceRegistry};

/// Identifier of a device, unique for the lifetime of a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize, Serialize)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// A control: its device plus its declaration index within the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize, Serialize)]
pub struct ControlId {
    pub device: DeviceId,
    pub index: u32,
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.index)
    }
}
