//! Controls, values and value processors
//!
//! A [`Control`] is a typed view over a bit range of its device's state. Raw
//! reads decode the bits; processed reads additionally run the control's
//! processors (deadzones, clamps, inversion).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ControlId;
use crate::config::InputSettings;
use crate::error::{InputError, Result};
use crate::state::{BitRegion, StateBlock};

/// Kind of control, used for expected-type filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ControlKind {
    Button,
    Axis,
    Key,
    Stick,
    Vector2,
}

impl ControlKind {
    /// Layout name of the kind
    pub fn layout_name(self) -> &'static str {
        match self {
            Self::Button => "Button",
            Self::Axis => "Axis",
            Self::Key => "Key",
            Self::Stick => "Stick",
            Self::Vector2 => "Vector2",
        }
    }

    fn base(self) -> Option<ControlKind> {
        match self {
            Self::Key => Some(Self::Button),
            Self::Button => Some(Self::Axis),
            Self::Stick => Some(Self::Vector2),
            Self::Axis | Self::Vector2 => None,
        }
    }

    /// Whether this kind is `expected` or derives from it (case-insensitive)
    pub fn is_a(self, expected: &str) -> bool {
        let mut kind = Some(self);
        while let Some(k) = kind {
            if k.layout_name().eq_ignore_ascii_case(expected) {
                return true;
            }
            kind = k.base();
        }
        false
    }

    /// Two-dimensional kinds read as [`Value::Vector2`]
    pub fn is_two_dimensional(self) -> bool {
        matches!(self, Self::Stick | Self::Vector2)
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.layout_name())
    }
}

/// Post-processing applied to a raw value
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Processor {
    /// Per-axis deadzone; `None` bounds fall back to the settings defaults
    AxisDeadzone { min: Option<f32>, max: Option<f32> },
    /// Radial deadzone on two-dimensional values
    StickDeadzone { min: Option<f32>, max: Option<f32> },
    Clamp { min: f32, max: f32 },
    Invert,
    Scale { factor: f32 },
}

impl Processor {
    pub fn axis_deadzone() -> Self {
        Self::AxisDeadzone { min: None, max: None }
    }

    pub fn stick_deadzone() -> Self {
        Self::StickDeadzone { min: None, max: None }
    }

    fn apply(&self, value: Value, settings: &InputSettings) -> Value {
        match (*self, value) {
            (Self::AxisDeadzone { min, max }, Value::Float(v)) => Value::Float(axis_deadzone(
                v,
                min.unwrap_or(settings.default_deadzone_min),
                max.unwrap_or(settings.default_deadzone_max),
            )),
            (Self::StickDeadzone { min, max }, Value::Vector2(x, y)) => {
                let (x, y) = stick_deadzone(
                    x,
                    y,
                    min.unwrap_or(settings.default_deadzone_min),
                    max.unwrap_or(settings.default_deadzone_max),
                );
                Value::Vector2(x, y)
            }
            (Self::Clamp { min, max }, Value::Float(v)) => Value::Float(v.clamp(min, max)),
            (Self::Clamp { min, max }, Value::Vector2(x, y)) => {
                Value::Vector2(x.clamp(min, max), y.clamp(min, max))
            }
            (Self::Invert, Value::Float(v)) => Value::Float(-v),
            (Self::Invert, Value::Vector2(x, y)) => Value::Vector2(-x, -y),
            (Self::Scale { factor }, Value::Float(v)) => Value::Float(v * factor),
            (Self::Scale { factor }, Value::Vector2(x, y)) => {
                Value::Vector2(x * factor, y * factor)
            }
            // Dimension mismatch: leave the value alone
            (_, value) => value,
        }
    }
}

/// Per-axis deadzone
///
/// Values below `min` become 0, values above `max` saturate to ±1 and the
/// range in between is rescaled to [0,1].
pub fn axis_deadzone(value: f32, min: f32, max: f32) -> f32 {
    let magnitude = value.abs();
    if magnitude < min {
        return 0.0;
    }
    if magnitude > max || max <= min {
        return value.signum();
    }
    value.signum() * ((magnitude - min) / (max - min))
}

/// Radial deadzone
///
/// Same mapping as [`axis_deadzone`] applied to the vector's length, keeping
/// its direction.
pub fn stick_deadzone(x: f32, y: f32, min: f32, max: f32) -> (f32, f32) {
    let magnitude = (x * x + y * y).sqrt();
    if magnitude < min || magnitude == 0.0 {
        return (0.0, 0.0);
    }
    let scaled = if magnitude > max || max <= min {
        1.0
    } else {
        (magnitude - min) / (max - min)
    };
    let scale = scaled / magnitude;
    (x * scale, y * scale)
}

/// Value of a control
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Value {
    Float(f32),
    Vector2(f32, f32),
}

impl Default for Value {
    fn default() -> Self {
        Value::Float(0.0)
    }
}

impl Value {
    /// Length of the value (absolute value for scalars)
    pub fn magnitude(&self) -> f32 {
        match *self {
            Value::Float(v) => v.abs(),
            Value::Vector2(x, y) => (x * x + y * y).sqrt(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude() == 0.0
    }

    /// Zero value of the same dimension
    pub fn zero_like(&self) -> Value {
        match self {
            Value::Float(_) => Value::Float(0.0),
            Value::Vector2(_, _) => Value::Vector2(0.0, 0.0),
        }
    }

    pub fn read<T: FromValue>(self) -> T {
        T::from_value(self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{:.3}", v),
            Value::Vector2(x, y) => write!(f, "({:.3}, {:.3})", x, y),
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<(f32, f32)> for Value {
    fn from((x, y): (f32, f32)) -> Self {
        Value::Vector2(x, y)
    }
}

/// Conversion out of a [`Value`] for `read_value::<T>()`
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Self;
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Float(v) => v,
            Value::Vector2(_, _) => value.magnitude(),
        }
    }
}

impl FromValue for (f32, f32) {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Float(v) => (v, 0.0),
            Value::Vector2(x, y) => (x, y),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Self {
        !value.is_zero()
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Self {
        value
    }
}

/// A control on a built device
#[derive(Debug, Clone)]
pub struct Control {
    pub(crate) id: ControlId,
    /// Slash-separated path within the device, e.g. `leftStick/x`
    pub name: String,
    pub kind: ControlKind,
    pub block: StateBlock,
    /// Changes on its own without user input (e.g. sensors, pointer position)
    pub noisy: bool,
    /// Derived from other controls' state (e.g. stick half-axis buttons)
    pub synthetic: bool,
    pub usages: Vec<String>,
    pub processors: Vec<Processor>,
    pub default_value: Option<f32>,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
}

impl Control {
    pub fn id(&self) -> ControlId {
        self.id
    }

    /// Index of the parent control within the device
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    /// Bits watched for changes
    pub fn region(&self) -> BitRegion {
        self.block.region()
    }

    pub fn has_usage(&self, usage: &str) -> bool {
        self.usages.iter().any(|u| u.eq_ignore_ascii_case(usage))
    }

    fn components(&self) -> (StateBlock, StateBlock) {
        let half = self.block.size_in_bits / 2;
        let x = StateBlock {
            size_in_bits: half,
            ..self.block
        };
        let y = StateBlock::bits(
            self.block.byte_offset,
            self.block.bit_offset + half,
            half,
            self.block.format,
        );
        (x, y)
    }

    /// Decode the value without processors
    pub fn read_raw(&self, state: &[u8]) -> Value {
        if self.kind.is_two_dimensional() {
            let (x, y) = self.components();
            Value::Vector2(x.read_f32(state), y.read_f32(state))
        } else {
            Value::Float(self.block.read_f32(state))
        }
    }

    /// Decode the value and run processors
    pub fn read_value(&self, state: &[u8], settings: &InputSettings) -> Value {
        self.processors
            .iter()
            .fold(self.read_raw(state), |value, p| p.apply(value, settings))
    }

    /// Actuation level in [0,1] (vector length for two-dimensional controls)
    pub fn magnitude(&self, state: &[u8], settings: &InputSettings) -> f32 {
        self.read_value(state, settings).magnitude()
    }

    /// Encode a raw value into a device state image
    pub fn write_raw(&self, state: &mut [u8], value: Value) -> Result<()> {
        if self.synthetic {
            return Err(InputError::ReadOnlyControl {
                control: self.name.clone(),
            });
        }
        match (self.kind.is_two_dimensional(), value) {
            (true, Value::Vector2(x, y)) => {
                let (bx, by) = self.components();
                bx.write_f32(state, x);
                by.write_f32(state, y);
            }
            (true, Value::Float(v)) => {
                let (bx, _) = self.components();
                bx.write_f32(state, v);
            }
            (false, value) => self.block.write_f32(state, f32::from_value(value)),
        }
        Ok(())
    }
}
