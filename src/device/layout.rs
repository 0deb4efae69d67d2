//! Device layouts
//!
//! A layout lists the controls of a device type and where their state lives.
//! Layouts can extend a base layout; the derived layout inherits every base
//! control and may replace entries by name or add new ones.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::control::{ControlKind, Processor};
use crate::error::{InputError, Result};
use crate::state::{StateBlock, StateFormat};

/// Control declaration inside a layout
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ControlItem {
    pub name: String,
    pub kind: ControlKind,
    pub block: StateBlock,
    #[serde(default)]
    pub noisy: bool,
    #[serde(default)]
    pub synthetic: bool,
    #[serde(default)]
    pub usages: Vec<String>,
    #[serde(default)]
    pub processors: Vec<Processor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<f32>,
}

impl ControlItem {
    pub fn new(name: impl Into<String>, kind: ControlKind, block: StateBlock) -> Self {
        Self {
            name: name.into(),
            kind,
            block,
            noisy: false,
            synthetic: false,
            usages: Vec::new(),
            processors: Vec::new(),
            default_value: None,
        }
    }

    /// Single-bit button
    pub fn button(name: impl Into<String>, byte_offset: u32, bit_offset: u32) -> Self {
        Self::new(name, ControlKind::Button, StateBlock::bit(byte_offset, bit_offset))
    }

    /// Single-bit keyboard key
    pub fn key(name: impl Into<String>, byte_offset: u32, bit_offset: u32) -> Self {
        Self::new(name, ControlKind::Key, StateBlock::bit(byte_offset, bit_offset))
    }

    /// Analog button stored as a float (e.g. a trigger)
    pub fn analog_button(name: impl Into<String>, byte_offset: u32) -> Self {
        Self::new(name, ControlKind::Button, StateBlock::new(byte_offset, StateFormat::Float))
    }

    pub fn axis(name: impl Into<String>, block: StateBlock) -> Self {
        Self::new(name, ControlKind::Axis, block)
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usages.push(usage.into());
        self
    }

    pub fn with_processor(mut self, processor: Processor) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn with_default(mut self, value: f32) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn noisy(mut self) -> Self {
        self.noisy = true;
        self
    }

    pub fn synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }
}

/// Stick made of two float axes at `byte_offset`, plus synthetic half-axis buttons
pub fn stick_controls(name: &str, byte_offset: u32) -> Vec<ControlItem> {
    let x = StateBlock::new(byte_offset, StateFormat::Float);
    let y = StateBlock::new(byte_offset + 4, StateFormat::Float);
    let clamp = Processor::Clamp { min: 0.0, max: 1.0 };

    let half_axis = |suffix: &str, block: StateBlock, invert: bool| {
        let mut item = ControlItem::new(format!("{}/{}", name, suffix), ControlKind::Button, block)
            .synthetic()
            .with_processor(Processor::axis_deadzone());
        if invert {
            item = item.with_processor(Processor::Invert);
        }
        item.with_processor(clamp)
    };

    vec![
        ControlItem::new(
            name,
            ControlKind::Stick,
            StateBlock::bits(byte_offset, 0, 64, StateFormat::Float),
        )
        .with_processor(Processor::stick_deadzone()),
        ControlItem::axis(format!("{}/x", name), x).with_processor(Processor::axis_deadzone()),
        ControlItem::axis(format!("{}/y", name), y).with_processor(Processor::axis_deadzone()),
        half_axis("up", y, false),
        half_axis("down", y, true),
        half_axis("left", x, true),
        half_axis("right", x, false),
    ]
}

/// Plain two-dimensional value with axis children and no deadzones
pub fn vector2_controls(name: &str, byte_offset: u32) -> Vec<ControlItem> {
    vec![
        ControlItem::new(
            name,
            ControlKind::Vector2,
            StateBlock::bits(byte_offset, 0, 64, StateFormat::Float),
        ),
        ControlItem::axis(format!("{}/x", name), StateBlock::new(byte_offset, StateFormat::Float)),
        ControlItem::axis(
            format!("{}/y", name),
            StateBlock::new(byte_offset + 4, StateFormat::Float),
        ),
    ]
}

/// Device layout
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Layout {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default)]
    pub controls: Vec<ControlItem>,
}

impl Layout {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            controls: Vec::new(),
        }
    }

    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_control(mut self, control: ControlItem) -> Self {
        self.controls.push(control);
        self
    }

    pub fn with_controls(mut self, controls: impl IntoIterator<Item = ControlItem>) -> Self {
        self.controls.extend(controls);
        self
    }

    /// Whether this layout itself declares `control` or one of its ancestors
    pub fn introduces(&self, control: &str) -> bool {
        self.controls.iter().any(|c| {
            control.eq_ignore_ascii_case(&c.name)
                || (control.len() > c.name.len()
                    && control.as_bytes()[c.name.len()] == b'/'
                    && control[..c.name.len()].eq_ignore_ascii_case(&c.name))
        })
    }
}

/// Gamepad state:
/// - bytes 0..4: button bitfield
/// - bytes 4..12: left stick (x, y floats)
/// - bytes 12..20: right stick
/// - bytes 20..28: left and right trigger floats
fn gamepad_layout() -> Layout {
    let buttons = [
        ("dpad/up", 0),
        ("dpad/down", 1),
        ("dpad/left", 2),
        ("dpad/right", 3),
        ("buttonNorth", 4),
        ("buttonEast", 5),
        ("buttonSouth", 6),
        ("buttonWest", 7),
        ("leftStickPress", 8),
        ("rightStickPress", 9),
        ("leftShoulder", 10),
        ("rightShoulder", 11),
        ("start", 12),
        ("select", 13),
    ];

    let mut layout = Layout::new("Gamepad");
    for (name, bit) in buttons {
        let mut item = ControlItem::button(name, bit / 8, bit % 8);
        match name {
            "buttonSouth" => item = item.with_usage("PrimaryAction").with_usage("Submit"),
            "buttonEast" => item = item.with_usage("Back").with_usage("Cancel"),
            "start" => item = item.with_usage("Menu"),
            _ => {}
        }
        layout.controls.push(item);
    }

    layout
        .with_controls(stick_controls("leftStick", 4))
        .with_controls(stick_controls("rightStick", 12))
        .with_control(ControlItem::analog_button("leftTrigger", 20))
        .with_control(ControlItem::analog_button("rightTrigger", 24).with_usage("SecondaryAction"))
}

fn keyboard_layout() -> Layout {
    let keys = [
        "space", "enter", "escape", "tab", "a", "d", "s", "w", "q", "e", "leftShift", "leftCtrl",
    ];
    let mut layout = Layout::new("Keyboard");
    for (bit, key) in keys.iter().enumerate() {
        let bit = bit as u32;
        layout.controls.push(ControlItem::key(*key, bit / 8, bit % 8));
    }
    layout
}

/// Mouse state: position and delta vectors then a button byte (17 bytes)
fn mouse_layout() -> Layout {
    let mut pointer: Vec<ControlItem> = vector2_controls("position", 0)
        .into_iter()
        .map(ControlItem::noisy)
        .collect();
    pointer.extend(vector2_controls("delta", 8).into_iter().map(ControlItem::noisy));

    Layout::new("Mouse")
        .with_controls(pointer)
        .with_control(ControlItem::button("leftButton", 16, 0).with_usage("PrimaryAction"))
        .with_control(ControlItem::button("rightButton", 16, 1))
        .with_control(ControlItem::button("middleButton", 16, 2))
}

static BUILTIN_LAYOUTS: Lazy<Vec<Layout>> =
    Lazy::new(|| vec![gamepad_layout(), keyboard_layout(), mouse_layout()]);

/// Registered layouts, keyed case-insensitively
#[derive(Debug, Clone)]
pub struct LayoutRegistry {
    layouts: HashMap<String, Layout>,
}

impl Default for LayoutRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutRegistry {
    /// Registry with the built-in `Gamepad`, `Keyboard` and `Mouse` layouts
    pub fn new() -> Self {
        let layouts = BUILTIN_LAYOUTS
            .iter()
            .map(|l| (l.name.to_ascii_lowercase(), l.clone()))
            .collect();
        Self { layouts }
    }

    /// Registry without any layouts
    pub fn empty() -> Self {
        Self {
            layouts: HashMap::new(),
        }
    }

    /// Add or replace a layout. Its base, if any, must already be registered.
    pub fn register(&mut self, layout: Layout) -> Result<()> {
        if let Some(base) = &layout.base {
            if !self.layouts.contains_key(&base.to_ascii_lowercase()) {
                return Err(InputError::UnknownLayout {
                    layout: base.clone(),
                });
            }
        }
        self.layouts.insert(layout.name.to_ascii_lowercase(), layout);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Layout> {
        self.layouts.get(&name.to_ascii_lowercase())
    }

    /// The layout followed by its bases, most derived first
    pub fn base_chain(&self, name: &str) -> Vec<&Layout> {
        let mut chain = Vec::new();
        let mut next = self.get(name);
        while let Some(layout) = next {
            // Guard against a base cycle introduced by re-registration
            if chain.iter().any(|l: &&Layout| l.name == layout.name) {
                break;
            }
            chain.push(layout);
            next = layout.base.as_deref().and_then(|b| self.get(b));
        }
        chain
    }

    /// Whether `layout` is `ancestor` or derives from it
    pub fn is_a(&self, layout: &str, ancestor: &str) -> bool {
        self.base_chain(layout)
            .iter()
            .any(|l| l.name.eq_ignore_ascii_case(ancestor))
    }

    /// Flattened control list: base controls first, derived entries replacing by name
    pub fn resolve(&self, name: &str) -> Result<Vec<ControlItem>> {
        let chain = self.base_chain(name);
        if chain.is_empty() {
            return Err(InputError::UnknownLayout {
                layout: name.to_string(),
            });
        }

        let mut controls: Vec<ControlItem> = Vec::new();
        for layout in chain.iter().rev() {
            for item in &layout.controls {
                match controls
                    .iter_mut()
                    .find(|c| c.name.eq_ignore_ascii_case(&item.name))
                {
                    Some(existing) => *existing = item.clone(),
                    None => controls.push(item.clone()),
                }
            }
        }
        Ok(controls)
    }

    /// Most basic layout in the chain of `layout` that introduces `control`
    pub fn generalized_layout<'a>(&'a self, layout: &'a str, control: &str) -> &'a str {
        self.base_chain(layout)
            .iter()
            .rev()
            .find(|l| l.introduces(control))
            .map(|l| l.name.as_str())
            .unwrap_or(layout)
    }
}
