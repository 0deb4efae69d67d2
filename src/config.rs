//! Input settings
//!
//! Global defaults read by interactions, default action behaviors and value
//! processors. Settings are owned by the [`InputSystem`](crate::InputSystem)
//! and handed to every processing step by reference, so two systems with
//! different settings never observe each other.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::InputError;

/// Smallest press point a button can have.
///
/// A default press point of exactly 0 would make every button report
/// pressed at rest, so it is clamped up to this value.
pub const MIN_BUTTON_PRESS_POINT: f32 = 0.0001;

/// Global input settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InputSettings {
    /// Actuation at which a button counts as pressed
    #[serde(default = "default_button_press_point")]
    pub default_button_press_point: f32,
    /// Fraction of the press point below which a pressed button counts as released
    #[serde(default = "default_button_release_threshold")]
    pub button_release_threshold: f32,
    /// Seconds (tap, multi-tap window)
    #[serde(default = "default_tap_time")]
    pub default_tap_time: f64,
    #[serde(default = "default_slow_tap_time")]
    pub default_slow_tap_time: f64,
    #[serde(default = "default_hold_time")]
    pub default_hold_time: f64,
    /// Maximum gap between taps of a multi-tap
    #[serde(default = "default_multi_tap_delay_time")]
    pub multi_tap_delay_time: f64,
    #[serde(default = "default_deadzone_min")]
    pub default_deadzone_min: f32,
    #[serde(default = "default_deadzone_max")]
    pub default_deadzone_max: f32,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            default_button_press_point: default_button_press_point(),
            button_release_threshold: default_button_release_threshold(),
            default_tap_time: default_tap_time(),
            default_slow_tap_time: default_slow_tap_time(),
            default_hold_time: default_hold_time(),
            multi_tap_delay_time: default_multi_tap_delay_time(),
            default_deadzone_min: default_deadzone_min(),
            default_deadzone_max: default_deadzone_max(),
        }
    }
}

impl InputSettings {
    /// Load settings from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let settings = Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse YAML settings: {}", path.display()))?;

        Ok(settings)
    }

    /// Parse settings from a YAML string and validate them
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: InputSettings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a YAML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize settings to YAML")?;

        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;

        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> crate::Result<()> {
        let durations = [
            ("default_tap_time", self.default_tap_time),
            ("default_slow_tap_time", self.default_slow_tap_time),
            ("default_hold_time", self.default_hold_time),
            ("multi_tap_delay_time", self.multi_tap_delay_time),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(InputError::invalid_settings(format!(
                    "{} must be a non-negative number of seconds (got {})",
                    name, value
                )));
            }
        }

        if !(self.button_release_threshold > 0.0 && self.button_release_threshold <= 1.0) {
            return Err(InputError::invalid_settings(format!(
                "button_release_threshold must be in (0, 1] (got {})",
                self.button_release_threshold
            )));
        }

        if self.default_button_press_point < 0.0 {
            return Err(InputError::invalid_settings(
                "default_button_press_point must not be negative",
            ));
        }

        if self.default_deadzone_min >= self.default_deadzone_max {
            return Err(InputError::invalid_settings(format!(
                "default_deadzone_min ({}) must be below default_deadzone_max ({})",
                self.default_deadzone_min, self.default_deadzone_max
            )));
        }

        Ok(())
    }

    /// Default press point, clamped away from zero
    pub fn effective_press_point(&self) -> f32 {
        self.default_button_press_point.max(MIN_BUTTON_PRESS_POINT)
    }

    /// Release point for a given press point
    pub fn release_point(&self, press_point: f32) -> f32 {
        press_point * self.button_release_threshold
    }

    /// Resolve an interaction's own press point (<= 0 means "use the default")
    pub fn press_point_or_default(&self, press_point: f32) -> f32 {
        if press_point > 0.0 {
            press_point
        } else {
            self.effective_press_point()
        }
    }
}

// Default value functions
fn default_button_press_point() -> f32 { 0.5 }
fn default_button_release_threshold() -> f32 { 0.75 }
fn default_tap_time() -> f64 { 0.2 }
fn default_slow_tap_time() -> f64 { 0.5 }
fn default_hold_time() -> f64 { 0.4 }
fn default_multi_tap_delay_time() -> f64 { 0.75 }
fn default_deadzone_min() -> f32 { 0.125 }
fn default_deadzone_max() -> f32 { 0.925 }
