//! Press interaction

use std::str::FromStr;

use super::{Interaction, InteractionContext, InteractionParams, Phase};
use crate::error::{InputError, Result};

/// When a press interaction performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PressBehavior {
    /// Perform when actuation crosses the press point
    #[default]
    PressOnly,
    /// Start on press, perform (and cancel) once released
    ReleaseOnly,
    /// Perform on press and again on release
    PressAndRelease,
}

impl FromStr for PressBehavior {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "pressonly" => Ok(PressBehavior::PressOnly),
            "1" | "releaseonly" => Ok(PressBehavior::ReleaseOnly),
            "2" | "pressandrelease" => Ok(PressBehavior::PressAndRelease),
            other => Err(InputError::invalid_parameter(
                "press",
                "behavior",
                format!("'{}' is not PressOnly, ReleaseOnly or PressAndRelease", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PressInteraction {
    /// Actuation needed to count as pressed; 0 uses the settings default
    pub press_point: f32,
    pub behavior: PressBehavior,
    waiting_for_release: bool,
}

impl PressInteraction {
    pub fn new(press_point: f32, behavior: PressBehavior) -> Self {
        Self {
            press_point,
            behavior,
            waiting_for_release: false,
        }
    }

    pub fn from_params(params: &InteractionParams) -> Result<Self> {
        params.expect_only(&["pressPoint", "behavior"])?;
        let press_point = params.threshold("pressPoint")?.unwrap_or(0.0);
        let behavior = params.get::<PressBehavior>("behavior")?.unwrap_or_default();
        Ok(Self::new(press_point, behavior))
    }
}

impl Interaction for PressInteraction {
    fn process(&mut self, cx: &mut InteractionContext<'_>) {
        let press = cx.settings().press_point_or_default(self.press_point);
        let release = cx.settings().release_point(press);
        let magnitude = cx.magnitude();
        let pressed = cx.control_is_actuated(press);
        let released = magnitude <= release;

        match self.behavior {
            PressBehavior::PressOnly => {
                if pressed && cx.phase() != Phase::Performed {
                    cx.performed_and_stay_performed();
                } else if released && cx.phase() != Phase::Waiting {
                    cx.canceled();
                }
            }
            PressBehavior::ReleaseOnly => {
                if self.waiting_for_release {
                    if released {
                        self.waiting_for_release = false;
                        cx.performed();
                        cx.canceled();
                    }
                } else if pressed {
                    self.waiting_for_release = true;
                    cx.started();
                } else if magnitude > 0.0 {
                    // Any actuation below the press point starts the interaction
                    cx.started();
                } else if cx.is_started() {
                    cx.canceled();
                }
            }
            PressBehavior::PressAndRelease => {
                if self.waiting_for_release {
                    if released {
                        self.waiting_for_release = false;
                        cx.performed();
                        cx.canceled();
                    }
                } else if pressed {
                    self.waiting_for_release = true;
                    cx.performed_and_stay_performed();
                }
            }
        }
    }

    fn reset(&mut self) {
        self.waiting_for_release = false;
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Driver;
    use super::*;

    #[test]
    fn test_behavior_parsing() {
        assert_eq!("1".parse::<PressBehavior>().unwrap(), PressBehavior::ReleaseOnly);
        assert_eq!(
            "PressAndRelease".parse::<PressBehavior>().unwrap(),
            PressBehavior::PressAndRelease
        );
        assert!("3".parse::<PressBehavior>().is_err());
    }

    #[test]
    fn test_press_only() {
        let mut driver = Driver::new(PressInteraction::default());
        assert!(driver.set(0.3, 0.0).is_empty());
        assert_eq!(driver.set(1.0, 1.0), vec![Phase::Started, Phase::Performed]);
        assert!(driver.set(0.9, 1.5).is_empty());
        assert_eq!(driver.set(0.0, 2.0), vec![Phase::Canceled]);
    }

    #[test]
    fn test_release_only_with_sub_threshold_start() {
        // press 0.5, release point 0.375
        let mut driver = Driver::new(PressInteraction::new(0.5, PressBehavior::ReleaseOnly));
        assert_eq!(driver.set(0.35, 0.0), vec![Phase::Started]);
        assert!(driver.set(0.5, 0.1).is_empty());
        assert_eq!(driver.set(0.3, 0.2), vec![Phase::Performed, Phase::Canceled]);
        assert_eq!(driver.state.phase, Phase::Waiting);
    }

    #[test]
    fn test_release_only_cancels_without_crossing_press_point() {
        let mut driver = Driver::new(PressInteraction::new(0.5, PressBehavior::ReleaseOnly));
        assert_eq!(driver.set(0.2, 0.0), vec![Phase::Started]);
        assert_eq!(driver.set(0.0, 0.1), vec![Phase::Canceled]);
    }

    #[test]
    fn test_press_and_release() {
        let mut driver = Driver::new(PressInteraction::new(0.0, PressBehavior::PressAndRelease));
        assert_eq!(driver.set(1.0, 1.0), vec![Phase::Started, Phase::Performed]);
        assert_eq!(driver.set(0.0, 2.0), vec![Phase::Performed, Phase::Canceled]);
        assert_eq!(driver.set(1.0, 5.0), vec![Phase::Started, Phase::Performed]);
    }

    #[test]
    fn test_unknown_parameter_is_rejected() {
        let params = InteractionParams::new("press").with("duration", "1");
        assert!(PressInteraction::from_params(&params).is_err());
        let params = InteractionParams::new("press").with("behavior", "releaseonly");
        assert_eq!(
            PressInteraction::from_params(&params).unwrap().behavior,
            PressBehavior::ReleaseOnly
        );
    }
}
