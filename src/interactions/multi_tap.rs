//! Multi-tap interaction
//!
//! `tap_count` taps, each released within `tap_time` and each following the
//! previous release within `tap_delay`. Any expired window cancels.

use super::{Interaction, InteractionContext, InteractionParams};
use crate::error::{InputError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TapPhase {
    #[default]
    None,
    WaitingForNextRelease,
    WaitingForNextPress,
}

#[derive(Debug, Clone)]
pub struct MultiTapInteraction {
    /// Seconds; 0 uses `default_tap_time`
    pub tap_time: f64,
    /// Seconds; 0 uses `multi_tap_delay_time`
    pub tap_delay: f64,
    pub tap_count: u32,
    pub press_point: f32,
    phase: TapPhase,
    taps: u32,
    tap_start: f64,
    last_release: f64,
}

impl Default for MultiTapInteraction {
    fn default() -> Self {
        Self::new(2)
    }
}

impl MultiTapInteraction {
    pub fn new(tap_count: u32) -> Self {
        Self {
            tap_time: 0.0,
            tap_delay: 0.0,
            tap_count: tap_count.max(1),
            press_point: 0.0,
            phase: TapPhase::None,
            taps: 0,
            tap_start: 0.0,
            last_release: 0.0,
        }
    }

    pub fn from_params(params: &InteractionParams) -> Result<Self> {
        params.expect_only(&["tapTime", "tapDelay", "tapCount", "pressPoint"])?;
        let tap_count = params.get::<u32>("tapCount")?.unwrap_or(2);
        if tap_count == 0 {
            return Err(InputError::invalid_parameter(
                params.interaction(),
                "tapCount",
                "must be at least 1",
            ));
        }
        let mut interaction = Self::new(tap_count);
        interaction.tap_time = params.duration("tapTime")?.unwrap_or(0.0);
        interaction.tap_delay = params.duration("tapDelay")?.unwrap_or(0.0);
        interaction.press_point = params.threshold("pressPoint")?.unwrap_or(0.0);
        Ok(interaction)
    }

    /// Timeout windows (tap or delay) already used up
    fn completed_windows(&self) -> u32 {
        match self.phase {
            TapPhase::None => 0,
            TapPhase::WaitingForNextRelease => 2 * self.taps,
            TapPhase::WaitingForNextPress => (2 * self.taps).saturating_sub(1),
        }
    }
}

impl Interaction for MultiTapInteraction {
    fn process(&mut self, cx: &mut InteractionContext<'_>) {
        let tap_time = if self.tap_time > 0.0 {
            self.tap_time
        } else {
            cx.settings().default_tap_time
        };
        let tap_delay = if self.tap_delay > 0.0 {
            self.tap_delay
        } else {
            cx.settings().multi_tap_delay_time
        };
        let press = cx.settings().press_point_or_default(self.press_point);
        let release = cx.settings().release_point(press);

        if cx.timer_has_expired() {
            cx.canceled();
            return;
        }

        match self.phase {
            TapPhase::None => {
                if cx.control_is_actuated(press) {
                    self.phase = TapPhase::WaitingForNextRelease;
                    self.tap_start = cx.time();
                    cx.started();
                    let taps = f64::from(self.tap_count);
                    let total = tap_time * taps + (taps - 1.0) * tap_delay;
                    cx.set_total_timeout_completion_time(total);
                    cx.set_timeout(tap_time);
                }
            }
            TapPhase::WaitingForNextRelease => {
                if !cx.control_is_actuated(release) {
                    if cx.time() - self.tap_start <= tap_time {
                        self.taps += 1;
                        if self.taps >= self.tap_count {
                            cx.performed();
                        } else {
                            self.phase = TapPhase::WaitingForNextPress;
                            self.last_release = cx.time();
                            cx.set_timeout(tap_delay);
                        }
                    } else {
                        cx.canceled();
                    }
                }
            }
            TapPhase::WaitingForNextPress => {
                if cx.control_is_actuated(press) {
                    if cx.time() - self.last_release <= tap_delay {
                        self.phase = TapPhase::WaitingForNextRelease;
                        self.tap_start = cx.time();
                        cx.set_timeout(tap_time);
                    } else {
                        cx.canceled();
                    }
                }
            }
        }
    }

    fn reset(&mut self) {
        self.phase = TapPhase::None;
        self.taps = 0;
        self.tap_start = 0.0;
        self.last_release = 0.0;
    }

    fn timeout_completion(&self, timer_fraction: f32) -> Option<f32> {
        if self.phase == TapPhase::None {
            return None;
        }
        let windows = self.completed_windows() as f32;
        Some((timer_fraction + windows) / (self.tap_count as f32 * 2.0))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Driver;
    use super::super::Phase;
    use super::*;

    fn double_tap() -> MultiTapInteraction {
        let mut interaction = MultiTapInteraction::new(2);
        interaction.tap_time = 0.2;
        interaction.tap_delay = 0.3;
        interaction
    }

    #[test]
    fn test_double_tap_performs_on_second_release() {
        let mut driver = Driver::new(double_tap());
        assert_eq!(driver.set(1.0, 0.0), vec![Phase::Started]);
        assert!(driver.set(0.0, 0.1).is_empty());
        assert!(driver.set(1.0, 0.3).is_empty());
        assert_eq!(driver.set(0.0, 0.4), vec![Phase::Performed]);
        assert_eq!(driver.state.phase, Phase::Waiting);
    }

    #[test]
    fn test_delay_exceeded_cancels() {
        let mut driver = Driver::new(double_tap());
        driver.set(1.0, 0.0);
        driver.set(0.0, 0.1);
        assert_eq!(driver.tick(0.0, 0.5), vec![Phase::Canceled]);

        // A fresh round starts over
        assert_eq!(driver.set(1.0, 2.0), vec![Phase::Started]);
    }

    #[test]
    fn test_held_too_long_cancels() {
        let mut driver = Driver::new(double_tap());
        driver.set(1.0, 0.0);
        assert_eq!(driver.set(0.0, 0.25), vec![Phase::Canceled]);
    }

    #[test]
    fn test_completion_blends_windows() {
        let mut driver = Driver::new(double_tap());
        driver.set(1.0, 0.0);
        // Half of the first tap window
        assert!((driver.completion(0.1) - 0.125).abs() < 1e-6);
        driver.set(0.0, 0.2);
        // First tap done; delay window just opened
        assert!((driver.completion(0.2) - 0.25).abs() < 1e-6);
        assert!((driver.completion(0.35) - 0.375).abs() < 1e-6);
    }

    #[test]
    fn test_zero_tap_count_is_rejected() {
        let params = InteractionParams::new("multiTap").with("tapCount", "0");
        assert!(MultiTapInteraction::from_params(&params).is_err());
    }
}
