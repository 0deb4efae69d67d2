//! Hold interaction
//!
//! Starts on actuation and performs once the control has stayed actuated for
//! `duration`. The perform is evaluated on the timer pass or on the next
//! change, whichever comes first; completion advances with the clock alone.

use super::{Interaction, InteractionContext, InteractionParams, Phase};
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct HoldInteraction {
    /// Seconds; 0 uses `default_hold_time`
    pub duration: f64,
    /// 0 uses the default press point
    pub press_point: f32,
}

impl HoldInteraction {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            press_point: 0.0,
        }
    }

    pub fn from_params(params: &InteractionParams) -> Result<Self> {
        params.expect_only(&["duration", "pressPoint"])?;
        Ok(Self {
            duration: params.duration("duration")?.unwrap_or(0.0),
            press_point: params.threshold("pressPoint")?.unwrap_or(0.0),
        })
    }
}

impl Interaction for HoldInteraction {
    fn process(&mut self, cx: &mut InteractionContext<'_>) {
        let duration = if self.duration > 0.0 {
            self.duration
        } else {
            cx.settings().default_hold_time
        };
        let press = cx.settings().press_point_or_default(self.press_point);
        let release = cx.settings().release_point(press);

        if cx.timer_has_expired() {
            if cx.is_started() {
                if cx.control_is_actuated(release) {
                    cx.performed_and_stay_performed();
                } else {
                    cx.canceled();
                }
            }
            return;
        }

        match cx.phase() {
            Phase::Waiting | Phase::Canceled => {
                if cx.control_is_actuated(press) {
                    cx.started();
                    cx.set_timeout(duration);
                }
            }
            Phase::Started => {
                if !cx.control_is_actuated(release) {
                    cx.canceled();
                } else if cx.time() - cx.start_time() >= duration {
                    cx.performed_and_stay_performed();
                }
            }
            Phase::Performed => {
                if !cx.control_is_actuated(release) {
                    cx.canceled();
                }
            }
        }
    }

    fn reset(&mut self) {}
}
