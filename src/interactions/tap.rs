//! Tap interaction: press and release within `duration`

use super::{Interaction, InteractionContext, InteractionParams};
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct TapInteraction {
    /// Seconds; 0 uses `default_tap_time`
    pub duration: f64,
    pub press_point: f32,
}

impl TapInteraction {
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

impl Interaction for TapInteraction {
    fn process(&mut self, cx: &mut InteractionContext<'_>) {
        let duration = if self.duration > 0.0 {
            self.duration
        } else {
            cx.settings().default_tap_time
        };
        let press = cx.settings().press_point_or_default(self.press_point);
        let release = cx.settings().release_point(press);

        if cx.timer_has_expired() {
            cx.canceled();
            return;
        }

        if cx.is_waiting() && cx.control_is_actuated(press) {
            cx.started();
            cx.set_timeout(duration);
        } else if cx.is_started() && !cx.control_is_actuated(release) {
            if cx.time() - cx.start_time() <= duration {
                cx.performed();
            } else {
                cx.canceled();
            }
        }
    }

    fn reset(&mut self) {}
}
