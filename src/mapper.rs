//! Conversion from normalized control axes to PWM duty cycles.
//!
//! Axes live in [-1, 1]. Duty cycles are percentages of the PWM period,
//! clamped to the range the servo or ESC accepts (5 to 10 percent at 50 Hz,
//! i.e. 1 ms to 2 ms pulses).

use serde::{Deserialize, Serialize};

/// Inputs within this distance of centre are treated as centred.
pub const STEERING_DEADZONE: f64 = 0.04;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DutyRange {
    pub min_duty: f64,
    pub max_duty: f64,
}

impl Default for DutyRange {
    fn default() -> Self {
        DutyRange {
            min_duty: 5.0,
            max_duty: 10.0,
        }
    }
}

impl DutyRange {
    pub fn new(min_duty: f64, max_duty: f64) -> Self {
        DutyRange { min_duty, max_duty }
    }

    pub fn center(&self) -> f64 {
        (self.min_duty + self.max_duty) / 2.0
    }

    /// Maps an axis value to a duty percentage. The mapping is inverted:
    /// -1 gives `max_duty`, +1 gives `min_duty`.
    pub fn to_duty_percent(&self, value: f64) -> f64 {
        let span = self.max_duty - self.min_duty;
        let duty = self.max_duty - ((value + 1.0) * span / 2.0);
        self.clamp(duty)
    }

    pub fn clamp(&self, duty: f64) -> f64 {
        duty.clamp(self.min_duty, self.max_duty)
    }
}

/// Folds the two trigger axes into one throttle axis.
pub fn combine_brake_accelerator(brake: f64, accelerator: f64) -> f64 {
    let brake = -(brake + 1.0);
    let accelerator = accelerator + 1.0;
    (brake + accelerator) / 2.0
}

/// Reflects steering to match the servo's mounting polarity.
pub fn invert_steering(value: f64) -> f64 {
    if value < 0.0 {
        2.0 - (value + 2.0)
    } else if value > 0.0 {
        -2.0 - (value - 2.0)
    } else {
        value
    }
}

/// Duty percentage to the 0..=255 range used by 8-bit PWM peripherals.
pub fn to_duty_cycle_bits(percent: f64) -> f64 {
    (percent / 100.0) * 255.0
}

/// Snaps inputs within `deadzone` of centre to exactly 0.0.
pub fn apply_deadzone(value: f64, deadzone: f64) -> f64 {
    if (-deadzone..=deadzone).contains(&value) {
        0.0
    } else {
        value
    }
}
