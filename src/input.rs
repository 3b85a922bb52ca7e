//! Operator side: turning raw input readings into control states.

use serde::{Deserialize, Serialize};

use crate::mapper::{STEERING_DEADZONE, apply_deadzone};
use crate::state::ControlState;

/// One reading of the operator's device, axes already normalized to
/// [-1, 1]. An axis is `None` until the device has reported it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawInput {
    pub steering: Option<f64>,
    pub brake: Option<f64>,
    pub accelerator: Option<f64>,
    pub stop: bool,
    pub turbo: bool,
    pub record: bool,
    pub play: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputShaper {
    pub deadzone: f64,
    /// Fraction of the brake travel available without turbo.
    pub brake_range: f64,
    /// Fraction of the accelerator travel available without turbo.
    pub accelerator_range: f64,
}

impl Default for InputShaper {
    fn default() -> Self {
        InputShaper {
            deadzone: STEERING_DEADZONE,
            brake_range: 0.5883,
            accelerator_range: 0.0393,
        }
    }
}

impl InputShaper {
    pub fn shape(&self, raw: &RawInput) -> ControlState {
        let steering = raw.steering.map(round2).map(|v| apply_deadzone(v, self.deadzone));
        let brake = raw.brake.map(round2).map(|v| self.limit(v, self.brake_range, raw.turbo));
        let accelerator = raw
            .accelerator
            .map(round2)
            .map(|v| self.limit(v, self.accelerator_range, raw.turbo));

        ControlState {
            steering,
            brake,
            accelerator,
            stop: raw.stop,
            record: raw.record,
            play: raw.play,
            ..Default::default()
        }
    }

    /// Squeezes a trigger into the bottom `range` of its travel, keeping -1
    /// (released) fixed. Turbo gives the full travel.
    fn limit(&self, value: f64, range: f64, turbo: bool) -> f64 {
        if turbo {
            value
        } else {
            (value * (range / 2.0)) - (1.0 - (range / 2.0))
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Passes a state on only when it differs from the previous one passed.
#[derive(Debug, Default)]
pub struct ChangeFilter {
    last: Option<ControlState>,
}

impl ChangeFilter {
    pub fn filter(&mut self, state: ControlState) -> Option<ControlState> {
        if self.last.as_ref() == Some(&state) {
            return None;
        }
        self.last = Some(state.clone());
        Some(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn steering_deadzone_and_rounding() {
        let shaper = InputShaper::default();
        let state = shaper.shape(&RawInput {
            steering: Some(-0.03),
            ..Default::default()
        });
        assert_eq!(state.steering, Some(0.0));

        let state = shaper.shape(&RawInput {
            steering: Some(0.4567),
            ..Default::default()
        });
        assert_eq!(state.steering, Some(0.46));
    }

    #[test]
    fn released_triggers_stay_released() {
        let shaper = InputShaper::default();
        let state = shaper.shape(&RawInput {
            steering: Some(0.0),
            brake: Some(-1.0),
            accelerator: Some(-1.0),
            ..Default::default()
        });
        assert!((state.brake.unwrap() + 1.0).abs() < EPS);
        assert!((state.accelerator.unwrap() + 1.0).abs() < EPS);
    }

    #[test]
    fn full_triggers_are_limited_without_turbo() {
        let shaper = InputShaper::default();
        let raw = RawInput {
            steering: Some(0.0),
            brake: Some(1.0),
            accelerator: Some(1.0),
            ..Default::default()
        };

        let state = shaper.shape(&raw);
        assert!((state.brake.unwrap() - (0.5883 - 1.0)).abs() < EPS);
        assert!((state.accelerator.unwrap() - (0.0393 - 1.0)).abs() < EPS);

        let state = shaper.shape(&RawInput { turbo: true, ..raw });
        assert_eq!(state.brake, Some(1.0));
        assert_eq!(state.accelerator, Some(1.0));
    }

    #[test]
    fn missing_axes_stay_missing() {
        let state = InputShaper::default().shape(&RawInput {
            stop: true,
            ..Default::default()
        });
        assert!(!state.is_complete());
        assert!(state.stop);
    }

    #[test]
    fn change_filter() {
        let mut filter = ChangeFilter::default();
        let state = ControlState::new(0.1, -1.0, -1.0);
        assert!(filter.filter(state.clone()).is_some());
        assert!(filter.filter(state.clone()).is_none());
        assert!(filter.filter(ControlState { play: true, ..state }).is_some());
    }
}
