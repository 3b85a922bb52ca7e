use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// One sample of operator intent, as exchanged between remote and vehicle.
///
/// The three axes are optional so that a partially observed input device
/// (an axis that has not moved yet) can still be described; such a state is
/// incomplete and [`ControlState::axes`] refuses it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlState {
    pub steering: Option<f64>,
    pub brake: Option<f64>,
    pub accelerator: Option<f64>,
    #[serde(default)]
    pub handbrake: bool,
    #[serde(default)]
    pub stop: bool,
    #[serde(default)]
    pub record: bool,
    #[serde(default)]
    pub play: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// The validated numeric part of a [`ControlState`], every axis in [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axes {
    pub steering: f64,
    pub brake: f64,
    pub accelerator: f64,
}

impl ControlState {
    pub fn new(steering: f64, brake: f64, accelerator: f64) -> Self {
        ControlState {
            steering: Some(steering),
            brake: Some(brake),
            accelerator: Some(accelerator),
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.steering.is_some() && self.brake.is_some() && self.accelerator.is_some()
    }

    /// Checks that every axis is present, finite and within [-1, 1].
    pub fn axes(&self) -> Result<Axes, StateError> {
        Ok(Axes {
            steering: checked("steering", self.steering)?,
            brake: checked("brake", self.brake)?,
            accelerator: checked("accelerator", self.accelerator)?,
        })
    }
}

fn checked(field: &'static str, value: Option<f64>) -> Result<f64, StateError> {
    let value = value.ok_or(StateError::Missing(field))?;
    if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
        return Err(StateError::OutOfRange { field, value });
    }
    Ok(value)
}
