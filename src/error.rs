use thiserror::Error;

use crate::actuator::Channel;

/// A control state that must not reach the actuators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("missing field `{0}`")]
    Missing(&'static str),

    #[error("field `{field}` out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Raised by a PWM backend when the underlying call fails.
#[derive(Debug, Error)]
#[error("{call} on gpio {channel}: {reason}")]
pub struct HardwareError {
    pub channel: Channel,
    pub call: &'static str,
    pub reason: String,
}

impl HardwareError {
    pub fn new(channel: Channel, call: &'static str, reason: impl ToString) -> Self {
        HardwareError {
            channel,
            call,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("hardware failure: {0}")]
    Hardware(#[from] HardwareError),

    #[error("gpio {0} is faulted")]
    Faulted(Channel),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload of {0} bytes exceeds datagram limit")]
    TooLarge(usize),

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("config format: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file: {0}")]
    Io(#[from] std::io::Error),

    #[error("session record {index}: {source}")]
    Record {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("session record {index} too large ({len} bytes)")]
    RecordTooLarge { index: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("all actuator channels are faulted")]
    AllChannelsFaulted,

    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}
