//! Hardware PWM output with a per-channel write cache.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

use crate::error::{ActuatorError, HardwareError};
use crate::mapper::to_duty_cycle_bits;

/// A GPIO pin driving one servo or ESC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel(pub u8);

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a backend expects its duty value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutyEncoding {
    /// 0.0 to 100.0
    Percent,
    /// 0.0 to 1.0
    Fraction,
    /// 0.0 to 255.0
    EightBit,
}

impl DutyEncoding {
    pub fn encode(self, percent: f64) -> f64 {
        match self {
            DutyEncoding::Percent => percent,
            DutyEncoding::Fraction => percent / 100.0,
            DutyEncoding::EightBit => to_duty_cycle_bits(percent),
        }
    }
}

/// The raw PWM primitive. Implementations own their hardware handles.
pub trait PwmBackend {
    fn encoding(&self) -> DutyEncoding;

    fn set_frequency(&mut self, channel: Channel, hz: f64) -> Result<(), HardwareError>;

    /// `duty` is already in the backend's [`DutyEncoding`].
    fn set_duty_cycle(&mut self, channel: Channel, duty: f64) -> Result<(), HardwareError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DutyCommand {
    pub channel: Channel,
    pub frequency: f64,
    pub duty_percent: f64,
}

#[derive(Debug, Default)]
struct Applied {
    frequency: Option<f64>,
    duty: Option<f64>,
}

/// Sole owner of the PWM backend. Only changed values reach the hardware,
/// so the call rate follows the rate of change rather than the tick rate.
pub struct ActuatorWriter<B> {
    backend: B,
    applied: HashMap<Channel, Applied>,
    faulted: HashSet<Channel>,
}

impl<B: PwmBackend> ActuatorWriter<B> {
    pub fn new(backend: B) -> Self {
        ActuatorWriter {
            backend,
            applied: HashMap::new(),
            faulted: HashSet::new(),
        }
    }

    /// Writes `command` to its channel. A hardware failure latches the
    /// channel as faulted; it then refuses every later command.
    pub fn apply(&mut self, command: DutyCommand) -> Result<(), ActuatorError> {
        let channel = command.channel;
        if self.faulted.contains(&channel) {
            return Err(ActuatorError::Faulted(channel));
        }

        let duty = self.backend.encoding().encode(command.duty_percent);
        let applied = self.applied.entry(channel).or_default();

        if applied.frequency != Some(command.frequency) {
            if let Err(e) = self.backend.set_frequency(channel, command.frequency) {
                return Err(self.latch(channel, e));
            }
            applied.frequency = Some(command.frequency);
        }

        if applied.duty != Some(duty) {
            if let Err(e) = self.backend.set_duty_cycle(channel, duty) {
                return Err(self.latch(channel, e));
            }
            applied.duty = Some(duty);
        }

        Ok(())
    }

    fn latch(&mut self, channel: Channel, e: HardwareError) -> ActuatorError {
        error!("gpio {} faulted: {}", channel, e);
        self.faulted.insert(channel);
        ActuatorError::Hardware(e)
    }

    pub fn is_faulted(&self, channel: Channel) -> bool {
        self.faulted.contains(&channel)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PwmCall {
    Frequency(Channel, f64),
    DutyCycle(Channel, f64),
}

/// In-memory backend. Every call is appended to a log shared between
/// clones; the vehicle also uses it for dry runs away from the Pi.
#[derive(Debug, Clone)]
pub struct RecordingBackend {
    encoding: DutyEncoding,
    calls: Arc<Mutex<Vec<PwmCall>>>,
    failing: Arc<Mutex<HashSet<Channel>>>,
}

impl RecordingBackend {
    pub fn new(encoding: DutyEncoding) -> Self {
        RecordingBackend {
            encoding,
            calls: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn calls(&self) -> Vec<PwmCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Makes every later call on `channel` fail.
    pub fn fail_channel(&self, channel: Channel) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel);
    }

    fn record(&self, call: PwmCall, channel: Channel, name: &'static str) -> Result<(), HardwareError> {
        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&channel)
        {
            return Err(HardwareError::new(channel, name, "injected failure"));
        }
        debug!("{:?}", call);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        Ok(())
    }
}

impl PwmBackend for RecordingBackend {
    fn encoding(&self) -> DutyEncoding {
        self.encoding
    }

    fn set_frequency(&mut self, channel: Channel, hz: f64) -> Result<(), HardwareError> {
        self.record(PwmCall::Frequency(channel, hz), channel, "set_frequency")
    }

    fn set_duty_cycle(&mut self, channel: Channel, duty: f64) -> Result<(), HardwareError> {
        self.record(PwmCall::DutyCycle(channel, duty), channel, "set_duty_cycle")
    }
}
