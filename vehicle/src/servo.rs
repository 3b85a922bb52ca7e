use anyhow::Result;
use pizdrive::actuator::{Channel, DutyEncoding, PwmBackend};
use pizdrive::error::HardwareError;
use rppal::gpio::{Gpio, OutputPin};
use std::collections::HashMap;
use tracing::info;

struct Output {
    pin: OutputPin,
    frequency: f64,
    duty_cycle: f64,
}

/// Software PWM on the Pi's GPIO pins, one servo or ESC per pin.
///
/// rppal takes frequency and duty in a single call, so each output keeps
/// the other half of the pair.
pub struct ServoController {
    outputs: HashMap<Channel, Output>,
}

impl ServoController {
    pub fn new(channels: &[Channel]) -> Result<Self> {
        let gpio = Gpio::new()?;
        let mut outputs = HashMap::new();

        for &channel in channels {
            let pin = gpio.get(channel.0)?.into_output();
            info!("GPIO {} initialized", channel);
            outputs.insert(
                channel,
                Output {
                    pin,
                    frequency: 0.0,
                    duty_cycle: 0.0,
                },
            );
        }

        Ok(Self { outputs })
    }

    fn output(&mut self, channel: Channel, call: &'static str) -> Result<&mut Output, HardwareError> {
        self.outputs
            .get_mut(&channel)
            .ok_or_else(|| HardwareError::new(channel, call, "unknown servo"))
    }
}

impl Output {
    fn refresh(&mut self, channel: Channel, call: &'static str) -> Result<(), HardwareError> {
        if self.frequency <= 0.0 {
            // duty cycle is applied once a frequency is known
            return Ok(());
        }
        self.pin
            .set_pwm_frequency(self.frequency, self.duty_cycle)
            .map_err(|e| HardwareError::new(channel, call, e))
    }
}

impl PwmBackend for ServoController {
    fn encoding(&self) -> DutyEncoding {
        DutyEncoding::Fraction
    }

    fn set_frequency(&mut self, channel: Channel, hz: f64) -> Result<(), HardwareError> {
        let output = self.output(channel, "set_frequency")?;
        output.frequency = hz;
        output.refresh(channel, "set_frequency")
    }

    fn set_duty_cycle(&mut self, channel: Channel, duty: f64) -> Result<(), HardwareError> {
        let output = self.output(channel, "set_duty_cycle")?;
        output.duty_cycle = duty.clamp(0.0, 1.0);
        output.refresh(channel, "set_duty_cycle")
    }
}
