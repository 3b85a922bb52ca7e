use anyhow::Result;
use rppal::gpio::{Gpio, InputPin, Level};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Edge {
    Rising,
    Falling,
}

struct ButtonState {
    current: Level,
    last_stable: Level,
    last_change: Instant,
}

impl ButtonState {
    fn new(now: Instant) -> Self {
        ButtonState {
            current: Level::Low,
            last_stable: Level::Low,
            last_change: now,
        }
    }

    /// A level must hold for `debounce` before it becomes the stable level.
    fn update(&mut self, new_level: Level, now: Instant, debounce: Duration) -> Option<Edge> {
        if new_level != self.current {
            self.current = new_level;
            self.last_change = now;
            return None;
        }

        if now.saturating_duration_since(self.last_change) >= debounce && self.current != self.last_stable {
            self.last_stable = self.current;
            return Some(if self.current == Level::High {
                Edge::Rising
            } else {
                Edge::Falling
            });
        }

        None
    }
}

pub struct ButtonReader {
    pins: Vec<InputPin>,
    states: Vec<ButtonState>,
    debounce: Duration,
}

impl ButtonReader {
    pub fn new(pin_numbers: &[u8], debounce: Duration) -> Result<Self> {
        let gpio = Gpio::new()?;
        let now = Instant::now();
        let mut pins = Vec::new();
        let mut states = Vec::new();

        for &pin_num in pin_numbers {
            let pin = gpio.get(pin_num)?.into_input_pulldown();
            info!("GPIO {} initialized", pin_num);
            pins.push(pin);
            states.push(ButtonState::new(now));
        }

        Ok(ButtonReader { pins, states, debounce })
    }

    pub fn read_and_detect_edges(&mut self) -> Vec<Option<Edge>> {
        let now = Instant::now();
        let debounce = self.debounce;
        self.pins
            .iter()
            .zip(self.states.iter_mut())
            .enumerate()
            .map(|(i, (pin, state))| {
                let edge = state.update(pin.read(), now, debounce);
                if let Some(edge) = edge {
                    debug!("[EVENT] button {} {:?}", i, edge);
                }
                edge
            })
            .collect()
    }

    pub fn is_pressed(&self, button_index: usize) -> bool {
        self.states
            .get(button_index)
            .is_some_and(|s| s.last_stable == Level::High)
    }
}
