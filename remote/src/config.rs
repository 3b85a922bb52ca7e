use pizdrive::input::InputShaper;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::time::Duration;

/// Calibration of one analog axis read through the ADC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    pub name: String,
    pub adc: usize,       // MCP3008 channel
    pub min: u16,         // raw reading at full travel to one side
    pub center: u16,      // raw reading at rest
    pub max: u16,         // raw reading at full travel to the other side
}

impl AxisConfig {
    fn new(name: &'static str, adc: usize) -> Self {
        AxisConfig {
            name: String::from(name),
            adc,
            min: 0,
            center: 512,
            max: 1023,
        }
    }

    /// Maps a raw reading to [-1, 1]: [min, center] to [-1, 0] and
    /// [center, max] to [0, 1].
    pub fn normalize(&self, raw: u16) -> f64 {
        let raw = f64::from(raw);
        let center = f64::from(self.center);

        let value = if raw >= center {
            let span = f64::from(self.max) - center;
            if span <= 0.0 { 0.0 } else { (raw - center) / span }
        } else {
            let span = center - f64::from(self.min);
            if span <= 0.0 { 0.0 } else { (raw - center) / span }
        };
        value.clamp(-1.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ButtonPins {
    pub stop: u8,
    pub turbo: u8,
    pub record: u8,
    pub play: u8,
}

impl ButtonPins {
    pub fn as_array(&self) -> [u8; 4] {
        [self.stop, self.turbo, self.record, self.play]
    }
}

pub const BUTTON_STOP: usize = 0;
pub const BUTTON_TURBO: usize = 1;
pub const BUTTON_RECORD: usize = 2;
pub const BUTTON_PLAY: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(skip)]
    settings_path: String,
    pub vehicle_host: String,
    pub vehicle_port: u16,
    pub publish_hz: u32,
    pub debounce_ms: u64,
    pub shaper: InputShaper,
    pub steering: AxisConfig,
    pub brake: AxisConfig,
    pub accelerator: AxisConfig,
    pub buttons: ButtonPins,
}

impl Settings {
    pub fn new(settings_path: &str) -> Self {
        Settings {
            settings_path: settings_path.to_string(),
            vehicle_host: String::from("192.168.1.10"),
            vehicle_port: 13337,
            publish_hz: 50,
            debounce_ms: 20,
            shaper: InputShaper::default(),
            steering: AxisConfig::new("Steering", 0),
            brake: AxisConfig::new("Brake", 1),
            accelerator: AxisConfig::new("Accelerator", 2),
            buttons: ButtonPins {
                stop: 25,
                turbo: 24,
                record: 23,
                play: 18,
            },
        }
    }

    pub fn publish_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.publish_hz.max(1)))
    }

    pub fn save(&self) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;

        let mut file = fs::File::create(&self.settings_path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    pub fn load(&mut self) -> io::Result<()> {
        let content = fs::read_to_string(&self.settings_path)?;
        let mut loaded: Settings = serde_json::from_str(&content).map_err(io::Error::other)?;
        loaded.settings_path = self.settings_path.clone();
        *self = loaded;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_normalization() {
        let axis = AxisConfig::new("Steering", 0);
        assert_eq!(axis.normalize(0), -1.0);
        assert_eq!(axis.normalize(512), 0.0);
        assert_eq!(axis.normalize(1023), 1.0);
        assert!((axis.normalize(256) + 0.5).abs() < 1e-9);
    }

    #[test]
    fn calibrated_axis_clamps() {
        let axis = AxisConfig {
            min: 100,
            center: 500,
            max: 900,
            ..AxisConfig::new("Brake", 1)
        };
        assert_eq!(axis.normalize(20), -1.0);
        assert_eq!(axis.normalize(1000), 1.0);
        assert_eq!(axis.normalize(700), 0.5);
    }

    #[test]
    fn settings_round_trip() {
        let path = std::env::temp_dir().join(format!("pizremote-{}.json", std::process::id()));
        let path = path.to_string_lossy().into_owned();

        let mut settings = Settings::new(&path);
        settings.vehicle_host = String::from("10.0.0.2");
        settings.save().unwrap();

        let mut loaded = Settings::new(&path);
        loaded.load().unwrap();
        assert_eq!(loaded, settings);
        std::fs::remove_file(&path).unwrap();
    }
}
