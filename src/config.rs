use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::actuator::Channel;
use crate::error::ConfigError;
use crate::mapper::DutyRange;
use crate::recorder::RecorderConfig;
use crate::watchdog::FailsafeWatchdog;

/// Vehicle-side settings, stored as JSON next to the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub steering_gpio: u8,
    pub throttle_gpio: u8,
    pub frequency: f64,   // PWM frequency (Hz)
    pub min_duty: f64,    // percent, 1 ms pulse at 50 Hz
    pub idle_duty: f64,   // percent, neutral
    pub max_duty: f64,    // percent, 2 ms pulse at 50 Hz
    pub tick_hz: u32,
    pub watchdog_multiplier: u32,
    pub listen_port: u16,
    pub recorder: RecorderConfig,
    pub session_path: Option<String>,
    pub dry_run: bool,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        VehicleConfig {
            steering_gpio: 19,
            throttle_gpio: 12,
            frequency: 50.0,
            min_duty: 5.0,
            idle_duty: 7.5,
            max_duty: 10.0,
            tick_hz: 50,
            watchdog_multiplier: 10,
            listen_port: 13337,
            recorder: RecorderConfig::default(),
            session_path: None,
            dry_run: false,
        }
    }
}

impl VehicleConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: VehicleConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Loads `path`, or writes the defaults there when it does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => {
                info!("loaded {}", path.display());
                Ok(config)
            }
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                warn!("{} not found, writing defaults", path.display());
                let config = VehicleConfig::default();
                config.save(path)?;
                Ok(config)
            }
            Err(e) => Err(e),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.steering_gpio == self.throttle_gpio {
            return invalid(format!("steering and throttle share gpio {}", self.steering_gpio));
        }
        if !(self.frequency > 0.0) {
            return invalid(format!("frequency must be positive, got {}", self.frequency));
        }
        if !(self.min_duty < self.max_duty) {
            return invalid(format!("min_duty {} must be below max_duty {}", self.min_duty, self.max_duty));
        }
        if !(self.min_duty..=self.max_duty).contains(&self.idle_duty) {
            return invalid(format!("idle_duty {} outside [{}, {}]", self.idle_duty, self.min_duty, self.max_duty));
        }
        if self.min_duty < 0.0 || self.max_duty > 100.0 {
            return invalid(String::from("duty cycle must stay within 0..=100 percent"));
        }
        if self.tick_hz == 0 {
            return invalid(String::from("tick_hz must be positive"));
        }
        if self.tick_period().is_zero() {
            return invalid(format!("tick_hz {} leaves no time for a tick", self.tick_hz));
        }
        if self.watchdog_multiplier < 2 {
            return invalid(format!("watchdog_multiplier {} below 2", self.watchdog_multiplier));
        }
        if self.recorder.max_len == 0 {
            return invalid(String::from("recorder.max_len must be positive"));
        }
        Ok(())
    }

    pub fn steering(&self) -> Channel {
        Channel(self.steering_gpio)
    }

    pub fn throttle(&self) -> Channel {
        Channel(self.throttle_gpio)
    }

    pub fn duty_range(&self) -> DutyRange {
        DutyRange::new(self.min_duty, self.max_duty)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.tick_hz.max(1)))
    }

    pub fn watchdog_timeout(&self) -> Duration {
        FailsafeWatchdog::recommended_timeout(self.tick_hz, self.watchdog_multiplier)
    }

    /// Half the watchdog timeout, so a receive attempt fails before the
    /// loop's own deadline does.
    pub fn receive_timeout(&self) -> Duration {
        self.watchdog_timeout() / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = VehicleConfig::default();
        config.validate().unwrap();
        assert_eq!(config.tick_period(), Duration::from_millis(20));
        assert_eq!(config.watchdog_timeout(), Duration::from_millis(200));
        assert_eq!(config.receive_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn rejects_inverted_duty_range() {
        let config = VehicleConfig {
            min_duty: 10.0,
            max_duty: 5.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_idle_outside_range() {
        let config = VehicleConfig {
            idle_duty: 12.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_short_watchdog_and_shared_gpio() {
        let short = VehicleConfig {
            watchdog_multiplier: 1,
            ..Default::default()
        };
        assert!(short.validate().is_err());

        let shared = VehicleConfig {
            throttle_gpio: 19,
            ..Default::default()
        };
        assert!(shared.validate().is_err());
    }

    #[test]
    fn rejects_tick_rate_without_a_period() {
        let too_fast = VehicleConfig {
            tick_hz: 2_000_000,
            ..Default::default()
        };
        assert!(matches!(too_fast.validate(), Err(ConfigError::Invalid(_))));

        let fastest = VehicleConfig {
            tick_hz: 1_000_000,
            ..Default::default()
        };
        fastest.validate().unwrap();
        assert_eq!(fastest.tick_period(), Duration::from_micros(1));
        assert!(!fastest.watchdog_timeout().is_zero());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: VehicleConfig =
            serde_json::from_str(r#"{"tick_hz": 100, "recorder": {"max_len": 10}}"#).unwrap();
        assert_eq!(config.tick_hz, 100);
        assert_eq!(config.recorder.max_len, 10);
        assert!(config.recorder.retain_on_stop);
        assert_eq!(config.steering_gpio, 19);
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("pizdrive-config-{}.json", std::process::id()));
        let config = VehicleConfig {
            dry_run: true,
            session_path: Some(String::from("session.bin")),
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(VehicleConfig::load(&path).unwrap(), config);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_writes_defaults() {
        let path = std::env::temp_dir().join(format!("pizdrive-default-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let config = VehicleConfig::load_or_default(&path).unwrap();
        assert_eq!(config, VehicleConfig::default());
        assert!(path.exists());
        std::fs::remove_file(&path).unwrap();
    }
}
