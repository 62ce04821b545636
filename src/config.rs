// Loop rate, choreography, gains and per-wheel calibration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::drive::{Direction, WheelIndex};

// Control loop frequency
pub const TICK_RATE_HZ: u32 = 100;

// How long each move of the sequence is held
pub const DWELL_SECS: f32 = 2.0;

// Signed fraction of max speed used by every move (rev/s at the output shaft)
pub const SEQUENCE_MAGNITUDE: f32 = 0.9;

// Report every Nth tick
pub const REPORT_DIVIDER: u32 = 4;

// Velocity PID gains
pub const VEL_KP: f32 = 30.0;
pub const VEL_KI: f32 = 0.0;
pub const VEL_KD: f32 = 0.4;

// Micro metal motor encoder: counts per motor revolution
pub const MMME_CPR: f32 = 12.0;
// Edges counted per step when microstep counting is on
pub const MICROSTEPS_PER_STEP: f32 = 4.0;

// Gearboxes fitted to the base; the rear-right wheel has the odd one out
pub const GEAR_RATIO: f32 = 50.0;
pub const OTHER_GEAR_RATIO: f32 = 298.0;

// Output speed (rev/s) at full duty for the standard gearbox
pub const SPEED_SCALE: f32 = 5.4;

// Zenoh topics
pub const TOPIC_WHEELS: &str = "quaddrive/state/wheels";
pub const TOPIC_HEALTH: &str = "quaddrive/state/health";

// Servo bus defaults
pub const SERVO_PORT: &str = "/dev/ttyACM0";
pub const SERVO_IDS: [u8; 4] = [1, 2, 3, 4];
pub const SERVO_MAX_RAW: i16 = 3000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: VEL_KP,
            ki: VEL_KI,
            kd: VEL_KD,
        }
    }
}

/// Optional integral management; both off reproduces a plain PID
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiWindup {
    /// Symmetric clamp on the integral accumulator
    pub integral_limit: Option<f32>,
    /// Zero the integral whenever the setpoint changes value
    pub reset_integral_on_setpoint_change: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Counts per motor revolution before the gearbox
    pub counts_per_rev: f32,
    /// Count every quadrature edge instead of whole steps
    pub count_microsteps: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            counts_per_rev: MMME_CPR,
            count_microsteps: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    pub gear_ratio: f32,
    /// Output speed at full duty (rev/s)
    pub speed_scale: f32,
    pub motor_direction: Direction,
    pub encoder_direction: Direction,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            gear_ratio: GEAR_RATIO,
            speed_scale: SPEED_SCALE,
            motor_direction: Direction::Normal,
            encoder_direction: Direction::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoBusConfig {
    pub port: String,
    /// Servo ids in wheel slot order (RR, RL, FL, FR)
    pub ids: [u8; 4],
    /// Goal velocity written at full duty
    pub max_raw_velocity: i16,
}

impl Default for ServoBusConfig {
    fn default() -> Self {
        Self {
            port: SERVO_PORT.to_string(),
            ids: SERVO_IDS,
            max_raw_velocity: SERVO_MAX_RAW,
        }
    }
}

/// Everything fixed at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub tick_rate_hz: u32,
    pub dwell_secs: f32,
    pub magnitude: f32,
    pub report_divider: u32,
    pub gains: PidGains,
    pub anti_windup: AntiWindup,
    pub encoder: EncoderConfig,
    /// Per-wheel calibration in slot order (RR, RL, FL, FR)
    pub wheels: [WheelConfig; 4],
    pub servo_bus: ServoBusConfig,
}

impl Default for DriveConfig {
    fn default() -> Self {
        let standard = WheelConfig::default();
        let mut wheels = [standard; 4];

        wheels[WheelIndex::RearRight.index()] = WheelConfig {
            gear_ratio: OTHER_GEAR_RATIO,
            speed_scale: SPEED_SCALE * (GEAR_RATIO / OTHER_GEAR_RATIO),
            encoder_direction: Direction::Reversed,
            ..standard
        };
        // The left side is mounted mirrored
        for wheel in [WheelIndex::FrontLeft, WheelIndex::RearLeft] {
            wheels[wheel.index()].motor_direction = Direction::Reversed;
            wheels[wheel.index()].encoder_direction = Direction::Reversed;
        }

        Self {
            tick_rate_hz: TICK_RATE_HZ,
            dwell_secs: DWELL_SECS,
            magnitude: SEQUENCE_MAGNITUDE,
            report_divider: REPORT_DIVIDER,
            gains: PidGains::default(),
            anti_windup: AntiWindup::default(),
            encoder: EncoderConfig::default(),
            wheels,
            servo_bus: ServoBusConfig::default(),
        }
    }
}

impl DriveConfig {
    /// Defaults for wheels driven by Feetech servos: the encoder is the
    /// 4096-step shaft position and there is no external gearbox
    pub fn servo_defaults() -> Self {
        let servo_wheel = WheelConfig {
            gear_ratio: 1.0,
            ..WheelConfig::default()
        };
        let mut config = Self {
            encoder: EncoderConfig {
                counts_per_rev: crate::devices::feetech::STEPS_PER_REVOLUTION as f32,
                count_microsteps: false,
            },
            wheels: [servo_wheel; 4],
            ..Self::default()
        };
        for wheel in [WheelIndex::FrontLeft, WheelIndex::RearLeft] {
            config.wheels[wheel.index()].motor_direction = Direction::Reversed;
            config.wheels[wheel.index()].encoder_direction = Direction::Reversed;
        }
        config
    }

    /// Load a JSON config; missing fields keep the given base values
    pub fn load(path: &Path, base: &DriveConfig) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json(&text, base)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse JSON over a base config and validate the result
    pub fn from_json(text: &str, base: &DriveConfig) -> Result<Self, ConfigError> {
        let mut merged = serde_json::to_value(base)?;
        let overrides: serde_json::Value = serde_json::from_str(text)?;
        merge_json(&mut merged, overrides);
        let config: DriveConfig = serde_json::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate_hz == 0 {
            return Err(ConfigError::Invalid("tick_rate_hz must be positive".into()));
        }
        if !(self.dwell_secs.is_finite() && self.dwell_ticks() >= 1) {
            return Err(ConfigError::Invalid(format!(
                "dwell_secs {} is shorter than one tick",
                self.dwell_secs
            )));
        }
        if !self.magnitude.is_finite() {
            return Err(ConfigError::Invalid("magnitude must be finite".into()));
        }
        if self.report_divider == 0 {
            return Err(ConfigError::Invalid("report_divider must be positive".into()));
        }
        let PidGains { kp, ki, kd } = self.gains;
        if ![kp, ki, kd].iter().all(|g| g.is_finite()) {
            return Err(ConfigError::Invalid("PID gains must be finite".into()));
        }
        if let Some(limit) = self.anti_windup.integral_limit {
            if !(limit >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "integral_limit {} must be non-negative",
                    limit
                )));
            }
        }
        if !(self.encoder.counts_per_rev > 0.0) {
            return Err(ConfigError::Invalid("encoder counts_per_rev must be positive".into()));
        }
        for wheel in WheelIndex::ALL {
            let w = &self.wheels[wheel.index()];
            if !(w.gear_ratio > 0.0 && w.speed_scale > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "wheel {} needs a positive gear_ratio and speed_scale",
                    wheel
                )));
            }
        }
        if self.servo_bus.max_raw_velocity <= 0 {
            return Err(ConfigError::Invalid(format!(
                "servo max_raw_velocity {} must be positive",
                self.servo_bus.max_raw_velocity
            )));
        }
        Ok(())
    }

    /// A zero tick rate (rejected by `validate`) is treated as 1Hz
    pub fn tick_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.tick_rate_hz.max(1) as u64)
    }

    /// Ticks each sequence move is held for
    pub fn dwell_ticks(&self) -> u32 {
        (self.dwell_secs * self.tick_rate_hz as f32).round() as u32
    }

    /// Encoder counts per revolution of the wheel's output shaft
    pub fn counts_per_rev(&self, wheel: WheelIndex) -> f32 {
        let microsteps = if self.encoder.count_microsteps {
            MICROSTEPS_PER_STEP
        } else {
            1.0
        };
        self.encoder.counts_per_rev * self.wheels[wheel.index()].gear_ratio * microsteps
    }
}

/// Overlay `overrides` onto `base`, recursing into objects
fn merge_json(base: &mut serde_json::Value, overrides: serde_json::Value) {
    match (base, overrides) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_match_reference_base() {
        let config = DriveConfig::default();
        assert_eq!(config.tick_period(), Duration::from_millis(10));
        assert_eq!(config.dwell_ticks(), 200);
        assert_relative_eq!(config.counts_per_rev(WheelIndex::FrontLeft), 2400.0);
        assert_relative_eq!(config.counts_per_rev(WheelIndex::RearRight), 14304.0);

        let rr = config.wheels[WheelIndex::RearRight.index()];
        assert_relative_eq!(rr.speed_scale, 5.4 * 50.0 / 298.0, epsilon = 1e-6);
        assert_eq!(rr.motor_direction, Direction::Normal);
        assert_eq!(rr.encoder_direction, Direction::Reversed);

        let fr = config.wheels[WheelIndex::FrontRight.index()];
        assert_eq!(fr.motor_direction, Direction::Normal);
        assert_eq!(fr.encoder_direction, Direction::Normal);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let base = DriveConfig::default();
        let config = DriveConfig::from_json(
            r#"{ "tick_rate_hz": 50, "gains": { "ki": 0.5 }, "anti_windup": { "integral_limit": 2.0 } }"#,
            &base,
        )
        .unwrap();
        assert_eq!(config.tick_rate_hz, 50);
        assert_eq!(config.dwell_ticks(), 100);
        assert_relative_eq!(config.gains.kp, VEL_KP);
        assert_relative_eq!(config.gains.ki, 0.5);
        assert_eq!(config.anti_windup.integral_limit, Some(2.0));
        assert_eq!(config.wheels, base.wheels);
    }

    #[test]
    fn test_rejects_zero_tick_rate() {
        let result = DriveConfig::from_json(r#"{ "tick_rate_hz": 0 }"#, &DriveConfig::default());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_dwell_shorter_than_a_tick() {
        let config = DriveConfig {
            dwell_secs: 0.001,
            ..DriveConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unvalidated_zero_tick_rate_has_a_period() {
        let config = DriveConfig {
            tick_rate_hz: 0,
            ..DriveConfig::default()
        };
        assert_eq!(config.tick_period(), Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_non_positive_servo_velocity() {
        let result = DriveConfig::from_json(
            r#"{ "servo_bus": { "max_raw_velocity": 0 } }"#,
            &DriveConfig::servo_defaults(),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let result = DriveConfig::from_json("{ not json", &DriveConfig::default());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_servo_defaults() {
        let config = DriveConfig::servo_defaults();
        assert_relative_eq!(config.counts_per_rev(WheelIndex::RearRight), 4096.0);
        assert!(config.validate().is_ok());
    }
}
