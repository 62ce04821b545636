//! Discrete PID controller for wheel velocity
//!
//! The controller owns its setpoint. Callers change it with
//! [`PidController::set_setpoint`] at any time and the next
//! [`PidController::calculate`] uses the new value.

use crate::config::{AntiWindup, PidGains};

/// PID controller with a fixed sample period
#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    anti_windup: AntiWindup,
    sample_period: f32,
    setpoint: f32,
    integral: f32,
    previous_error: f32,
}

impl PidController {
    pub fn new(gains: PidGains, sample_period: f32) -> Self {
        Self::with_anti_windup(gains, sample_period, AntiWindup::default())
    }

    pub fn with_anti_windup(gains: PidGains, sample_period: f32, anti_windup: AntiWindup) -> Self {
        debug_assert!(sample_period > 0.0);
        Self {
            gains,
            anti_windup,
            sample_period,
            setpoint: 0.0,
            integral: 0.0,
            previous_error: 0.0,
        }
    }

    /// Correction for one sample of the measured value
    pub fn calculate(&mut self, measured: f32) -> f32 {
        let error = self.setpoint - measured;

        self.integral += error * self.sample_period;
        if let Some(limit) = self.anti_windup.integral_limit {
            self.integral = self.integral.clamp(-limit, limit);
        }

        let derivative = (error - self.previous_error) / self.sample_period;
        self.previous_error = error;

        self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative
    }

    pub fn set_setpoint(&mut self, setpoint: f32) {
        if self.anti_windup.reset_integral_on_setpoint_change && setpoint != self.setpoint {
            self.integral = 0.0;
        }
        self.setpoint = setpoint;
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn sample_period(&self) -> f32 {
        self.sample_period
    }
}
