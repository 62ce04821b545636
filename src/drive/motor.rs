// Motor actuator: holds the speed command and drives the raw output
use tracing::debug;

use super::wheel::Direction;
use crate::devices::{DeviceError, MotorDevice};

/// A motor with a speed scale and mounting polarity
///
/// Speed is in output units (rev/s); the duty sent to the device is
/// speed / speed_scale, clamped to [-1.0, 1.0] before submission. The last
/// command is held until changed.
pub struct MotorActuator<M> {
    device: M,
    speed_scale: f32,
    direction: Direction,
    duty: f32,
    enabled: bool,
}

impl<M: MotorDevice> MotorActuator<M> {
    pub fn new(device: M, speed_scale: f32, direction: Direction) -> Self {
        Self {
            device,
            speed_scale,
            direction,
            duty: 0.0,
            enabled: false,
        }
    }

    /// Current command in output units
    pub fn speed(&self) -> f32 {
        self.duty * self.speed_scale
    }

    /// Current command as normalized duty in [-1.0, 1.0]
    pub fn duty(&self) -> f32 {
        self.duty
    }

    /// Command a new speed; values beyond +/- speed_scale saturate
    pub fn set_speed(&mut self, speed: f32) -> Result<(), DeviceError> {
        self.set_duty(speed / self.speed_scale)
    }

    pub fn set_duty(&mut self, duty: f32) -> Result<(), DeviceError> {
        // NaN would stick forever in an integrating command
        let duty = if duty.is_nan() { 0.0 } else { duty.clamp(-1.0, 1.0) };
        self.device.set_duty(duty * self.direction.sign())?;
        self.duty = duty;
        Ok(())
    }

    /// Flip the output for a mirrored installation; re-applies the held command
    pub fn set_direction(&mut self, direction: Direction) -> Result<(), DeviceError> {
        self.direction = direction;
        self.set_duty(self.duty)
    }

    pub fn enable(&mut self) -> Result<(), DeviceError> {
        self.device.enable()?;
        self.enabled = true;
        debug!("Motor enabled");
        Ok(())
    }

    pub fn disable(&mut self) -> Result<(), DeviceError> {
        self.device.disable()?;
        self.enabled = false;
        debug!("Motor disabled");
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Recorder {
        duty: Rc<Cell<f32>>,
        enabled: Rc<Cell<bool>>,
    }

    impl MotorDevice for Recorder {
        fn set_duty(&mut self, duty: f32) -> Result<(), DeviceError> {
            self.duty.set(duty);
            Ok(())
        }
        fn enable(&mut self) -> Result<(), DeviceError> {
            self.enabled.set(true);
            Ok(())
        }
        fn disable(&mut self) -> Result<(), DeviceError> {
            self.enabled.set(false);
            Ok(())
        }
    }

    #[test]
    fn test_speed_scale() {
        let out = Recorder::default();
        let mut motor = MotorActuator::new(out.clone(), 5.4, Direction::Normal);
        motor.set_speed(2.7).unwrap();
        assert_relative_eq!(motor.duty(), 0.5);
        assert_relative_eq!(motor.speed(), 2.7);
        assert_relative_eq!(out.duty.get(), 0.5);
    }

    #[test]
    fn test_command_is_clamped_before_submission() {
        let out = Recorder::default();
        let mut motor = MotorActuator::new(out.clone(), 5.4, Direction::Normal);
        motor.set_speed(100.0).unwrap();
        assert_eq!(out.duty.get(), 1.0);
        assert_relative_eq!(motor.speed(), 5.4);
        motor.set_speed(-100.0).unwrap();
        assert_eq!(out.duty.get(), -1.0);
        motor.set_speed(f32::NAN).unwrap();
        assert_eq!(out.duty.get(), 0.0);
    }

    #[test]
    fn test_reversed_direction_mirrors_output_only() {
        let normal_out = Recorder::default();
        let reversed_out = Recorder::default();
        let mut normal = MotorActuator::new(normal_out.clone(), 5.4, Direction::Normal);
        let mut reversed = MotorActuator::new(reversed_out.clone(), 5.4, Direction::Reversed);

        normal.set_speed(1.2).unwrap();
        reversed.set_speed(1.2).unwrap();
        assert_eq!(reversed_out.duty.get(), -normal_out.duty.get());
        assert_eq!(reversed.speed(), normal.speed());
    }

    #[test]
    fn test_set_direction_reapplies_command() {
        let out = Recorder::default();
        let mut motor = MotorActuator::new(out.clone(), 1.0, Direction::Normal);
        motor.set_speed(0.3).unwrap();
        motor.set_direction(Direction::Reversed).unwrap();
        assert_relative_eq!(out.duty.get(), -0.3);
    }

    #[test]
    fn test_enable_disable_hold_command() {
        let out = Recorder::default();
        let mut motor = MotorActuator::new(out.clone(), 1.0, Direction::Normal);
        motor.enable().unwrap();
        motor.set_speed(0.4).unwrap();
        motor.disable().unwrap();
        assert!(!out.enabled.get());
        assert!(!motor.is_enabled());
        assert_relative_eq!(motor.speed(), 0.4);
    }
}
