// One feedback-controlled wheel: encoder -> PID -> motor
use std::time::Duration;

use super::encoder::{EncoderCapture, EncoderChannel};
use super::motor::MotorActuator;
use super::pid::PidController;
use super::wheel::WheelIndex;
use crate::devices::{DeviceError, EncoderDevice, MotorDevice};

pub struct VelocityLoop<E, M> {
    wheel: WheelIndex,
    encoder: EncoderChannel<E>,
    pid: PidController,
    motor: MotorActuator<M>,
}

impl<E: EncoderDevice, M: MotorDevice> VelocityLoop<E, M> {
    pub fn new(
        wheel: WheelIndex,
        encoder: EncoderChannel<E>,
        pid: PidController,
        motor: MotorActuator<M>,
    ) -> Self {
        Self {
            wheel,
            encoder,
            pid,
            motor,
        }
    }

    pub fn capture(&mut self, now: Duration) -> Result<EncoderCapture, DeviceError> {
        self.encoder.capture(now)
    }

    /// Feed a capture through the PID and integrate the resulting
    /// acceleration into the held speed command over one tick
    pub fn update(&mut self, capture: &EncoderCapture) -> Result<f32, DeviceError> {
        let accel = self.pid.calculate(capture.revolutions_per_second);
        let speed = self.motor.speed() + accel * self.pid.sample_period();
        self.motor.set_speed(speed)?;
        Ok(accel)
    }

    pub fn set_setpoint(&mut self, setpoint: f32) {
        self.pid.set_setpoint(setpoint);
    }

    pub fn wheel(&self) -> WheelIndex {
        self.wheel
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    pub fn motor(&self) -> &MotorActuator<M> {
        &self.motor
    }

    pub fn motor_mut(&mut self) -> &mut MotorActuator<M> {
        &mut self.motor
    }
}
