// Hardware collaborators consumed by the control loop
//
// Provides:
// - Device traits for encoders, motors and the halt input
// - Simulated wheels for headless runs and tests
// - Feetech STS serial servo backend
// - Keyboard and interrupt halt inputs

pub mod feetech;
pub mod keyboard;
pub mod servo;
pub mod signal;
pub mod sim;

use crate::devices::feetech::FeetechError;

/// Errors raised by device drivers
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Servo bus error: {0}")]
    Bus(#[from] FeetechError),

    #[error("Terminal input error: {0}")]
    Terminal(#[from] std::io::Error),

    #[error("Device {name} is unreachable")]
    Unreachable { name: String },
}

/// Raw quadrature counter
pub trait EncoderDevice {
    /// Signed pulses counted since the previous read
    fn read_delta(&mut self) -> Result<i32, DeviceError>;
}

/// Raw motor output
pub trait MotorDevice {
    /// Apply a normalized duty in [-1.0, 1.0]
    fn set_duty(&mut self, duty: f32) -> Result<(), DeviceError>;

    /// Deliver power to the output
    fn enable(&mut self) -> Result<(), DeviceError>;

    /// Cut power to the output
    fn disable(&mut self) -> Result<(), DeviceError>;
}

/// Digital input polled once per tick to stop the loop
pub trait HaltSignal {
    fn is_pressed(&mut self) -> Result<bool, DeviceError>;
}

/// Halt inputs selected at startup; pressed when any of them is
#[derive(Default)]
pub struct HaltInput {
    keyboard: Option<keyboard::KeyboardHalt>,
    signal: Option<signal::SignalHalt>,
    tick_limit: Option<sim::TickLimit>,
}

impl HaltInput {
    pub fn with_keyboard(mut self, keyboard: keyboard::KeyboardHalt) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn with_signal(mut self, signal: signal::SignalHalt) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_tick_limit(mut self, limit: sim::TickLimit) -> Self {
        self.tick_limit = Some(limit);
        self
    }
}

impl HaltSignal for HaltInput {
    fn is_pressed(&mut self) -> Result<bool, DeviceError> {
        // Poll every input so the tick limit keeps counting
        let mut pressed = false;
        if let Some(keyboard) = self.keyboard.as_mut() {
            pressed |= keyboard.is_pressed()?;
        }
        if let Some(signal) = self.signal.as_mut() {
            pressed |= signal.is_pressed()?;
        }
        if let Some(limit) = self.tick_limit.as_mut() {
            pressed |= limit.is_pressed()?;
        }
        Ok(pressed)
    }
}
