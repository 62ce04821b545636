// Closed-loop velocity control for the four-wheel base
//
// Provides:
// - Encoder channels and motor actuators wrapping raw devices
// - Discrete PID velocity controller
// - Per-wheel velocity loop and the motion sequencer
// - DriveSystem, which runs one control cycle per tick

mod encoder;
mod motor;
mod pid;
mod sequencer;
mod system;
mod velocity_loop;
mod wheel;

pub use encoder::{EncoderCapture, EncoderChannel};
pub use motor::MotorActuator;
pub use pid::PidController;
pub use sequencer::{MotionSequencer, SequenceStep, WheelSetpoints};
pub use system::{DriveError, DriveSystem, TickReport};
pub use velocity_loop::VelocityLoop;
pub use wheel::{Direction, WheelIndex};
