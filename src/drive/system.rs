// The drive system: four velocity loops and the sequencer that feeds them
use std::time::Duration;

use tracing::{info, warn};

use super::encoder::{EncoderCapture, EncoderChannel};
use super::motor::MotorActuator;
use super::pid::PidController;
use super::sequencer::{MotionSequencer, SequenceStep, WheelSetpoints};
use super::velocity_loop::VelocityLoop;
use super::wheel::WheelIndex;
use crate::config::DriveConfig;
use crate::devices::{DeviceError, EncoderDevice, MotorDevice};

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Encoder read failed on wheel {wheel}: {source}")]
    EncoderRead {
        wheel: WheelIndex,
        source: DeviceError,
    },

    #[error("Motor command failed on wheel {wheel}: {source}")]
    MotorWrite {
        wheel: WheelIndex,
        source: DeviceError,
    },

    #[error("Halt input read failed: {0}")]
    HaltRead(DeviceError),
}

/// What happened during one tick, for diagnostics
#[derive(Debug, Clone, Copy)]
pub struct TickReport {
    /// Zero-based tick number
    pub tick: u64,
    pub step: SequenceStep,
    /// Set when this tick moved the sequence on
    pub transitioned: bool,
    pub setpoints: WheelSetpoints,
    /// In wheel slot order
    pub captures: [EncoderCapture; 4],
    /// Normalized duty after the update, in wheel slot order
    pub commands: [f32; 4],
}

/// Owns every wheel's control state; built once and driven one tick at a time
pub struct DriveSystem<E, M> {
    loops: [VelocityLoop<E, M>; 4],
    sequencer: MotionSequencer,
    ticks: u64,
}

impl<E: EncoderDevice, M: MotorDevice> DriveSystem<E, M> {
    /// Wire up devices given in wheel slot order (RR, RL, FL, FR)
    pub fn new(config: &DriveConfig, devices: [(E, M); 4]) -> Self {
        let sample_period = config.tick_period().as_secs_f32();
        let mut slot = 0;
        let loops = devices.map(|(encoder, motor)| {
            let wheel = WheelIndex::ALL[slot];
            slot += 1;
            let wheel_config = &config.wheels[wheel.index()];
            VelocityLoop::new(
                wheel,
                EncoderChannel::new(
                    encoder,
                    config.counts_per_rev(wheel),
                    wheel_config.encoder_direction,
                ),
                PidController::with_anti_windup(config.gains, sample_period, config.anti_windup),
                MotorActuator::new(motor, wheel_config.speed_scale, wheel_config.motor_direction),
            )
        });

        let mut system = Self {
            loops,
            sequencer: MotionSequencer::new(config.dwell_ticks(), config.magnitude),
            ticks: 0,
        };
        system.apply_setpoints(system.sequencer.setpoints());
        system
    }

    /// Run one control cycle: capture all wheels, advance the sequence,
    /// then update every wheel from its capture
    pub fn tick(&mut self, now: Duration) -> Result<TickReport, DriveError> {
        let mut captures = [EncoderCapture::default(); 4];
        for (capture, wheel_loop) in captures.iter_mut().zip(self.loops.iter_mut()) {
            *capture = wheel_loop
                .capture(now)
                .map_err(|source| DriveError::EncoderRead {
                    wheel: wheel_loop.wheel(),
                    source,
                })?;
        }

        let transitioned = match self.sequencer.advance() {
            Some(step) => {
                info!("Sequence -> {} (tick {})", step, self.ticks);
                self.apply_setpoints(self.sequencer.setpoints());
                true
            }
            None => false,
        };

        let mut commands = [0.0; 4];
        for ((command, wheel_loop), capture) in
            commands.iter_mut().zip(self.loops.iter_mut()).zip(captures.iter())
        {
            wheel_loop
                .update(capture)
                .map_err(|source| DriveError::MotorWrite {
                    wheel: wheel_loop.wheel(),
                    source,
                })?;
            *command = wheel_loop.motor().duty();
        }

        let report = TickReport {
            tick: self.ticks,
            step: self.sequencer.step(),
            transitioned,
            setpoints: self.sequencer.setpoints(),
            captures,
            commands,
        };
        self.ticks += 1;
        Ok(report)
    }

    fn apply_setpoints(&mut self, setpoints: WheelSetpoints) {
        for wheel_loop in &mut self.loops {
            wheel_loop.set_setpoint(setpoints.get(wheel_loop.wheel()));
        }
    }

    pub fn enable_all(&mut self) -> Result<(), DriveError> {
        info!("Enabling all motors");
        for wheel_loop in &mut self.loops {
            let wheel = wheel_loop.wheel();
            wheel_loop
                .motor_mut()
                .enable()
                .map_err(|source| DriveError::MotorWrite { wheel, source })?;
        }
        Ok(())
    }

    /// Disable every motor, attempting all of them even if some fail
    ///
    /// Returns the first failure.
    pub fn disable_all(&mut self) -> Result<(), DriveError> {
        info!("Disabling all motors");
        let mut first_error = None;
        for wheel_loop in &mut self.loops {
            let wheel = wheel_loop.wheel();
            if let Err(source) = wheel_loop.motor_mut().disable() {
                warn!("Failed to disable motor {}: {}", wheel, source);
                first_error.get_or_insert(DriveError::MotorWrite { wheel, source });
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn wheel(&self, wheel: WheelIndex) -> &VelocityLoop<E, M> {
        &self.loops[wheel.index()]
    }

    pub fn sequencer(&self) -> &MotionSequencer {
        &self.sequencer
    }

    /// Ticks completed so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
