// Simulated wheels for running the loop without hardware
//
// Each wheel is a first-order plant: the shaft speed relaxes toward
// duty * max speed with a fixed time constant, and a quantized pulse counter
// integrates it. The encoder and motor handles of a wheel share the plant.

use std::cell::RefCell;
use std::rc::Rc;

use super::{DeviceError, EncoderDevice, HaltSignal, MotorDevice};
use crate::config::DriveConfig;
use crate::drive::WheelIndex;

/// Time constant of the simulated drivetrain (seconds)
pub const DEFAULT_TIME_CONSTANT: f32 = 0.05;

#[derive(Debug, Clone)]
struct WheelPlant {
    duty: f32,
    enabled: bool,
    shaft_rps: f32,
    max_rps: f32,
    counts_per_rev: f32,
    // Pulse direction as seen by the counter (motor and encoder wiring combined)
    pulse_sign: f32,
    pending_counts: f64,
    time_constant: f32,
    dt: f32,
}

impl WheelPlant {
    fn step(&mut self) {
        let target = if self.enabled {
            self.duty * self.max_rps
        } else {
            0.0
        };
        let blend = (self.dt / self.time_constant).min(1.0);
        self.shaft_rps += (target - self.shaft_rps) * blend;
        self.pending_counts +=
            (self.shaft_rps * self.counts_per_rev * self.dt * self.pulse_sign) as f64;
    }

    fn take_whole_counts(&mut self) -> i32 {
        let whole = self.pending_counts.trunc();
        self.pending_counts -= whole;
        whole as i32
    }
}

/// Read-only view of a simulated wheel for tests and diagnostics
#[derive(Clone)]
pub struct SimProbe {
    plant: Rc<RefCell<WheelPlant>>,
}

impl SimProbe {
    pub fn duty(&self) -> f32 {
        self.plant.borrow().duty
    }

    pub fn is_enabled(&self) -> bool {
        self.plant.borrow().enabled
    }

    /// Physical shaft speed, before any encoder polarity
    pub fn shaft_rps(&self) -> f32 {
        self.plant.borrow().shaft_rps
    }
}

/// Pulse counter attached to a simulated wheel
///
/// Each read advances the plant by one tick period, so it must be read
/// exactly once per tick.
pub struct SimEncoder {
    plant: Rc<RefCell<WheelPlant>>,
}

impl EncoderDevice for SimEncoder {
    fn read_delta(&mut self) -> Result<i32, DeviceError> {
        let mut plant = self.plant.borrow_mut();
        plant.step();
        Ok(plant.take_whole_counts())
    }
}

/// Motor output attached to a simulated wheel
pub struct SimMotor {
    plant: Rc<RefCell<WheelPlant>>,
}

impl MotorDevice for SimMotor {
    fn set_duty(&mut self, duty: f32) -> Result<(), DeviceError> {
        self.plant.borrow_mut().duty = duty;
        Ok(())
    }

    fn enable(&mut self) -> Result<(), DeviceError> {
        self.plant.borrow_mut().enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), DeviceError> {
        self.plant.borrow_mut().enabled = false;
        Ok(())
    }
}

/// A simulated wheel's encoder, motor and probe
pub struct SimWheel {
    pub encoder: SimEncoder,
    pub motor: SimMotor,
    pub probe: SimProbe,
}

/// Build four simulated wheels wired to match the configured polarities
pub fn sim_wheels(config: &DriveConfig) -> [SimWheel; 4] {
    WheelIndex::ALL.map(|wheel| {
        let wheel_config = &config.wheels[wheel.index()];
        // A reversed motor spins the shaft backwards; a reversed encoder counts
        // backwards. The combination is what the raw counter sees.
        let wiring = wheel_config
            .motor_direction
            .compose(wheel_config.encoder_direction);
        let plant = Rc::new(RefCell::new(WheelPlant {
            duty: 0.0,
            enabled: false,
            shaft_rps: 0.0,
            max_rps: wheel_config.speed_scale,
            counts_per_rev: config.counts_per_rev(wheel),
            pulse_sign: wiring.sign(),
            pending_counts: 0.0,
            time_constant: DEFAULT_TIME_CONSTANT,
            dt: config.tick_period().as_secs_f32(),
        }));
        SimWheel {
            encoder: SimEncoder {
                plant: Rc::clone(&plant),
            },
            motor: SimMotor {
                plant: Rc::clone(&plant),
            },
            probe: SimProbe { plant },
        }
    })
}

/// Halt input that reads pressed once a number of polls have gone by
#[derive(Debug, Clone)]
pub struct TickLimit {
    remaining: u64,
}

impl TickLimit {
    /// Allow `ticks` polls to read released; the next one reads pressed
    pub fn new(ticks: u64) -> Self {
        Self { remaining: ticks }
    }
}

impl HaltSignal for TickLimit {
    fn is_pressed(&mut self) -> Result<bool, DeviceError> {
        if self.remaining == 0 {
            return Ok(true);
        }
        self.remaining -= 1;
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_wheel_does_not_move() {
        let config = DriveConfig::default();
        let [mut wheel, ..] = sim_wheels(&config);
        wheel.motor.set_duty(1.0).unwrap();
        for _ in 0..10 {
            assert_eq!(wheel.encoder.read_delta().unwrap(), 0);
        }
        assert_eq!(wheel.probe.shaft_rps(), 0.0);
    }

    #[test]
    fn test_enabled_wheel_reaches_commanded_speed() {
        let config = DriveConfig::default();
        let [_, _, mut front_left, _] = sim_wheels(&config);
        front_left.motor.enable().unwrap();
        front_left.motor.set_duty(0.5).unwrap();

        let mut total = 0;
        for _ in 0..100 {
            total += front_left.encoder.read_delta().unwrap();
        }
        let expected = 0.5 * config.wheels[WheelIndex::FrontLeft.index()].speed_scale;
        assert!((front_left.probe.shaft_rps() - expected).abs() < 1e-3);
        // Front-left motor and encoder are both reversed, so pulses count up
        assert!(total > 0);
    }

    #[test]
    fn test_tick_limit() {
        let mut limit = TickLimit::new(2);
        assert!(!limit.is_pressed().unwrap());
        assert!(!limit.is_pressed().unwrap());
        assert!(limit.is_pressed().unwrap());
        assert!(limit.is_pressed().unwrap());
    }
}
