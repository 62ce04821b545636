// Wheel devices backed by Feetech servos running in velocity mode
//
// The servo's present-position register is the wheel encoder and its goal
// velocity register is the motor output. All four servos share one bus.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;

use tracing::{debug, info, warn};

use super::feetech::{FeetechBus, OperatingMode, STEPS_PER_REVOLUTION};
use super::{DeviceError, EncoderDevice, MotorDevice};
use crate::config::ServoBusConfig;
use crate::drive::WheelIndex;

type SharedBus<P> = Rc<RefCell<FeetechBus<P>>>;

/// Open the bus, check every servo answers, and switch them to velocity mode
///
/// Torque stays off until the motors are enabled.
pub fn open_servo_wheels(
    config: &ServoBusConfig,
) -> Result<[(ServoEncoder, ServoMotor); 4], DeviceError> {
    info!("Opening servo bus on {}", config.port);
    let bus = Rc::new(RefCell::new(FeetechBus::open(&config.port)?));

    {
        let mut bus = bus.borrow_mut();
        for wheel in WheelIndex::ALL {
            let id = config.ids[wheel.index()];
            if !bus.ping(id)? {
                warn!("Servo {} ({}) not responding to ping", id, wheel);
                return Err(DeviceError::Unreachable {
                    name: format!("servo {} ({})", id, wheel),
                });
            }
            debug!("Servo {} ({}) responding", id, wheel);
            bus.disable_torque(id)?;
            bus.set_operating_mode(id, OperatingMode::Velocity)?;
        }
    }

    Ok(WheelIndex::ALL.map(|wheel| {
        let id = config.ids[wheel.index()];
        (
            ServoEncoder {
                bus: Rc::clone(&bus),
                id,
                last_position: None,
            },
            ServoMotor {
                bus: Rc::clone(&bus),
                id,
                max_raw: config.max_raw_velocity,
            },
        )
    }))
}

/// Present-position reader that unwraps the 4096-step rollover
pub struct ServoEncoder<P = Box<dyn serialport::SerialPort>> {
    bus: SharedBus<P>,
    id: u8,
    last_position: Option<u16>,
}

impl<P: Read + Write> EncoderDevice for ServoEncoder<P> {
    fn read_delta(&mut self) -> Result<i32, DeviceError> {
        let position = self.bus.borrow_mut().get_position(self.id)?;
        let delta = match self.last_position.replace(position) {
            Some(previous) => unwrap_delta(previous, position),
            None => 0,
        };
        Ok(delta)
    }
}

/// Shortest signed step distance between two wrapped positions
fn unwrap_delta(previous: u16, current: u16) -> i32 {
    let span = STEPS_PER_REVOLUTION as i32;
    let raw = current as i32 - previous as i32;
    (raw + span / 2).rem_euclid(span) - span / 2
}

/// Goal-velocity writer scaling normalized duty onto the servo's range
pub struct ServoMotor<P = Box<dyn serialport::SerialPort>> {
    bus: SharedBus<P>,
    id: u8,
    max_raw: i16,
}

impl<P: Read + Write> MotorDevice for ServoMotor<P> {
    fn set_duty(&mut self, duty: f32) -> Result<(), DeviceError> {
        let raw = duty_to_raw(duty, self.max_raw);
        self.bus.borrow_mut().set_velocity(self.id, raw)?;
        Ok(())
    }

    fn enable(&mut self) -> Result<(), DeviceError> {
        self.bus.borrow_mut().enable_torque(self.id)?;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), DeviceError> {
        let mut bus = self.bus.borrow_mut();
        // Torque goes off even when the servo refuses the stop
        let stopped = bus.set_velocity(self.id, 0);
        let released = bus.disable_torque(self.id);
        stopped.and(released)?;
        Ok(())
    }
}

fn duty_to_raw(duty: f32, max_raw: i16) -> i16 {
    (duty.clamp(-1.0, 1.0) * max_raw as f32).round() as i16
}
