// Feetech STS serial protocol, reduced to what a wheel servo needs
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Default serial configuration for Feetech servos
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 20;

/// Present position wraps at this many steps per output revolution
pub const STEPS_PER_REVOLUTION: u16 = 4096;

const HEADER: [u8; 2] = [0xFF, 0xFF];

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
}

/// RAM registers used by the wheel driver
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    OperatingMode = 33,   // 1 byte: 0=position, 1=velocity
    TorqueEnable = 40,    // 1 byte: 0=off, 1=on
    GoalVelocity = 46,    // 2 bytes, sign-magnitude
    Lock = 55,            // 1 byte
    PresentPosition = 56, // 2 bytes, read-only
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
}

/// Error types for Feetech communication
#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Servo {id} returned error status: 0x{status:02X}")]
    ServoError { id: u8, status: u8 },

    #[error("Timeout waiting for response from servo {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

fn checksum(data: &[u8]) -> u8 {
    let sum: u16 = data.iter().map(|&b| b as u16).sum();
    (!sum & 0xFF) as u8
}

fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
    let length = (params.len() + 2) as u8; // params + instruction + checksum
    let mut packet = Vec::with_capacity(6 + params.len());

    packet.extend_from_slice(&HEADER);
    packet.push(id);
    packet.push(length);
    packet.push(instruction as u8);
    packet.extend_from_slice(params);
    packet.push(checksum(&packet[2..]));

    packet
}

/// Serial connection shared by all servos on the bus
pub struct FeetechBus<P = Box<dyn SerialPort>> {
    port: P,
}

impl FeetechBus {
    pub fn open(port_name: &str) -> Result<Self> {
        let port = serialport::new(port_name, DEFAULT_BAUDRATE)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self::with_port(port))
    }
}

impl<P: Read + Write> FeetechBus<P> {
    /// Wrap an already-open byte stream
    pub fn with_port(port: P) -> Self {
        Self { port }
    }

    /// Send one instruction and return the parameters of the status reply
    fn transact(&mut self, id: u8, instruction: Instruction, params: &[u8]) -> Result<Vec<u8>> {
        let packet = build_packet(id, instruction, params);
        self.port.write_all(&packet)?;
        self.port.flush()?;
        self.read_response(id)
    }

    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut head = [0u8; 4];
        self.port.read_exact(&mut head).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                FeetechError::Timeout { id: expected_id }
            } else {
                FeetechError::Io(e)
            }
        })?;

        if head[..2] != HEADER {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", &head[..2]),
            });
        }

        let (id, length) = (head[2], head[3] as usize);
        if id != expected_id {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: got {}", id),
            });
        }
        if length < 2 {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Length {} too short", length),
            });
        }

        // error + params + checksum
        let mut body = vec![0u8; length];
        self.port.read_exact(&mut body)?;

        let (payload, received) = body.split_at(length - 1);
        let mut checksum_data = vec![id, length as u8];
        checksum_data.extend_from_slice(payload);
        if checksum(&checksum_data) != received[0] {
            return Err(FeetechError::ChecksumMismatch { id });
        }

        if payload[0] != 0 {
            return Err(FeetechError::ServoError {
                id,
                status: payload[0],
            });
        }

        Ok(payload[1..].to_vec())
    }

    /// Ping a servo; a timeout means it is absent rather than broken
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        match self.transact(id, Instruction::Ping, &[]) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("Write u8 to servo {}: reg={:?}, value={}", id, register, value);
        self.transact(id, Instruction::Write, &[register as u8, value])?;
        Ok(())
    }

    pub fn write_i16(&mut self, id: u8, register: Register, value: i16) -> Result<()> {
        let [lo, hi] = encode_sign_magnitude(value).to_le_bytes();
        self.transact(id, Instruction::Write, &[register as u8, lo, hi])?;
        Ok(())
    }

    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let response = self.transact(id, Instruction::Read, &[register as u8, 2])?;
        if response.len() < 2 {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Expected 2 bytes, got {}", response.len()),
            });
        }
        Ok(u16::from_le_bytes([response[0], response[1]]))
    }

    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)?;
        self.write_u8(id, Register::Lock, 1)
    }

    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)?;
        self.write_u8(id, Register::Lock, 0)
    }

    /// Torque must be off before the mode can change
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }

    pub fn set_velocity(&mut self, id: u8, velocity: i16) -> Result<()> {
        self.write_i16(id, Register::GoalVelocity, velocity)
    }

    /// Shaft position in [0, 4096)
    pub fn get_position(&mut self, id: u8) -> Result<u16> {
        Ok(self.read_u16(id, Register::PresentPosition)? % STEPS_PER_REVOLUTION)
    }
}

/// Bit 15 = sign (1 = negative), bits 0-14 = magnitude
fn encode_sign_magnitude(value: i16) -> u16 {
    let magnitude = value.unsigned_abs().min(0x7FFF);
    if value < 0 {
        0x8000 | magnitude
    } else {
        magnitude
    }
}
