// Wheel naming and mounting polarity for the four-wheel base

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the four driven wheels.
///
/// The discriminant is the wheel's slot in every per-wheel array, in the order
/// the motor outputs are wired: A=RR, B=RL, C=FL, D=FR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WheelIndex {
    RearRight = 0,
    RearLeft = 1,
    FrontLeft = 2,
    FrontRight = 3,
}

impl WheelIndex {
    /// All wheels, in slot order
    pub const ALL: [WheelIndex; 4] = [
        WheelIndex::RearRight,
        WheelIndex::RearLeft,
        WheelIndex::FrontLeft,
        WheelIndex::FrontRight,
    ];

    /// Array slot for this wheel
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short name used in logs and telemetry
    pub fn short_name(self) -> &'static str {
        match self {
            WheelIndex::RearRight => "RR",
            WheelIndex::RearLeft => "RL",
            WheelIndex::FrontLeft => "FL",
            WheelIndex::FrontRight => "FR",
        }
    }
}

impl fmt::Display for WheelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Mounting polarity of a motor or encoder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Normal,
    Reversed,
}

impl Direction {
    /// +1.0 for normal, -1.0 for reversed
    pub fn sign(self) -> f32 {
        match self {
            Direction::Normal => 1.0,
            Direction::Reversed => -1.0,
        }
    }

    /// Combine two polarities (reversed twice is normal)
    pub fn compose(self, other: Direction) -> Direction {
        if self == other {
            Direction::Normal
        } else {
            Direction::Reversed
        }
    }
}
