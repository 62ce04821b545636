// Timed choreography: forward, reverse, turn, strafe and stop, on repeat
use std::fmt;

use serde::{Deserialize, Serialize};

use super::wheel::WheelIndex;

/// One move of the drive sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStep {
    Forward,
    Reverse,
    TurnRight,
    TurnLeft,
    StrafeRight,
    StrafeLeft,
    Stop,
}

impl SequenceStep {
    /// Steps in playback order
    pub const ALL: [SequenceStep; 7] = [
        SequenceStep::Forward,
        SequenceStep::Reverse,
        SequenceStep::TurnRight,
        SequenceStep::TurnLeft,
        SequenceStep::StrafeRight,
        SequenceStep::StrafeLeft,
        SequenceStep::Stop,
    ];

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }

    /// Per-wheel setpoints for this move at the given magnitude
    pub fn setpoints(self, s: f32) -> WheelSetpoints {
        match self {
            SequenceStep::Forward => WheelSetpoints::drive(s),
            SequenceStep::Reverse => WheelSetpoints::drive(-s),
            SequenceStep::TurnRight => WheelSetpoints::turn(s),
            // Turns at zero speed: the base pauses here rather than turning left
            SequenceStep::TurnLeft => WheelSetpoints::turn(-0.0),
            SequenceStep::StrafeRight => WheelSetpoints::strafe(s),
            SequenceStep::StrafeLeft => WheelSetpoints::strafe(-s),
            SequenceStep::Stop => WheelSetpoints::default(),
        }
    }
}

impl fmt::Display for SequenceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Target wheel speeds (rev/s) for one move
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WheelSetpoints {
    pub front_left: f32,
    pub front_right: f32,
    pub rear_left: f32,
    pub rear_right: f32,
}

impl WheelSetpoints {
    fn drive(speed: f32) -> Self {
        Self {
            front_left: speed,
            front_right: speed,
            rear_left: speed,
            rear_right: speed,
        }
    }

    fn turn(speed: f32) -> Self {
        Self {
            front_left: speed,
            front_right: -speed,
            rear_left: speed,
            rear_right: -speed,
        }
    }

    fn strafe(speed: f32) -> Self {
        Self {
            front_left: speed,
            front_right: -speed,
            rear_left: -speed,
            rear_right: speed,
        }
    }

    pub fn get(&self, wheel: WheelIndex) -> f32 {
        match wheel {
            WheelIndex::FrontLeft => self.front_left,
            WheelIndex::FrontRight => self.front_right,
            WheelIndex::RearLeft => self.rear_left,
            WheelIndex::RearRight => self.rear_right,
        }
    }
}

/// Steps through [`SequenceStep::ALL`], holding each for a fixed number of ticks
#[derive(Debug, Clone)]
pub struct MotionSequencer {
    step_index: usize,
    progress: u32,
    dwell_ticks: u32,
    magnitude: f32,
}

impl MotionSequencer {
    /// Starts on [`SequenceStep::Forward`] with no progress
    pub fn new(dwell_ticks: u32, magnitude: f32) -> Self {
        Self {
            step_index: 0,
            progress: 0,
            dwell_ticks: dwell_ticks.max(1),
            magnitude,
        }
    }

    /// Count one tick; returns the new step when the dwell has run out
    pub fn advance(&mut self) -> Option<SequenceStep> {
        self.progress += 1;
        if self.progress < self.dwell_ticks {
            return None;
        }
        self.progress = 0;
        self.step_index = (self.step_index + 1) % SequenceStep::ALL.len();
        Some(self.step())
    }

    pub fn step(&self) -> SequenceStep {
        SequenceStep::from_index(self.step_index)
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn progress(&self) -> u32 {
        self.progress
    }

    pub fn dwell_ticks(&self) -> u32 {
        self.dwell_ticks
    }

    /// Ticks for one full pass through every step
    pub fn cycle_ticks(&self) -> u64 {
        self.dwell_ticks as u64 * SequenceStep::ALL.len() as u64
    }

    /// Setpoints of the active step
    pub fn setpoints(&self) -> WheelSetpoints {
        self.step().setpoints(self.magnitude)
    }
}
