// Message types published by the runtime

use serde::{Deserialize, Serialize};

use crate::drive::{SequenceStep, TickReport, WheelIndex};

/// One wheel's state in a telemetry frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WheelSample {
    pub wheel: WheelIndex,
    pub setpoint: f32,
    pub revolutions_per_second: f32,
    /// Normalized duty in [-1.0, 1.0]
    pub command: f32,
}

/// Per-tick diagnostics, emitted at a reduced rate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryFrame {
    pub tick: u64,
    pub step: SequenceStep,
    /// In wheel slot order (RR, RL, FL, FR)
    pub wheels: Vec<WheelSample>,
}

impl From<&TickReport> for TelemetryFrame {
    fn from(report: &TickReport) -> Self {
        let wheels = WheelIndex::ALL
            .iter()
            .map(|&wheel| WheelSample {
                wheel,
                setpoint: report.setpoints.get(wheel),
                revolutions_per_second: report.captures[wheel.index()].revolutions_per_second,
                command: report.commands[wheel.index()],
            })
            .collect();
        Self {
            tick: report.tick,
            step: report.step,
            wheels,
        }
    }
}

/// Drive status published on start and stop
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DriveStatus {
    Running,
    Halted,
    Faulted,
}
