// Command line options
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Simulated wheels, no hardware needed
    Sim,
    /// Feetech STS servos on a serial bus
    Feetech,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TelemetryKind {
    /// Wheel speeds as log lines
    Log,
    /// JSON frames over zenoh
    Zenoh,
    Off,
}

/// Run the four-wheel velocity controller through its drive sequence
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    #[arg(long, value_enum, default_value_t = Backend::Sim)]
    pub backend: Backend,

    /// Serial port for the servo bus (overrides the config file)
    #[arg(long)]
    pub port: Option<String>,

    /// JSON config; missing fields keep the backend defaults
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = TelemetryKind::Log)]
    pub telemetry: TelemetryKind,

    /// Stop after this many ticks
    #[arg(long)]
    pub max_ticks: Option<u64>,

    /// Do not read the keyboard for the halt key (Ctrl-C still halts)
    #[arg(long)]
    pub no_keyboard: bool,
}
