pub mod cli;
pub mod clock;
pub mod config;
pub mod devices;
pub mod drive;
pub mod messages;
pub mod runtime;
pub mod telemetry;
