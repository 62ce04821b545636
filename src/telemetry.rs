// Diagnostic sinks: where telemetry frames and drive status go
//
// Sinks are observers only. The runtime logs their failures and carries on.

use std::fmt::Write as _;
use std::future::Future;

use tracing::info;

use crate::config::{TOPIC_HEALTH, TOPIC_WHEELS};
use crate::messages::{DriveStatus, TelemetryFrame};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to serialize telemetry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Zenoh error: {0}")]
    Zenoh(String),
}

pub trait DiagnosticSink {
    fn publish_frame(
        &mut self,
        frame: &TelemetryFrame,
    ) -> impl Future<Output = Result<(), TelemetryError>>;

    fn publish_status(
        &mut self,
        status: DriveStatus,
    ) -> impl Future<Output = Result<(), TelemetryError>>;
}

/// Log line per frame: `RR = 0.9, RL = 0.9, FL = 0.9, FR = 0.9`
#[derive(Debug, Default)]
pub struct LogSink;

pub fn format_frame(frame: &TelemetryFrame) -> String {
    let mut line = String::new();
    for (i, sample) in frame.wheels.iter().enumerate() {
        if i > 0 {
            line.push_str(", ");
        }
        let _ = write!(line, "{} = {:.3}", sample.wheel, sample.revolutions_per_second);
    }
    line
}

impl DiagnosticSink for LogSink {
    async fn publish_frame(&mut self, frame: &TelemetryFrame) -> Result<(), TelemetryError> {
        info!("{}", format_frame(frame));
        Ok(())
    }

    async fn publish_status(&mut self, status: DriveStatus) -> Result<(), TelemetryError> {
        info!("Drive status: {:?}", status);
        Ok(())
    }
}

/// JSON over zenoh on the wheel and health topics
pub struct ZenohSink {
    _session: zenoh::Session,
    pub_wheels: zenoh::pubsub::Publisher<'static>,
    pub_health: zenoh::pubsub::Publisher<'static>,
}

impl ZenohSink {
    pub async fn open() -> Result<Self, TelemetryError> {
        info!("Opening Zenoh session...");
        let session = zenoh::open(zenoh::Config::default())
            .await
            .map_err(|e| TelemetryError::Zenoh(e.to_string()))?;
        let pub_wheels = session
            .declare_publisher(TOPIC_WHEELS)
            .await
            .map_err(|e| TelemetryError::Zenoh(e.to_string()))?;
        let pub_health = session
            .declare_publisher(TOPIC_HEALTH)
            .await
            .map_err(|e| TelemetryError::Zenoh(e.to_string()))?;
        info!("Publishing to: {}, {}", TOPIC_WHEELS, TOPIC_HEALTH);

        Ok(Self {
            _session: session,
            pub_wheels,
            pub_health,
        })
    }
}

impl DiagnosticSink for ZenohSink {
    async fn publish_frame(&mut self, frame: &TelemetryFrame) -> Result<(), TelemetryError> {
        let json = serde_json::to_string(frame)?;
        self.pub_wheels
            .put(json)
            .await
            .map_err(|e| TelemetryError::Zenoh(e.to_string()))
    }

    async fn publish_status(&mut self, status: DriveStatus) -> Result<(), TelemetryError> {
        let json = serde_json::to_string(&status)?;
        self.pub_health
            .put(json)
            .await
            .map_err(|e| TelemetryError::Zenoh(e.to_string()))
    }
}

/// Sink selected at startup
pub enum Telemetry {
    Log(LogSink),
    Zenoh(ZenohSink),
    Off,
}

impl DiagnosticSink for Telemetry {
    async fn publish_frame(&mut self, frame: &TelemetryFrame) -> Result<(), TelemetryError> {
        match self {
            Telemetry::Log(sink) => sink.publish_frame(frame).await,
            Telemetry::Zenoh(sink) => sink.publish_frame(frame).await,
            Telemetry::Off => Ok(()),
        }
    }

    async fn publish_status(&mut self, status: DriveStatus) -> Result<(), TelemetryError> {
        match self {
            Telemetry::Log(sink) => sink.publish_status(status).await,
            Telemetry::Zenoh(sink) => sink.publish_status(status).await,
            Telemetry::Off => Ok(()),
        }
    }
}
