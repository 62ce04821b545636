// Fixed-rate control loop with halt button
//
// Each tick: poll halt, run one drive cycle, maybe report, sleep out the rest
// of the period. Overruns are not compensated; the loop just runs late.

use std::time::Duration;

use tracing::{info, trace, warn};

use crate::cli::{Args, Backend, TelemetryKind};
use crate::clock::{Clock, TokioClock};
use crate::config::DriveConfig;
use crate::devices::keyboard::KeyboardHalt;
use crate::devices::servo::open_servo_wheels;
use crate::devices::signal::SignalHalt;
use crate::devices::sim::{SimWheel, TickLimit, sim_wheels};
use crate::devices::{EncoderDevice, HaltInput, HaltSignal, MotorDevice};
use crate::drive::{DriveError, DriveSystem};
use crate::messages::{DriveStatus, TelemetryFrame};
use crate::telemetry::{DiagnosticSink, LogSink, Telemetry, ZenohSink};

/// Outcome of a run that ended on the halt signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    /// Ticks whose work took longer than the period
    pub overruns: u64,
}

/// Drives the system until halted or a device fails
pub struct ControlCycle<C, H, S> {
    clock: C,
    halt: H,
    sink: S,
    period: Duration,
    report_divider: u64,
}

impl<C: Clock, H: HaltSignal, S: DiagnosticSink> ControlCycle<C, H, S> {
    pub fn new(config: &DriveConfig, clock: C, halt: H, sink: S) -> Self {
        Self {
            clock,
            halt,
            sink,
            period: config.tick_period(),
            report_divider: config.report_divider.max(1) as u64,
        }
    }

    /// Run until the halt input reads pressed
    ///
    /// Motors are disabled on every exit path. A device fault is returned
    /// after the motors have been disabled.
    pub async fn run<E: EncoderDevice, M: MotorDevice>(
        &mut self,
        system: &mut DriveSystem<E, M>,
    ) -> Result<RunSummary, DriveError> {
        info!(
            "Control loop started: {:?} period, report every {} ticks",
            self.period, self.report_divider
        );
        self.publish_status(DriveStatus::Running).await;

        let result = self.run_ticks(system).await;

        let disabled = system.disable_all();
        let status = if result.is_ok() && disabled.is_ok() {
            DriveStatus::Halted
        } else {
            DriveStatus::Faulted
        };
        self.publish_status(status).await;

        let summary = result?;
        disabled?;
        info!(
            "Control loop stopped after {} ticks ({} overruns)",
            summary.ticks, summary.overruns
        );
        Ok(summary)
    }

    async fn run_ticks<E: EncoderDevice, M: MotorDevice>(
        &mut self,
        system: &mut DriveSystem<E, M>,
    ) -> Result<RunSummary, DriveError> {
        let mut overruns = 0;
        let mut report_count = 0;

        loop {
            if self.halt.is_pressed().map_err(DriveError::HaltRead)? {
                info!("Halt requested");
                break;
            }

            let started = self.clock.now();
            let report = system.tick(started)?;

            if report_count == 0 {
                let frame = TelemetryFrame::from(&report);
                if let Err(e) = self.sink.publish_frame(&frame).await {
                    warn!("Failed to publish telemetry: {}", e);
                }
            }
            report_count = (report_count + 1) % self.report_divider;

            let work = self.clock.now().saturating_sub(started);
            match self.period.checked_sub(work) {
                Some(remaining) => self.clock.sleep(remaining).await,
                None => {
                    overruns += 1;
                    trace!("Tick {} overran by {:?}", report.tick, work - self.period);
                }
            }
        }

        Ok(RunSummary {
            ticks: system.ticks(),
            overruns,
        })
    }

    async fn publish_status(&mut self, status: DriveStatus) {
        if let Err(e) = self.sink.publish_status(status).await {
            warn!("Failed to publish status {:?}: {}", status, e);
        }
    }
}

/// Build the selected backend, enable the motors and run until halted
pub async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let base = match args.backend {
        Backend::Sim => DriveConfig::default(),
        Backend::Feetech => DriveConfig::servo_defaults(),
    };
    let mut config = match &args.config {
        Some(path) => DriveConfig::load(path, &base)?,
        None => base,
    };
    if let Some(port) = &args.port {
        config.servo_bus.port = port.clone();
    }
    config.validate()?;

    let sink = match args.telemetry {
        TelemetryKind::Log => Telemetry::Log(LogSink),
        TelemetryKind::Zenoh => Telemetry::Zenoh(ZenohSink::open().await?),
        TelemetryKind::Off => Telemetry::Off,
    };

    // Ctrl-C always halts cleanly, with or without the keyboard
    let mut halt = HaltInput::default().with_signal(SignalHalt::listen());
    if let Some(ticks) = args.max_ticks {
        halt = halt.with_tick_limit(TickLimit::new(ticks));
    }
    if !args.no_keyboard {
        info!("Press Q or Esc to stop");
        halt = halt.with_keyboard(KeyboardHalt::new()?);
    }

    info!(
        "Runtime starting: {:?} backend, {}Hz, {:.1}s per move",
        args.backend, config.tick_rate_hz, config.dwell_secs
    );

    let mut cycle = ControlCycle::new(&config, TokioClock::new(), halt, sink);
    match args.backend {
        Backend::Sim => {
            let devices =
                sim_wheels(&config).map(|SimWheel { encoder, motor, .. }| (encoder, motor));
            let mut system = DriveSystem::new(&config, devices);
            start(&mut system)?;
            cycle.run(&mut system).await?;
        }
        Backend::Feetech => {
            let devices = open_servo_wheels(&config.servo_bus)?;
            let mut system = DriveSystem::new(&config, devices);
            start(&mut system)?;
            cycle.run(&mut system).await?;
        }
    }
    Ok(())
}

/// Enable every motor; if any refuses, leave them all disabled
fn start<E: EncoderDevice, M: MotorDevice>(
    system: &mut DriveSystem<E, M>,
) -> Result<(), DriveError> {
    if let Err(e) = system.enable_all() {
        if let Err(disable_error) = system.disable_all() {
            warn!("Failed to disable motors after enable error: {}", disable_error);
        }
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimClock;
    use crate::devices::sim::{SimEncoder, SimMotor, SimProbe};
    use crate::devices::DeviceError;
    use crate::drive::{SequenceStep, WheelIndex};
    use crate::telemetry::TelemetryError;

    /// Records everything published
    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<TelemetryFrame>,
        statuses: Vec<DriveStatus>,
    }

    impl DiagnosticSink for RecordingSink {
        async fn publish_frame(&mut self, frame: &TelemetryFrame) -> Result<(), TelemetryError> {
            self.frames.push(frame.clone());
            Ok(())
        }

        async fn publish_status(&mut self, status: DriveStatus) -> Result<(), TelemetryError> {
            self.statuses.push(status);
            Ok(())
        }
    }

    fn sim_system(config: &DriveConfig) -> (DriveSystem<SimEncoder, SimMotor>, Vec<SimProbe>) {
        let wheels = sim_wheels(config);
        let probes = wheels.iter().map(|w| w.probe.clone()).collect();
        let devices = wheels.map(|SimWheel { encoder, motor, .. }| (encoder, motor));
        (DriveSystem::new(config, devices), probes)
    }

    fn setpoints(system: &DriveSystem<SimEncoder, SimMotor>) -> [f32; 4] {
        WheelIndex::ALL.map(|wheel| system.wheel(wheel).pid().setpoint())
    }

    #[tokio::test]
    async fn test_reference_scenario_flips_on_tick_200() {
        let config = DriveConfig::default();
        let (mut system, probes) = sim_system(&config);
        start(&mut system).unwrap();

        let clock = SimClock::new();
        let mut cycle = ControlCycle::new(
            &config,
            clock.clone(),
            TickLimit::new(199),
            RecordingSink::default(),
        );
        let summary = cycle.run(&mut system).await.unwrap();
        assert_eq!(summary.ticks, 199);
        assert_eq!(system.sequencer().step(), SequenceStep::Forward);
        assert_eq!(setpoints(&system), [0.9; 4]);
        assert!(probes.iter().all(|p| !p.is_enabled()));

        // One more tick crosses the boundary
        start(&mut system).unwrap();
        let mut cycle = ControlCycle::new(
            &config,
            clock.clone(),
            TickLimit::new(1),
            RecordingSink::default(),
        );
        let summary = cycle.run(&mut system).await.unwrap();
        assert_eq!(summary.ticks, 200);
        assert_eq!(system.sequencer().step(), SequenceStep::Reverse);
        assert_eq!(setpoints(&system), [-0.9; 4]);
        assert_eq!(clock.now(), config.tick_period() * 200);
    }

    #[tokio::test]
    async fn test_full_cycle_returns_to_forward() {
        let config = DriveConfig::default();
        let (mut system, _probes) = sim_system(&config);
        start(&mut system).unwrap();

        let cycle_ticks = system.sequencer().cycle_ticks();
        let mut cycle = ControlCycle::new(
            &config,
            SimClock::new(),
            TickLimit::new(cycle_ticks),
            RecordingSink::default(),
        );
        cycle.run(&mut system).await.unwrap();
        assert_eq!(system.sequencer().step_index(), 0);
        assert_eq!(system.sequencer().progress(), 0);
        assert_eq!(setpoints(&system), [0.9; 4]);
    }

    #[tokio::test]
    async fn test_reports_every_divider_ticks_from_first() {
        let config = DriveConfig::default();
        let (mut system, _probes) = sim_system(&config);
        start(&mut system).unwrap();

        let mut cycle = ControlCycle::new(
            &config,
            SimClock::new(),
            TickLimit::new(10),
            RecordingSink::default(),
        );
        cycle.run(&mut system).await.unwrap();

        let ticks: Vec<u64> = cycle.sink.frames.iter().map(|f| f.tick).collect();
        assert_eq!(ticks, vec![0, 4, 8]);
        assert_eq!(cycle.sink.statuses, vec![DriveStatus::Running, DriveStatus::Halted]);
    }

    #[tokio::test]
    async fn test_halt_before_first_tick_disables_without_updates() {
        let config = DriveConfig::default();
        let (mut system, probes) = sim_system(&config);
        start(&mut system).unwrap();

        let mut cycle = ControlCycle::new(
            &config,
            SimClock::new(),
            TickLimit::new(0),
            RecordingSink::default(),
        );
        let summary = cycle.run(&mut system).await.unwrap();
        assert_eq!(summary.ticks, 0);
        assert!(cycle.sink.frames.is_empty());
        assert!(probes.iter().all(|p| !p.is_enabled() && p.duty() == 0.0));
    }

    /// Encoder that advances the shared clock, to model slow ticks
    struct SlowEncoder {
        inner: SimEncoder,
        clock: SimClock,
        cost: Duration,
    }

    impl EncoderDevice for SlowEncoder {
        fn read_delta(&mut self) -> Result<i32, DeviceError> {
            self.clock.advance(self.cost);
            self.inner.read_delta()
        }
    }

    #[tokio::test]
    async fn test_overrun_is_tolerated_without_compensation() {
        let config = DriveConfig::default();
        let clock = SimClock::new();
        // 4 wheels x 3ms = 12ms of work in a 10ms tick
        let devices = sim_wheels(&config).map(|SimWheel { encoder, motor, .. }| {
            let slow = SlowEncoder {
                inner: encoder,
                clock: clock.clone(),
                cost: Duration::from_millis(3),
            };
            (slow, motor)
        });
        let mut system = DriveSystem::new(&config, devices);
        start(&mut system).unwrap();

        let mut cycle = ControlCycle::new(
            &config,
            clock.clone(),
            TickLimit::new(5),
            RecordingSink::default(),
        );
        let summary = cycle.run(&mut system).await.unwrap();
        assert_eq!(summary, RunSummary { ticks: 5, overruns: 5 });
        assert_eq!(clock.slept(), Duration::ZERO);
        assert_eq!(clock.now(), Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_partial_work_sleeps_the_remainder() {
        let config = DriveConfig::default();
        let clock = SimClock::new();
        let devices = sim_wheels(&config).map(|SimWheel { encoder, motor, .. }| {
            let slow = SlowEncoder {
                inner: encoder,
                clock: clock.clone(),
                cost: Duration::from_millis(1),
            };
            (slow, motor)
        });
        let mut system = DriveSystem::new(&config, devices);
        start(&mut system).unwrap();

        let mut cycle = ControlCycle::new(
            &config,
            clock.clone(),
            TickLimit::new(3),
            RecordingSink::default(),
        );
        let summary = cycle.run(&mut system).await.unwrap();
        assert_eq!(summary.overruns, 0);
        assert_eq!(clock.slept(), Duration::from_millis(18));
        assert_eq!(clock.now(), Duration::from_millis(30));
    }

    /// Encoder that fails after a number of reads
    struct FailingEncoder {
        inner: SimEncoder,
        reads_left: u32,
    }

    impl EncoderDevice for FailingEncoder {
        fn read_delta(&mut self) -> Result<i32, DeviceError> {
            if self.reads_left == 0 {
                return Err(DeviceError::Unreachable {
                    name: "encoder".into(),
                });
            }
            self.reads_left -= 1;
            self.inner.read_delta()
        }
    }

    #[tokio::test]
    async fn test_encoder_fault_disables_motors_and_propagates() {
        let config = DriveConfig::default();
        let wheels = sim_wheels(&config);
        let probes: Vec<SimProbe> = wheels.iter().map(|w| w.probe.clone()).collect();
        let devices = wheels.map(|SimWheel { encoder, motor, .. }| {
            (
                FailingEncoder {
                    inner: encoder,
                    reads_left: 3,
                },
                motor,
            )
        });
        let mut system = DriveSystem::new(&config, devices);
        start(&mut system).unwrap();

        let mut cycle = ControlCycle::new(
            &config,
            SimClock::new(),
            TickLimit::new(100),
            RecordingSink::default(),
        );
        let err = cycle.run(&mut system).await.unwrap_err();
        assert!(matches!(
            err,
            DriveError::EncoderRead {
                wheel: WheelIndex::RearRight,
                ..
            }
        ));
        assert_eq!(system.ticks(), 3);
        assert!(probes.iter().all(|p| !p.is_enabled()));
        assert_eq!(cycle.sink.statuses.last(), Some(&DriveStatus::Faulted));
    }

    struct BrokenButton;

    impl HaltSignal for BrokenButton {
        fn is_pressed(&mut self) -> Result<bool, DeviceError> {
            Err(DeviceError::Unreachable {
                name: "button".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_halt_read_fault_is_fatal() {
        let config = DriveConfig::default();
        let (mut system, probes) = sim_system(&config);
        start(&mut system).unwrap();

        let mut cycle = ControlCycle::new(
            &config,
            SimClock::new(),
            BrokenButton,
            RecordingSink::default(),
        );
        let err = cycle.run(&mut system).await.unwrap_err();
        assert!(matches!(err, DriveError::HaltRead(_)));
        assert_eq!(system.ticks(), 0);
        assert!(probes.iter().all(|p| !p.is_enabled()));
    }
}
