//! Software-in-the-loop harness: the flight core flies a simulated vehicle
//! through simulated sensors, scheduled deterministically in simulated time.
use std::fmt;
use std::io::{self, Write};
use std::task::Poll;

use embassy_futures::{block_on, poll_once};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_time::{Duration, Instant};
use flight_core::channels::{AccelQueue, BaroQueue, PushOutcome, TelemetryQueue};
use flight_core::config::{ACCEL_PERIOD, BARO_PERIOD, PIPELINE_PERIOD};
use flight_core::datacells::DataCell;
use flight_core::pipeline::publish_report;
use flight_core::readers::{ReadOutcome, sample_acceleration, sample_pressure};
use flight_core::telemetry::{LogBuffer, MAX_LOG_LINE_LEN, TelemetryEntry, publish};
use flight_core::{
    ActuatorError, Clock, DeployReason, EjectionChannel, FlightComputer,
    FlightConfig, FlightPhase, FlightSnapshot, PhaseTransition, ReaderStats, SensorHealth, debug,
    info, warn,
};

pub mod physics;
pub mod scheduler;
pub mod sim;

use physics::{Vehicle, VehicleParams};
use scheduler::{Scheduler, TaskId, TaskStats};
use sim::{Dropout, SimAccelerometer, SimBarometer, SimClock, SimDelay, SimPin, World};

pub const TELEMETRY_PERIOD: Duration = Duration::from_millis(20);
/// Telemetry sink runs between health rows.
const HEALTH_EVERY: u32 = 50;
const SCHEMA_LEN: usize = 1024;

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub vehicle: VehicleParams,
    pub config: FlightConfig,
    pub baro_dropouts: Vec<Dropout>,
    pub duration: Duration,
}

impl Scenario {
    pub const NAMES: [&'static str; 3] = ["nominal", "baro-dropout", "short-tta"];

    /// Clean flight: apogee detection deploys, landing releases the line.
    pub fn nominal() -> Self {
        Self {
            name: "nominal",
            vehicle: VehicleParams::SPORT,
            config: FlightConfig::DEFAULT,
            baro_dropouts: Vec::new(),
            duration: Duration::from_secs(300),
        }
    }

    /// The barometer dies during the coast and only comes back long after
    /// apogee. The phase machine faults and the backup timer deploys.
    pub fn baro_dropout() -> Self {
        Self {
            name: "baro-dropout",
            baro_dropouts: vec![Dropout {
                from: Instant::from_secs(12),
                until: Instant::from_secs(62),
            }],
            ..Self::nominal()
        }
    }

    /// Time to apogee configured well short of the real coast: the backup
    /// forces parachute descent while the vehicle is still climbing.
    pub fn short_time_to_apogee() -> Self {
        Self {
            name: "short-tta",
            config: FlightConfig {
                time_to_apogee: Duration::from_secs(10),
                ..FlightConfig::DEFAULT
            },
            ..Self::nominal()
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "nominal" => Some(Self::nominal()),
            "baro-dropout" => Some(Self::baro_dropout()),
            "short-tta" => Some(Self::short_time_to_apogee()),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum SitlError {
    Actuator(ActuatorError),
    Io(io::Error),
}

impl fmt::Display for SitlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SitlError::Actuator(e) => write!(f, "ejection channel failed: {:?}", e),
            SitlError::Io(e) => write!(f, "telemetry log: {}", e),
        }
    }
}

impl std::error::Error for SitlError {}

impl From<ActuatorError> for SitlError {
    fn from(e: ActuatorError) -> Self {
        SitlError::Actuator(e)
    }
}

impl From<io::Error> for SitlError {
    fn from(e: io::Error) -> Self {
        SitlError::Io(e)
    }
}

/// What happened, from the flight computer's side and from the physics.
#[derive(Debug, Clone)]
pub struct FlightSummary {
    pub scenario: &'static str,
    pub transitions: Vec<PhaseTransition>,
    pub final_phase: FlightPhase,
    pub deploy_reason: DeployReason,
    pub backup_expired: bool,
    /// First time the ejection line went high, and when it went low again.
    pub deployed_at: Option<Instant>,
    pub released_at: Option<Instant>,
    pub pin_edges: u32,
    pub true_apogee_agl: f64,
    pub true_apogee_at: Instant,
    pub landed_at: Option<Instant>,
    pub max_estimated_agl: f32,
    pub telemetry_rows: u32,
    pub telemetry_dropped: u32,
    pub accel: ReaderStats,
    pub baro: ReaderStats,
    /// Accelerometer samples lost because their queue was full.
    pub accel_lost: u32,
    pub flight_computer: Option<TaskStats>,
}

impl FlightSummary {
    /// When the flight computer entered `phase`, if it did.
    pub fn entered(&self, phase: FlightPhase) -> Option<Instant> {
        self.transitions.iter().find(|t| t.to == phase).map(|t| t.at)
    }

    pub fn phases(&self) -> Vec<FlightPhase> {
        self.transitions.iter().map(|t| t.to).collect()
    }
}

fn seconds(t: Instant) -> f64 {
    t.as_micros() as f64 / 1e6
}

impl fmt::Display for FlightSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scenario {}", self.scenario)?;
        for t in &self.transitions {
            writeln!(
                f,
                "  {:>8.3}s  {} -> {}{}",
                seconds(t.at),
                t.from.label(),
                t.to.label(),
                if t.forced { " (forced)" } else { "" }
            )?;
        }
        writeln!(f, "  final phase      {}", self.final_phase.label())?;
        match self.deployed_at {
            Some(at) => writeln!(f, "  deployed         {:.3}s ({:?})", seconds(at), self.deploy_reason)?,
            None => writeln!(f, "  deployed         never")?,
        }
        if let Some(at) = self.released_at {
            writeln!(f, "  released         {:.3}s", seconds(at))?;
        }
        writeln!(
            f,
            "  true apogee      {:.1} m at {:.3}s (estimated max {:.1} m)",
            self.true_apogee_agl,
            seconds(self.true_apogee_at),
            self.max_estimated_agl
        )?;
        if let Some(at) = self.landed_at {
            writeln!(f, "  landed           {:.3}s", seconds(at))?;
        }
        writeln!(
            f,
            "  accel {} ok / {} failed, baro {} ok / {} failed / {} dropped, telemetry {} rows / {} dropped",
            self.accel.samples,
            self.accel.skipped,
            self.baro.samples,
            self.baro.skipped,
            self.baro.dropped,
            self.telemetry_rows,
            self.telemetry_dropped
        )
    }
}

/// Lowest-priority consumer of the telemetry queue. Best effort: the first
/// write error stops output and is reported after the run.
struct TelemetrySink<W> {
    out: Option<W>,
    line: LogBuffer<MAX_LOG_LINE_LEN>,
    error: Option<io::Error>,
    rows: u32,
    max_agl: f32,
}

impl<W: Write> TelemetrySink<W> {
    fn new(mut out: Option<W>) -> Self {
        let mut error = None;
        if let Some(w) = out.as_mut() {
            let mut schema = LogBuffer::<SCHEMA_LEN>::new();
            if TelemetryEntry::write_schema(&mut schema).is_ok() {
                error = w.write_all(schema.get_active_buffer()).err();
            }
        }
        Self {
            out,
            line: LogBuffer::new(),
            error,
            rows: 0,
            max_agl: f32::MIN,
        }
    }

    fn consume(&mut self, entry: &TelemetryEntry) {
        if let TelemetryEntry::Cycle(record) = entry {
            self.rows += 1;
            if record.agl > self.max_agl {
                self.max_agl = record.agl;
            }
        }
        if self.out.is_none() || self.error.is_some() {
            return;
        }

        self.line.reset();
        if self.line.write_entry(entry).is_err() {
            warn!("Telemetry row did not fit in {} bytes", MAX_LOG_LINE_LEN);
            return;
        }
        if let Some(out) = self.out.as_mut() {
            if let Err(e) = out.write_all(self.line.get_active_buffer()) {
                self.error = Some(e);
            }
        }
    }

    fn finish(mut self) -> Result<(u32, f32), io::Error> {
        if let Some(out) = self.out.as_mut() {
            if self.error.is_none() {
                self.error = out.flush().err();
            }
        }
        match self.error {
            Some(e) => Err(e),
            None => Ok((self.rows, self.max_agl)),
        }
    }
}

/// Flies `scenario` without writing telemetry anywhere.
pub fn run_scenario(scenario: &Scenario) -> Result<FlightSummary, SitlError> {
    simulate::<io::Sink>(scenario, None)
}

/// Flies `scenario` and writes the telemetry CSV to `out`.
pub fn run_scenario_with_log<W: Write>(scenario: &Scenario, out: W) -> Result<FlightSummary, SitlError> {
    simulate(scenario, Some(out))
}

fn simulate<W: Write>(scenario: &Scenario, out: Option<W>) -> Result<FlightSummary, SitlError> {
    info!("Scenario {}: {}s simulated", scenario.name, scenario.duration.as_secs());

    let clock = SimClock::new();
    let world = World::shared(Vehicle::new(scenario.vehicle));
    let mut imu = SimAccelerometer::new(world.clone(), clock.clone());
    let mut baro = SimBarometer::new(world.clone(), clock.clone(), scenario.baro_dropouts.clone());
    let mut delay = SimDelay(clock.clone());
    let mut ejection = EjectionChannel::new(SimPin::new(world.clone(), clock.clone()))?;

    let accel_q = AccelQueue::<NoopRawMutex>::new();
    let baro_q = BaroQueue::<NoopRawMutex>::new();
    let telemetry_q = TelemetryQueue::<NoopRawMutex>::new();
    let (accel_tx, accel_rx) = (accel_q.sender(), accel_q.receiver());
    let (baro_tx, baro_rx) = (baro_q.sender(), baro_q.receiver());
    let telemetry_tx = telemetry_q.sender();
    let snapshot = DataCell::new(FlightSnapshot::new());

    let mut fc = FlightComputer::new(scenario.config);
    let mut sink = TelemetrySink::new(out);
    let mut accel_stats = ReaderStats::new();
    let mut baro_stats = ReaderStats::new();
    let mut accel_lost = 0u32;
    let mut telemetry_dropped = 0u32;
    let mut sink_runs = 0u32;
    let mut transitions = Vec::new();
    let mut deployed_at = None;
    let mut released_at = None;

    let start = clock.now();
    let end = start + scenario.duration;
    let mut sched = Scheduler::new();
    sched.add(TaskId::AccelReader, ACCEL_PERIOD, start);
    sched.add(TaskId::BaroReader, BARO_PERIOD, start);
    sched.add(TaskId::FlightComputer, PIPELINE_PERIOD, start);
    sched.add(TaskId::TelemetrySink, TELEMETRY_PERIOD, start);

    loop {
        let now = clock.now();
        if now >= end {
            break;
        }
        let Some(task) = sched.next_ready(now) else {
            match sched.idle_until() {
                Some(next) => {
                    clock.advance_to(next);
                    continue;
                }
                None => break,
            }
        };

        match task {
            TaskId::AccelReader => {
                match poll_once(sample_acceleration(&mut imu, &clock, &accel_tx, &mut accel_stats)) {
                    Poll::Ready(Ok(_)) => {}
                    Poll::Ready(Err(e)) => debug!("Accel read failed: {}", e),
                    Poll::Pending => {
                        // Lockstep cannot park the reader, so the sample it
                        // would have blocked on is lost instead.
                        accel_lost += 1;
                        warn!("Accel queue full, sample lost");
                    }
                }
            }
            TaskId::BaroReader => {
                let outcome = block_on(sample_pressure(
                    &mut baro,
                    &mut delay,
                    &clock,
                    &baro_tx,
                    &mut baro_stats,
                ));
                match outcome {
                    ReadOutcome::Enqueued(_) => {}
                    ReadOutcome::Dropped => warn!("Baro queue full, sample dropped"),
                    ReadOutcome::Skipped(e) => debug!("Baro cycle skipped: {}", e),
                }
            }
            TaskId::FlightComputer => {
                let reports = fc.drain(&accel_rx, &baro_rx, now);
                for report in &reports {
                    if publish_report(report, &snapshot, &telemetry_tx) == PushOutcome::Dropped {
                        telemetry_dropped += 1;
                    }
                    if let Some(t) = report.transition {
                        transitions.push(t);
                    }
                }
                if let Some(last) = reports.last() {
                    if ejection.apply(last.decision)? {
                        if last.decision.actuate {
                            info!("Ejection line high ({:?})", last.decision.reason);
                            deployed_at.get_or_insert(now);
                        } else {
                            info!("Ejection line released");
                            released_at = Some(now);
                        }
                    }
                }
            }
            TaskId::TelemetrySink => {
                sink_runs += 1;
                if sink_runs % HEALTH_EVERY == 0 {
                    let health = SensorHealth::capture(now, accel_stats, baro_stats, telemetry_dropped);
                    if publish(&telemetry_tx, TelemetryEntry::Health(health)) == PushOutcome::Dropped {
                        telemetry_dropped += 1;
                    }
                }
                while let Ok(entry) = telemetry_q.try_receive() {
                    sink.consume(&entry);
                }
            }
        }
    }

    let (telemetry_rows, max_estimated_agl) = sink.finish()?;
    let pin_edges = ejection.into_inner().edges();
    let world = world.borrow();
    let vehicle = world.vehicle();
    let (true_apogee_agl, apogee_s) = vehicle.apogee();
    let at = |s: f64| Instant::from_micros((s * 1e6).round() as u64);

    let summary = FlightSummary {
        scenario: scenario.name,
        transitions,
        final_phase: fc.snapshot().phase,
        deploy_reason: fc.controller().fired(),
        backup_expired: fc.controller().backup_expired(),
        deployed_at,
        released_at,
        pin_edges,
        true_apogee_agl,
        true_apogee_at: at(apogee_s),
        landed_at: vehicle.landed_at().map(at),
        max_estimated_agl,
        telemetry_rows,
        telemetry_dropped,
        accel: accel_stats,
        baro: baro_stats,
        accel_lost,
        flight_computer: sched.stats(TaskId::FlightComputer),
    };
    info!(
        "Scenario {} done: {} after {} transitions",
        scenario.name,
        summary.final_phase.label(),
        summary.transitions.len()
    );
    Ok(summary)
}
