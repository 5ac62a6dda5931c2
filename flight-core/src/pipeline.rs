// pipeline.rs
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Receiver, Sender};
use embassy_time::Instant;
use heapless::Vec;

use crate::channels::PushOutcome;
use crate::config::{BARO_QUEUE_LEN, FlightConfig};
use crate::datacells::DataCell;
use crate::deployment::DeploymentController;
use crate::estimator::KinematicEstimator;
use crate::state_machine::FlightStateMachine;
use crate::telemetry::{TelemetryEntry, TelemetryRecord, TelemetryRecorder, publish};
use crate::{
    AccelSample, BaroSample, DeploymentDecision, FlightSnapshot, PhaseTransition, RawSample, debug,
    trace, warn,
};

/// Most pressure samples folded in by a single `drain`. Matches the queue
/// depth so one call can always empty it.
pub const DRAIN_CAPACITY: usize = BARO_QUEUE_LEN;

/// Everything one pipeline cycle committed.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleReport {
    pub snapshot: FlightSnapshot,
    pub decision: DeploymentDecision,
    pub transition: Option<PhaseTransition>,
    pub record: TelemetryRecord,
}

pub type DrainReports = Vec<CycleReport, DRAIN_CAPACITY>;

/// Estimator, phase machine and deployment controller run as one unit, in
/// that order, on every cycle. All state lives here; other tasks only ever
/// see copies through `CycleReport`s and the snapshot `DataCell`.
pub struct FlightComputer {
    estimator: KinematicEstimator,
    machine: FlightStateMachine,
    controller: DeploymentController,
    recorder: TelemetryRecorder,
}

impl FlightComputer {
    pub const fn new(config: FlightConfig) -> Self {
        Self {
            estimator: KinematicEstimator::new(&config),
            machine: FlightStateMachine::new(config),
            controller: DeploymentController::new(&config),
            recorder: TelemetryRecorder::new(),
        }
    }

    pub fn on_acceleration(&mut self, sample: AccelSample) {
        self.estimator.ingest_acceleration(sample);
    }

    /// Folds in a pressure sample and runs one full cycle.
    pub fn on_pressure(&mut self, sample: BaroSample, now: Instant) -> CycleReport {
        let transition = match self.estimator.update(sample) {
            Ok(Some(estimate)) => self.machine.update(&estimate, now),
            Ok(None) => {
                debug!("Pressure sample without a forward time step");
                self.machine.check_backup(now)
            }
            Err(e) => {
                warn!("Pressure sample rejected: {:?}", e);
                self.machine.check_backup(now)
            }
        };
        self.commit(transition, now)
    }

    /// Routes one dequeued sample. Only pressure samples run a cycle.
    pub fn on_sample(&mut self, sample: RawSample, now: Instant) -> Option<CycleReport> {
        if let Some(lag) = now.checked_duration_since(sample.timestamp()) {
            trace!("Sample dequeued {}us after capture", lag.as_micros());
        }
        match sample {
            RawSample::Accel(s) => {
                self.on_acceleration(s);
                None
            }
            RawSample::Baro(s) => Some(self.on_pressure(s, now)),
        }
    }

    /// Cycle without a new sample: the estimate is held as is, only the
    /// staleness check and the timers run.
    pub fn on_tick(&mut self, now: Instant) -> CycleReport {
        let age = self.estimator.age(now);
        let transition = self
            .machine
            .check_staleness(age, now)
            .or_else(|| self.machine.check_backup(now));
        self.commit(transition, now)
    }

    /// Consumes what is queued right now, acceleration first and FIFO per
    /// queue. Returns one report per pressure sample, or a single tick
    /// report if there were none; the last one is the committed state.
    pub fn drain<M: RawMutex, const A: usize, const B: usize>(
        &mut self,
        accel_rx: &Receiver<'_, M, AccelSample, A>,
        baro_rx: &Receiver<'_, M, BaroSample, B>,
        now: Instant,
    ) -> DrainReports {
        while let Ok(sample) = accel_rx.try_receive() {
            self.on_sample(RawSample::Accel(sample), now);
        }

        let mut reports = DrainReports::new();
        while !reports.is_full() {
            match baro_rx.try_receive() {
                Ok(sample) => {
                    if let Some(report) = self.on_sample(RawSample::Baro(sample), now) {
                        // Capacity was checked above.
                        let _ = reports.push(report);
                    }
                }
                Err(_) => break,
            }
        }
        if reports.is_empty() {
            let _ = reports.push(self.on_tick(now));
        }
        reports
    }

    pub fn snapshot(&self) -> FlightSnapshot {
        self.machine.snapshot(self.estimator.estimate())
    }

    pub fn state_machine(&self) -> &FlightStateMachine {
        &self.machine
    }

    pub fn controller(&self) -> &DeploymentController {
        &self.controller
    }

    fn commit(&mut self, transition: Option<PhaseTransition>, now: Instant) -> CycleReport {
        let snapshot = self.snapshot();
        let decision = self.controller.decide(&snapshot, now);
        let record = self.recorder.record(&snapshot, decision, now);
        if let Some(t) = transition {
            debug!("Cycle {} committed transition to {}", record.seq, t.to.label());
        }
        CycleReport {
            snapshot,
            decision,
            transition,
            record,
        }
    }
}

/// Hands a report to everyone downstream: the snapshot cell, then telemetry
/// (transition row first). Telemetry is best effort and never waits.
pub fn publish_report<M: RawMutex, const N: usize>(
    report: &CycleReport,
    cell: &DataCell<FlightSnapshot>,
    telemetry: &Sender<'_, M, TelemetryEntry, N>,
) -> PushOutcome {
    cell.update(report.snapshot);

    let mut outcome = PushOutcome::Enqueued;
    if let Some(t) = report.transition {
        if publish(telemetry, TelemetryEntry::Transition(t)) == PushOutcome::Dropped {
            outcome = PushOutcome::Dropped;
        }
    }
    if publish(telemetry, TelemetryEntry::Cycle(report.record)) == PushOutcome::Dropped {
        outcome = PushOutcome::Dropped;
    }
    outcome
}
