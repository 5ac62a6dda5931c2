use embassy_time::{Duration, Instant};

use crate::config::FlightConfig;
use crate::{FlightPhase, FlightSnapshot, KinematicEstimate, PhaseTransition, info, warn};

const PHASE_COUNT: usize = FlightPhase::Undefined as usize + 1;

/// Holds the rocket's single flight phase and applies the transition rules.
///
/// Rules are evaluated once per new valid estimate. The phase only ever moves
/// forward: the backup shortcut to ParachuteDescent skips phases but never
/// goes back, and the fault path parks the machine in `Undefined`.
pub struct FlightStateMachine {
    config: FlightConfig,
    phase: FlightPhase,
    /// Instant the phase first left PreFlight. Starts the backup countdown.
    launched_at: Option<Instant>,
    /// Velocity from the previous valid estimate, for apogee sign-change detection.
    last_velocity: f32,
    /// Counter for detecting sustained launch velocity.
    launch_detect_count: u8,
    /// Counter for detecting sustained low acceleration (burnout).
    burnout_detect_count: u8,
    /// Start of the current run of near-zero velocity under canopy.
    still_since: Option<Instant>,
    transition_times: [Option<Instant>; PHASE_COUNT],
}

impl FlightStateMachine {
    pub const fn new(config: FlightConfig) -> Self {
        let mut transition_times = [None; PHASE_COUNT];
        transition_times[FlightPhase::PreFlight as usize] = Some(Instant::from_ticks(0));
        Self {
            config,
            phase: FlightPhase::PreFlight,
            launched_at: None,
            last_velocity: 0.0,
            launch_detect_count: 0,
            burnout_detect_count: 0,
            still_since: None,
            transition_times,
        }
    }

    pub fn phase(&self) -> FlightPhase {
        self.phase
    }

    pub fn launched_at(&self) -> Option<Instant> {
        self.launched_at
    }

    /// When `phase` was entered, if it has been.
    pub fn transition_time(&self, phase: FlightPhase) -> Option<Instant> {
        self.transition_times[phase as usize]
    }

    pub fn snapshot(&self, estimate: KinematicEstimate) -> FlightSnapshot {
        FlightSnapshot {
            phase: self.phase,
            estimate,
            launched_at: self.launched_at,
        }
    }

    /// Applies the transition table to a new estimate, then the backup
    /// shortcut. Invalid estimates only get the backup check.
    pub fn update(&mut self, estimate: &KinematicEstimate, now: Instant) -> Option<PhaseTransition> {
        if estimate.valid && self.phase.is_nominal() {
            let next = self.next_phase(estimate, now);
            self.last_velocity = estimate.vertical_velocity;
            if let Some(to) = next {
                return Some(self.transition_to(to, now, false));
            }
        }
        self.check_backup(now)
    }

    /// Forces ParachuteDescent when the time-to-apogee deadline has passed
    /// and apogee has still not been classified.
    pub fn check_backup(&mut self, now: Instant) -> Option<PhaseTransition> {
        if !self.phase.is_nominal() || self.phase >= FlightPhase::Apogee {
            return None;
        }
        let launched_at = self.launched_at?;
        let elapsed = now.checked_duration_since(launched_at)?;
        if elapsed > self.config.time_to_apogee {
            warn!(
                "Time to apogee expired in {}, forcing parachute descent",
                self.phase.label()
            );
            return Some(self.transition_to(FlightPhase::ParachuteDescent, now, true));
        }
        None
    }

    /// Faults the phase when an in-flight estimate has gone stale.
    pub fn check_staleness(&mut self, age: Option<Duration>, now: Instant) -> Option<PhaseTransition> {
        let in_flight = self.phase >= FlightPhase::PoweredFlight
            && self.phase <= FlightPhase::BallisticDescent;
        match age {
            Some(age) if in_flight && age > self.config.estimate_timeout => {
                warn!("Estimate stale for {}ms in flight", age.as_millis());
                self.fault(now)
            }
            _ => None,
        }
    }

    /// Explicit fault path. `Undefined` is sticky; from here only the
    /// deployment controller's backup timer still acts.
    pub fn fault(&mut self, now: Instant) -> Option<PhaseTransition> {
        if self.phase == FlightPhase::Undefined {
            return None;
        }
        Some(self.transition_to(FlightPhase::Undefined, now, false))
    }

    fn next_phase(&mut self, est: &KinematicEstimate, now: Instant) -> Option<FlightPhase> {
        let cfg = &self.config;
        match self.phase {
            FlightPhase::PreFlight => {
                if est.vertical_velocity > cfg.launch_velocity_threshold_mps {
                    self.launch_detect_count = self.launch_detect_count.saturating_add(1);
                    if self.launch_detect_count >= cfg.launch_confirm_samples {
                        return Some(FlightPhase::PoweredFlight);
                    }
                } else {
                    self.launch_detect_count = 0;
                }
                None
            }
            FlightPhase::PoweredFlight => {
                let low_accel = est.vertical_acceleration <= cfg.burnout_accel_threshold_mps2;
                if low_accel && est.vertical_velocity > 0.0 {
                    self.burnout_detect_count = self.burnout_detect_count.saturating_add(1);
                    if self.burnout_detect_count >= cfg.burnout_confirm_samples {
                        return Some(FlightPhase::Coasting);
                    }
                } else {
                    self.burnout_detect_count = 0;
                }
                None
            }
            FlightPhase::Coasting => {
                if self.last_velocity > 0.0 && est.vertical_velocity <= 0.0 {
                    Some(FlightPhase::Apogee)
                } else {
                    None
                }
            }
            // Apogee is a one-cycle marker.
            FlightPhase::Apogee => Some(FlightPhase::BallisticDescent),
            FlightPhase::BallisticDescent => {
                if est.altitude_agl <= cfg.ejection_height_m {
                    Some(FlightPhase::ParachuteDescent)
                } else {
                    None
                }
            }
            FlightPhase::ParachuteDescent => {
                if libm::fabsf(est.vertical_velocity) < cfg.landed_velocity_threshold_mps {
                    let since = *self.still_since.get_or_insert(now);
                    if now.checked_duration_since(since).unwrap_or(Duration::from_ticks(0))
                        >= cfg.landed_window
                    {
                        return Some(FlightPhase::PostFlight);
                    }
                } else {
                    self.still_since = None;
                }
                None
            }
            FlightPhase::PostFlight | FlightPhase::Undefined => None,
        }
    }

    fn transition_to(&mut self, to: FlightPhase, now: Instant, forced: bool) -> PhaseTransition {
        let from = self.phase;
        if from == FlightPhase::PreFlight && self.launched_at.is_none() {
            self.launched_at = Some(now);
        }
        self.phase = to;
        self.transition_times[to as usize] = Some(now);
        self.launch_detect_count = 0;
        self.burnout_detect_count = 0;
        self.still_since = None;
        info!("Phase {} -> {}", from.label(), to.label());
        PhaseTransition {
            from,
            to,
            at: now,
            forced,
        }
    }
}

#[cfg(test)]
mod tests;
