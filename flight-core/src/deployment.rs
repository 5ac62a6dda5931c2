// deployment.rs
use embassy_time::{Duration, Instant};
use embedded_hal::digital::OutputPin;

use crate::config::FlightConfig;
use crate::{DeployReason, DeploymentDecision, FlightPhase, FlightSnapshot, info, warn};

/// Countdown armed once at the instant the flight starts. It cannot be
/// re-armed or reset, and whether it has fired is a pure function of the
/// start instant, the duration and the current time.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BackupTimer {
    started_at: Option<Instant>,
    duration: Duration,
}

impl BackupTimer {
    pub const fn new(duration: Duration) -> Self {
        Self {
            started_at: None,
            duration,
        }
    }

    /// Arms the timer. Later calls are ignored; returns true only on the first.
    pub fn arm(&mut self, at: Instant) -> bool {
        if self.started_at.is_some() {
            return false;
        }
        self.started_at = Some(at);
        true
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.started_at
            .is_some_and(|start| has_expired(start, self.duration, now))
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let start = self.started_at?;
        let elapsed = now.checked_duration_since(start).unwrap_or(Duration::from_ticks(0));
        Some(self.duration.checked_sub(elapsed).unwrap_or(Duration::from_ticks(0)))
    }
}

/// True once strictly more than `duration` has elapsed since `start`.
pub fn has_expired(start: Instant, duration: Duration, now: Instant) -> bool {
    now.checked_duration_since(start)
        .is_some_and(|elapsed| elapsed > duration)
}

/// Decides the state of the ejection line from the committed phase and time.
///
/// Two independent triggers are OR-ed: the phase window `[Apogee,
/// ParachuteDescent)` and the time-to-apogee backup timer. The first one to
/// fire latches the line high. It is released for good when the deploy hold
/// runs out or the flight reaches PostFlight, whichever comes first. A fault
/// to Undefined neither de-arms nor extends it.
pub struct DeploymentController {
    timer: BackupTimer,
    hold: Duration,
    latched: DeployReason,
    latched_at: Option<Instant>,
    backup_expired: bool,
    released: bool,
}

impl DeploymentController {
    pub const fn new(config: &FlightConfig) -> Self {
        Self {
            timer: BackupTimer::new(config.time_to_apogee),
            hold: config.deploy_hold,
            latched: DeployReason::None,
            latched_at: None,
            backup_expired: false,
            released: false,
        }
    }

    pub fn decide(&mut self, snapshot: &FlightSnapshot, now: Instant) -> DeploymentDecision {
        if let Some(launched_at) = snapshot.launched_at {
            if self.timer.arm(launched_at) {
                info!("Backup deployment timer armed");
            }
        }

        let timer_fired = !self.backup_expired && self.timer.expired(now);
        if timer_fired {
            self.backup_expired = true;
        }

        if self.released {
            return DeploymentDecision::IDLE;
        }

        if snapshot.phase == FlightPhase::PostFlight {
            self.released = true;
            if self.latched != DeployReason::None {
                info!("Ejection channel released on landing");
            }
            return DeploymentDecision::IDLE;
        }

        let in_window = snapshot.phase >= FlightPhase::Apogee
            && snapshot.phase < FlightPhase::ParachuteDescent;
        if in_window && self.latched == DeployReason::None {
            self.latch(DeployReason::PhaseWindow, now);
            info!("Deploying: phase window ({})", snapshot.phase.label());
        }

        if timer_fired {
            if self.latched == DeployReason::None {
                self.latch(DeployReason::TimerBackup, now);
                warn!("Deploying: backup timer expired in {}", snapshot.phase.label());
            } else {
                info!("Backup timer expired after deployment");
            }
        }

        match self.latched_at {
            None => DeploymentDecision::IDLE,
            Some(at) if has_expired(at, self.hold, now) => {
                self.released = true;
                info!("Ejection channel released after {}ms hold", self.hold.as_millis());
                DeploymentDecision::IDLE
            }
            Some(_) => DeploymentDecision::fire(self.latched),
        }
    }

    fn latch(&mut self, reason: DeployReason, now: Instant) {
        self.latched = reason;
        self.latched_at = Some(now);
    }

    /// When the line first went high.
    pub fn latched_at(&self) -> Option<Instant> {
        self.latched_at
    }

    pub fn released(&self) -> bool {
        self.released
    }

    /// Reason of the first trigger, `None` until something fired.
    pub fn fired(&self) -> DeployReason {
        self.latched
    }

    pub fn backup_expired(&self) -> bool {
        self.backup_expired
    }

    pub fn timer(&self) -> &BackupTimer {
        &self.timer
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActuatorError {
    /// The output pin refused the write; the next cycle writes again.
    Pin,
}

/// The physical ejection line. Writes the pin only when the level changes.
pub struct EjectionChannel<P> {
    pin: P,
    asserted: bool,
}

impl<P: OutputPin> EjectionChannel<P> {
    /// Takes the pin and drives it inactive.
    pub fn new(mut pin: P) -> Result<Self, ActuatorError> {
        pin.set_low().map_err(|_| ActuatorError::Pin)?;
        Ok(Self {
            pin,
            asserted: false,
        })
    }

    /// Drives the line to match `decision`. Returns whether the level changed.
    pub fn apply(&mut self, decision: DeploymentDecision) -> Result<bool, ActuatorError> {
        if decision.actuate == self.asserted {
            return Ok(false);
        }
        if decision.actuate {
            self.pin.set_high().map_err(|_| ActuatorError::Pin)?;
        } else {
            self.pin.set_low().map_err(|_| ActuatorError::Pin)?;
        }
        self.asserted = decision.actuate;
        Ok(true)
    }

    pub fn is_asserted(&self) -> bool {
        self.asserted
    }

    pub fn into_inner(self) -> P {
        self.pin
    }
}
