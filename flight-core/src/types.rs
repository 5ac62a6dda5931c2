// types.rs
use embassy_time::Instant;

/// Discrete flight phase. Discriminants follow the order the phases are
/// flown in, so `Ord` doubles as "how far through the flight are we".
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlightPhase {
    PreFlight = 0,        // On the pad, waiting for launch
    PoweredFlight = 1,    // Motor is burning
    Coasting = 2,         // Motor out, still climbing
    Apogee = 3,           // One-cycle marker at the peak
    BallisticDescent = 4, // Falling, waiting for the ejection height
    ParachuteDescent = 5, // Under canopy
    PostFlight = 6,       // Back on the ground
    Undefined = 7,        // Fault sentinel, never a nominal state
}

impl FlightPhase {
    pub const fn index(self) -> u8 {
        self as u8
    }

    pub const fn is_nominal(self) -> bool {
        !matches!(self, FlightPhase::Undefined)
    }

    pub const fn label(self) -> &'static str {
        match self {
            FlightPhase::PreFlight => "PreFlight",
            FlightPhase::PoweredFlight => "PoweredFlight",
            FlightPhase::Coasting => "Coasting",
            FlightPhase::Apogee => "Apogee",
            FlightPhase::BallisticDescent => "BallisticDescent",
            FlightPhase::ParachuteDescent => "ParachuteDescent",
            FlightPhase::PostFlight => "PostFlight",
            FlightPhase::Undefined => "Undefined",
        }
    }
}

/// One accelerometer reading along the vehicle's long axis.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AccelSample {
    /// Proper acceleration in m/s² (reads ~+9.8 on the pad).
    pub axis_acceleration: f32,
    pub timestamp: Instant,
}

/// One completed temperature + pressure conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BaroSample {
    /// Pascals.
    pub pressure: f32,
    /// Degrees Celsius.
    pub temperature: f32,
    pub timestamp: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RawSample {
    Accel(AccelSample),
    Baro(BaroSample),
}

impl RawSample {
    pub const fn timestamp(&self) -> Instant {
        match self {
            RawSample::Accel(s) => s.timestamp,
            RawSample::Baro(s) => s.timestamp,
        }
    }
}

/// Vertical kinematic state derived from the barometer.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KinematicEstimate {
    pub altitude_msl: f32,
    pub altitude_agl: f32,
    pub vertical_velocity: f32,
    /// Latest axis acceleration seen on the accelerometer queue.
    pub vertical_acceleration: f32,
    /// Pressure (Pa) and temperature (°C) the altitude was computed from.
    pub pressure: f32,
    pub temperature: f32,
    pub sample_time: Instant,
    /// False until two consecutive pressure samples have been differentiated.
    pub valid: bool,
}

impl KinematicEstimate {
    pub const fn new() -> Self {
        Self {
            altitude_msl: 0.0,
            altitude_agl: 0.0,
            vertical_velocity: 0.0,
            vertical_acceleration: 0.0,
            pressure: 0.0,
            temperature: 0.0,
            sample_time: Instant::from_ticks(0),
            valid: false,
        }
    }
}

impl Default for KinematicEstimate {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeployReason {
    None = 0,
    PhaseWindow = 1,
    TimerBackup = 2,
}

/// The only value that ever reaches the ejection line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeploymentDecision {
    pub actuate: bool,
    pub reason: DeployReason,
}

impl DeploymentDecision {
    pub const IDLE: Self = Self {
        actuate: false,
        reason: DeployReason::None,
    };

    pub const fn fire(reason: DeployReason) -> Self {
        Self {
            actuate: true,
            reason,
        }
    }
}

/// Immutable copy of the state-machine task's state, handed to the
/// deployment controller and telemetry.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlightSnapshot {
    pub phase: FlightPhase,
    pub estimate: KinematicEstimate,
    /// Instant the phase first advanced past PreFlight.
    pub launched_at: Option<Instant>,
}

impl FlightSnapshot {
    pub const fn new() -> Self {
        Self {
            phase: FlightPhase::PreFlight,
            estimate: KinematicEstimate::new(),
            launched_at: None,
        }
    }
}

impl Default for FlightSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// A committed phase change.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhaseTransition {
    pub from: FlightPhase,
    pub to: FlightPhase,
    pub at: Instant,
    /// Set when the backup timer forced the change rather than a table rule.
    pub forced: bool,
}
