// config.rs
// Compile-time flight constants. Nothing here is reloadable at runtime.
use embassy_time::Duration;

/// Eject at 1000m AGL.
pub const EJECTION_HEIGHT_M: f32 = 1000.0;
/// Assume the sea level pressure is 101325 Pa. This changes with the weather.
pub const SEA_LEVEL_PRESSURE_PA: f32 = 101_325.0;
/// Altitude of the launch site (Mean Sea Level).
pub const BASE_ALTITUDE_M: f32 = 1417.0;

/// Vertical velocity (m/s) that must be exceeded to leave PreFlight.
pub const LAUNCH_VELOCITY_THRESHOLD_MPS: f32 = 10.0;
/// Consecutive samples above the launch threshold before PoweredFlight.
pub const LAUNCH_CONFIRM_SAMPLES: u8 = 2;
/// Axis acceleration (m/s²) at or below which the motor is considered out.
pub const BURNOUT_ACCEL_THRESHOLD_MPS2: f32 = 2.0;
/// Consecutive low-acceleration samples before Coasting.
pub const BURNOUT_CONFIRM_SAMPLES: u8 = 3;
/// |velocity| below this counts as standing still.
pub const LANDED_VELOCITY_THRESHOLD_MPS: f32 = 1.0;
/// How long the vehicle must stand still under canopy before PostFlight.
pub const LANDED_WINDOW: Duration = Duration::from_secs(5);

/// Pre-flight estimate of launch-to-apogee time (TTA) for the backup trigger.
pub const TIME_TO_APOGEE: Duration = Duration::from_secs(25);
/// An in-flight estimate older than this faults the phase to Undefined.
pub const ESTIMATE_TIMEOUT: Duration = Duration::from_secs(2);
/// Longest the ejection line is held high after it first fires.
pub const DEPLOY_HOLD: Duration = Duration::from_secs(5);

pub const ACCEL_PERIOD: Duration = Duration::from_millis(10);
pub const BARO_PERIOD: Duration = Duration::from_millis(40);
pub const PIPELINE_PERIOD: Duration = Duration::from_millis(10);

pub const ACCEL_QUEUE_LEN: usize = 10;
pub const BARO_QUEUE_LEN: usize = 10;
pub const TELEMETRY_QUEUE_LEN: usize = 16;

/// Tunables consumed by the estimator, state machine and deployment controller.
///
/// `FlightConfig::DEFAULT` mirrors the constants above. Test benches and the
/// SITL build their own copies with struct-update syntax.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightConfig {
    pub ejection_height_m: f32,
    pub reference_pressure_pa: f32,
    pub base_altitude_m: f32,
    pub launch_velocity_threshold_mps: f32,
    pub launch_confirm_samples: u8,
    pub burnout_accel_threshold_mps2: f32,
    pub burnout_confirm_samples: u8,
    pub landed_velocity_threshold_mps: f32,
    pub landed_window: Duration,
    pub time_to_apogee: Duration,
    pub estimate_timeout: Duration,
    pub deploy_hold: Duration,
}

impl FlightConfig {
    pub const DEFAULT: Self = Self {
        ejection_height_m: EJECTION_HEIGHT_M,
        reference_pressure_pa: SEA_LEVEL_PRESSURE_PA,
        base_altitude_m: BASE_ALTITUDE_M,
        launch_velocity_threshold_mps: LAUNCH_VELOCITY_THRESHOLD_MPS,
        launch_confirm_samples: LAUNCH_CONFIRM_SAMPLES,
        burnout_accel_threshold_mps2: BURNOUT_ACCEL_THRESHOLD_MPS2,
        burnout_confirm_samples: BURNOUT_CONFIRM_SAMPLES,
        landed_velocity_threshold_mps: LANDED_VELOCITY_THRESHOLD_MPS,
        landed_window: LANDED_WINDOW,
        time_to_apogee: TIME_TO_APOGEE,
        estimate_timeout: ESTIMATE_TIMEOUT,
        deploy_hold: DEPLOY_HOLD,
    };
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
