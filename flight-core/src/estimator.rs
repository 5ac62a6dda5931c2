// estimator.rs
use embassy_time::{Duration, Instant};

use crate::config::FlightConfig;
use crate::{AccelSample, BaroSample, KinematicEstimate};

/// Exponent of the international barometric formula, 1 / 5.255.
const BAROMETRIC_EXPONENT: f32 = 0.1903;

/// Altitude (m) for a pressure reading against a reference pressure.
pub fn pressure_altitude(pressure_pa: f32, reference_pa: f32) -> f32 {
    44330.0 * (1.0 - libm::powf(pressure_pa / reference_pa, BAROMETRIC_EXPONENT))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EstimateError {
    /// Zero, negative or non-finite pressure. The held estimate is kept.
    InvalidPressure,
}

/// Derives altitude and vertical velocity from the barometer.
///
/// Velocity is a first-order finite difference of AGL altitude. The estimate
/// only turns valid once two pressure samples have been differentiated; a
/// missing sample leaves it exactly as it was and shows up in `age()`.
pub struct KinematicEstimator {
    reference_pressure_pa: f32,
    base_altitude_m: f32,
    estimate: KinematicEstimate,
    /// AGL altitude and time of the last accepted pressure sample.
    previous: Option<(f32, Instant)>,
    last_sample_at: Option<Instant>,
}

impl KinematicEstimator {
    pub const fn new(config: &FlightConfig) -> Self {
        Self {
            reference_pressure_pa: config.reference_pressure_pa,
            base_altitude_m: config.base_altitude_m,
            estimate: KinematicEstimate::new(),
            previous: None,
            last_sample_at: None,
        }
    }

    /// Folds in a pressure/temperature sample and returns the new estimate.
    ///
    /// `Ok(None)` means the sample carried no forward time step: altitude was
    /// refreshed and velocity held, so there is nothing new to classify.
    pub fn update(&mut self, sample: BaroSample) -> Result<Option<KinematicEstimate>, EstimateError> {
        if !sample.pressure.is_finite() || sample.pressure <= 0.0 {
            return Err(EstimateError::InvalidPressure);
        }

        let altitude_msl = pressure_altitude(sample.pressure, self.reference_pressure_pa);
        let altitude_agl = altitude_msl - self.base_altitude_m;

        let mut differentiated = true;
        let est = &mut self.estimate;
        est.altitude_msl = altitude_msl;
        est.altitude_agl = altitude_agl;
        est.pressure = sample.pressure;
        est.temperature = sample.temperature;

        match self.previous {
            None => {
                // Nothing to differentiate against yet.
                est.vertical_velocity = 0.0;
                est.sample_time = sample.timestamp;
                self.previous = Some((altitude_agl, sample.timestamp));
            }
            Some((prev_agl, prev_time)) if sample.timestamp > prev_time => {
                let dt = seconds(sample.timestamp - prev_time);
                est.vertical_velocity = (altitude_agl - prev_agl) / dt;
                est.sample_time = sample.timestamp;
                est.valid = true;
                self.previous = Some((altitude_agl, sample.timestamp));
            }
            Some((_, prev_time)) => {
                // Zero or negative time step: hold the velocity, keep the
                // newest altitude against the latest time reference.
                self.previous = Some((altitude_agl, prev_time));
                differentiated = false;
            }
        }

        self.last_sample_at = Some(match self.last_sample_at {
            Some(t) if t > sample.timestamp => t,
            _ => sample.timestamp,
        });
        Ok(differentiated.then_some(self.estimate))
    }

    /// Records the latest accelerometer reading. Does not touch validity.
    pub fn ingest_acceleration(&mut self, sample: AccelSample) {
        self.estimate.vertical_acceleration = sample.axis_acceleration;
    }

    pub fn estimate(&self) -> KinematicEstimate {
        self.estimate
    }

    /// Time since the last accepted pressure sample, `None` before the first.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.last_sample_at
            .map(|t| now.checked_duration_since(t).unwrap_or(Duration::from_ticks(0)))
    }
}

fn seconds(d: Duration) -> f32 {
    d.as_micros() as f32 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Inverse of `pressure_altitude` for the default reference.
    fn pressure_at(altitude_msl: f32) -> f32 {
        FlightConfig::DEFAULT.reference_pressure_pa
            * libm::powf(1.0 - altitude_msl / 44330.0, 1.0 / BAROMETRIC_EXPONENT)
    }

    fn sample_at_agl(agl: f32, t_ms: u64) -> BaroSample {
        BaroSample {
            pressure: pressure_at(agl + FlightConfig::DEFAULT.base_altitude_m),
            temperature: 15.0,
            timestamp: Instant::from_millis(t_ms),
        }
    }

    fn assert_close(a: f32, b: f32, tol: f32) {
        assert!(libm::fabsf(a - b) <= tol, "{} != {} (tol {})", a, b, tol);
    }

    #[test]
    fn test_sea_level_reference_is_zero_altitude() {
        assert_close(pressure_altitude(101_325.0, 101_325.0), 0.0, 1e-3);
        // Standard atmosphere at ~1417m.
        assert_close(pressure_altitude(pressure_at(1417.0), 101_325.0), 1417.0, 0.5);
    }

    #[test]
    fn test_first_sample_is_not_valid() {
        let mut est = KinematicEstimator::new(&FlightConfig::DEFAULT);
        let e = est.update(sample_at_agl(100.0, 0)).unwrap().unwrap();
        assert!(!e.valid);
        assert_eq!(e.vertical_velocity, 0.0);
        assert_close(e.altitude_agl, 100.0, 0.5);
    }

    #[test]
    fn test_velocity_is_finite_difference() {
        let mut est = KinematicEstimator::new(&FlightConfig::DEFAULT);
        est.update(sample_at_agl(100.0, 0)).unwrap();
        let e = est.update(sample_at_agl(150.0, 5_000)).unwrap().unwrap();
        assert!(e.valid);
        assert_close(e.vertical_velocity, 10.0, 0.1);
        assert_eq!(e.sample_time, Instant::from_millis(5_000));
    }

    #[test]
    fn test_zero_time_delta_holds_velocity() {
        let mut est = KinematicEstimator::new(&FlightConfig::DEFAULT);
        est.update(sample_at_agl(100.0, 0)).unwrap();
        let before = est.update(sample_at_agl(150.0, 5_000)).unwrap().unwrap();

        // Nothing was differentiated, so nothing is handed on.
        assert_eq!(est.update(sample_at_agl(170.0, 5_000)), Ok(None));
        assert_eq!(est.update(sample_at_agl(175.0, 4_000)), Ok(None));
        let e = est.estimate();
        assert_eq!(e.vertical_velocity, before.vertical_velocity);
        assert!(e.vertical_velocity.is_finite());
        assert_close(e.altitude_agl, 175.0, 0.5);

        // The next real step differentiates against the newest altitude.
        let e = est.update(sample_at_agl(185.0, 6_000)).unwrap().unwrap();
        assert_close(e.vertical_velocity, 10.0, 0.5);
    }

    #[test]
    fn test_invalid_pressure_holds_estimate() {
        let mut est = KinematicEstimator::new(&FlightConfig::DEFAULT);
        est.update(sample_at_agl(100.0, 0)).unwrap();
        let held = est.update(sample_at_agl(150.0, 5_000)).unwrap().unwrap();

        for bad in [0.0, -3.0, f32::NAN, f32::INFINITY] {
            let mut s = sample_at_agl(0.0, 6_000);
            s.pressure = bad;
            assert_eq!(est.update(s), Err(EstimateError::InvalidPressure));
        }
        assert_eq!(est.estimate(), held);
        assert_eq!(est.age(Instant::from_millis(6_000)), Some(Duration::from_millis(1_000)));
    }

    #[test]
    fn test_missing_sample_is_visible_as_age() {
        let mut est = KinematicEstimator::new(&FlightConfig::DEFAULT);
        assert_eq!(est.age(Instant::from_millis(10)), None);

        est.update(sample_at_agl(10.0, 1_000)).unwrap();
        let held = est.update(sample_at_agl(12.0, 1_040)).unwrap().unwrap();

        // A skipped barometer cycle never reaches the estimator.
        let now = Instant::from_millis(1_120);
        assert_eq!(est.estimate(), held);
        assert_eq!(est.age(now), Some(Duration::from_millis(80)));
    }

    #[test]
    fn test_acceleration_is_folded_in() {
        let mut est = KinematicEstimator::new(&FlightConfig::DEFAULT);
        est.ingest_acceleration(AccelSample {
            axis_acceleration: 42.0,
            timestamp: Instant::from_millis(3),
        });
        let e = est.estimate();
        assert_eq!(e.vertical_acceleration, 42.0);
        assert!(!e.valid);
    }
}
