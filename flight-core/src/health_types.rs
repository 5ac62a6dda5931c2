// health_types.rs
use crate::telemetry::{FlightTicks, LogBuffer, Loggable};
use core::fmt::Write;
use embassy_time::Instant;

/// Running counters kept by a sensor reader task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReaderStats {
    /// Samples handed to the queue.
    pub samples: u32,
    /// Failed transducer reads (accelerometer) or abandoned cycles (barometer).
    pub skipped: u32,
    /// Samples produced but discarded on a full queue.
    pub dropped: u32,
    /// Rolling error level: +5 per failure, -1 per success, like a leaky bucket.
    pub error_level: u8,
}

impl ReaderStats {
    pub const fn new() -> Self {
        Self {
            samples: 0,
            skipped: 0,
            dropped: 0,
            error_level: 0,
        }
    }

    pub fn on_success(&mut self) {
        self.samples = self.samples.wrapping_add(1);
        self.error_level = self.error_level.saturating_sub(1);
    }

    pub fn on_failure(&mut self) {
        self.skipped = self.skipped.wrapping_add(1);
        self.error_level = self.error_level.saturating_add(5);
    }

    pub fn on_drop(&mut self) {
        self.dropped = self.dropped.wrapping_add(1);
    }
}

/// Health of the sensing side, periodically sent to telemetry.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorHealth {
    /// Tickstamp of when the health was captured.
    pub tickstamp: FlightTicks,
    pub accel: ReaderStats,
    pub baro: ReaderStats,
    pub telemetry_dropped: u32,
}

impl SensorHealth {
    pub const fn new() -> Self {
        Self {
            tickstamp: 0,
            accel: ReaderStats::new(),
            baro: ReaderStats::new(),
            telemetry_dropped: 0,
        }
    }

    pub fn capture(now: Instant, accel: ReaderStats, baro: ReaderStats, telemetry_dropped: u32) -> Self {
        Self {
            tickstamp: now.as_ticks(),
            accel,
            baro,
            telemetry_dropped,
        }
    }
}

impl Loggable for SensorHealth {
    const TAG: &'static str = "SH";
    const CSV_HEADER: &'static str = "accel_samples,accel_skipped,accel_error,baro_samples,baro_skipped,baro_dropped,baro_error,telemetry_dropped";

    fn format_payload<const SIZE: usize>(&self, cursor: &mut LogBuffer<SIZE>) -> core::fmt::Result {
        write!(
            cursor,
            "{},{},{},{},{},{},{},{}",
            self.accel.samples,
            self.accel.skipped,
            self.accel.error_level,
            self.baro.samples,
            self.baro.skipped,
            self.baro.dropped,
            self.baro.error_level,
            self.telemetry_dropped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_level_is_a_leaky_bucket() {
        let mut stats = ReaderStats::new();
        stats.on_failure();
        stats.on_failure();
        assert_eq!(stats.error_level, 10);
        stats.on_success();
        assert_eq!(stats.error_level, 9);
        assert_eq!(stats.samples, 1);
        assert_eq!(stats.skipped, 2);

        for _ in 0..100 {
            stats.on_failure();
        }
        assert_eq!(stats.error_level, u8::MAX);
    }
}
