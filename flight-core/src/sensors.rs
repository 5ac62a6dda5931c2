// sensors.rs
// The boundary between the flight core and the transducers.
use embassy_time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    BusError,
    InvalidData,
    DeviceMissing,
    Timeout,
    /// The sensor reported a failed status for a conversion phase.
    ConversionFailed,
}

impl core::fmt::Display for SensorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            SensorError::BusError => "bus error",
            SensorError::InvalidData => "invalid data",
            SensorError::DeviceMissing => "device missing",
            SensorError::Timeout => "timeout",
            SensorError::ConversionFailed => "conversion failed",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for SensorError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConversionKind {
    Temperature,
    Pressure,
}

/// Single-axis accelerometer.
#[allow(async_fn_in_trait)]
pub trait Accelerometer {
    /// Acceleration along the vehicle's long axis, m/s².
    async fn read_axis_acceleration(&mut self) -> Result<f32, SensorError>;
}

/// Two-phase barometer: start a conversion, wait, read the result.
#[allow(async_fn_in_trait)]
pub trait Barometer {
    /// Starts a conversion and returns how long to wait (ms) before reading.
    async fn start_conversion(&mut self, kind: ConversionKind) -> Result<u32, SensorError>;

    /// Reads a finished conversion: °C for temperature, Pa for pressure.
    async fn read_result(&mut self, kind: ConversionKind) -> Result<f32, SensorError>;
}

/// Monotonic time source used to stamp samples.
pub trait Clock {
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}
