// readers.rs
// One cycle of each sensor reader. The periodic loop around a cycle (ticker,
// priority, per-cycle timeout) belongs to whoever schedules the task.
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Sender;
use embedded_hal_async::delay::DelayNs;

use crate::channels::{PushOutcome, push_blocking, push_or_drop};
use crate::health_types::ReaderStats;
use crate::sensors::{Accelerometer, Barometer, Clock, ConversionKind, SensorError};
use crate::{AccelSample, BaroSample};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadOutcome {
    Enqueued(BaroSample),
    /// Read fine, but the queue was full.
    Dropped,
    /// A conversion phase failed; nothing was produced this cycle.
    Skipped(SensorError),
}

/// Reads the accelerometer once and blocks until the sample is queued.
///
/// A failed read produces nothing and is not retried; the next scheduled
/// cycle tries again.
pub async fn sample_acceleration<A, C, M, const N: usize>(
    imu: &mut A,
    clock: &C,
    tx: &Sender<'_, M, AccelSample, N>,
    stats: &mut ReaderStats,
) -> Result<AccelSample, SensorError>
where
    A: Accelerometer,
    C: Clock,
    M: RawMutex,
{
    let axis_acceleration = match imu.read_axis_acceleration().await {
        Ok(a) if a.is_finite() => a,
        Ok(_) => {
            stats.on_failure();
            return Err(SensorError::InvalidData);
        }
        Err(e) => {
            stats.on_failure();
            return Err(e);
        }
    };

    let sample = AccelSample {
        axis_acceleration,
        timestamp: clock.now(),
    };
    push_blocking(tx, sample).await;
    stats.on_success();
    Ok(sample)
}

/// Runs a temperature then a pressure conversion and offers the result to
/// the queue without waiting.
pub async fn sample_pressure<B, D, C, M, const N: usize>(
    baro: &mut B,
    delay: &mut D,
    clock: &C,
    tx: &Sender<'_, M, BaroSample, N>,
    stats: &mut ReaderStats,
) -> ReadOutcome
where
    B: Barometer,
    D: DelayNs,
    C: Clock,
    M: RawMutex,
{
    let reading = async {
        let temperature = convert(baro, delay, ConversionKind::Temperature).await?;
        let pressure = convert(baro, delay, ConversionKind::Pressure).await?;
        Ok::<_, SensorError>((temperature, pressure))
    };

    let (temperature, pressure) = match reading.await {
        Ok(values) => values,
        Err(e) => {
            stats.on_failure();
            return ReadOutcome::Skipped(e);
        }
    };

    let sample = BaroSample {
        pressure,
        temperature,
        timestamp: clock.now(),
    };
    match push_or_drop(tx, sample) {
        PushOutcome::Enqueued => {
            stats.on_success();
            ReadOutcome::Enqueued(sample)
        }
        PushOutcome::Dropped => {
            stats.on_drop();
            ReadOutcome::Dropped
        }
    }
}

async fn convert<B: Barometer, D: DelayNs>(
    baro: &mut B,
    delay: &mut D,
    kind: ConversionKind,
) -> Result<f32, SensorError> {
    let wait_ms = baro.start_conversion(kind).await?;
    delay.delay_ms(wait_ms).await;
    baro.read_result(kind).await
}
