// src/mpu6050.rs
use embedded_hal_async::i2c::I2c as AsyncI2c;
use flight_core::{Accelerometer, SensorError, info};

/// Standard gravity, m/s² per g.
const STANDARD_GRAVITY: f32 = 9.80665;

/// Accelerometer full-scale range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccelRange {
    G2,
    G4,
    G8,
    G16,
}

impl AccelRange {
    /// ACCEL_CONFIG AFS_SEL bits.
    const fn config_bits(self) -> u8 {
        match self {
            AccelRange::G2 => 0x00,
            AccelRange::G4 => 0x08,
            AccelRange::G8 => 0x10,
            AccelRange::G16 => 0x18,
        }
    }

    pub const fn lsb_per_g(self) -> f32 {
        match self {
            AccelRange::G2 => 16384.0,
            AccelRange::G4 => 8192.0,
            AccelRange::G8 => 4096.0,
            AccelRange::G16 => 2048.0,
        }
    }
}

/// Sensor axis aligned with the vehicle's long axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    const fn out_h(self) -> u8 {
        match self {
            Axis::X => 0x3B,
            Axis::Y => 0x3D,
            Axis::Z => 0x3F,
        }
    }
}

pub struct Mpu6050<I2C> {
    i2c: I2C,
    range: AccelRange,
    axis: Axis,
}

impl<I2C: AsyncI2c> Mpu6050<I2C> {
    pub const ADDR: u8 = 0x68;
    const WHO_AM_I: u8 = 0x75;
    const PWR_MGMT_1: u8 = 0x6B;
    const ACCEL_CONFIG: u8 = 0x1C;

    /// ±16 g on the X axis, the flight configuration.
    pub fn new(i2c_dev: I2C) -> Self {
        Self::with_config(i2c_dev, AccelRange::G16, Axis::X)
    }

    pub fn with_config(i2c_dev: I2C, range: AccelRange, axis: Axis) -> Self {
        Self {
            i2c: i2c_dev,
            range,
            axis,
        }
    }

    /// Checks the identity, wakes the part and sets the range.
    pub async fn init(&mut self) -> Result<(), SensorError> {
        let mut id = [0u8; 1];
        self.i2c
            .write_read(Self::ADDR, &[Self::WHO_AM_I], &mut id)
            .await
            .map_err(|_| SensorError::BusError)?;

        if id[0] != 0x68 {
            info!("MPU6050: Wrong ID 0x{:x}", id[0]);
            return Err(SensorError::DeviceMissing);
        }

        // Clear SLEEP, internal oscillator.
        self.i2c
            .write(Self::ADDR, &[Self::PWR_MGMT_1, 0x00])
            .await
            .map_err(|_| SensorError::BusError)?;

        self.i2c
            .write(Self::ADDR, &[Self::ACCEL_CONFIG, self.range.config_bits()])
            .await
            .map_err(|_| SensorError::BusError)?;

        info!("MPU6050: Online ({:?})", self.range);
        Ok(())
    }

    pub async fn read_raw(&mut self) -> Result<i16, SensorError> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(Self::ADDR, &[self.axis.out_h()], &mut buf)
            .await
            .map_err(|_| SensorError::BusError)?;
        Ok(i16::from_be_bytes(buf))
    }

    /// Acceleration on the configured axis in m/s².
    pub async fn read_x_acceleration(&mut self) -> Result<f32, SensorError> {
        let raw = self.read_raw().await?;
        Ok(raw as f32 / self.range.lsb_per_g() * STANDARD_GRAVITY)
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: AsyncI2c> Accelerometer for Mpu6050<I2C> {
    async fn read_axis_acceleration(&mut self) -> Result<f32, SensorError> {
        self.read_x_acceleration().await
    }
}
