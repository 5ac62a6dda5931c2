// src/bmp180.rs
use embedded_hal_async::i2c::I2c as AsyncI2c;
use flight_core::{Barometer, ConversionKind, SensorError, info};

/// Pressure oversampling setting (`oss`). Higher settings average more
/// internal samples and take longer.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Oversampling {
    UltraLowPower = 0,
    Standard = 1,
    HighResolution = 2,
    UltraHighResolution = 3,
}

impl Oversampling {
    pub const fn oss(self) -> u8 {
        self as u8
    }

    /// Worst-case conversion time in ms.
    pub const fn wait_ms(self) -> u32 {
        match self {
            Oversampling::UltraLowPower => 5,
            Oversampling::Standard => 8,
            Oversampling::HighResolution => 14,
            Oversampling::UltraHighResolution => 26,
        }
    }
}

/// Factory calibration coefficients (EEPROM 0xAA..0xBF).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    pub ac1: i16,
    pub ac2: i16,
    pub ac3: i16,
    pub ac4: u16,
    pub ac5: u16,
    pub ac6: u16,
    pub b1: i16,
    pub b2: i16,
    pub mb: i16,
    pub mc: i16,
    pub md: i16,
}

impl Calibration {
    /// Parses the big-endian EEPROM block. Words of 0x0000 or 0xFFFF mean
    /// the EEPROM did not answer.
    pub fn from_bytes(buf: &[u8; 22]) -> Result<Self, SensorError> {
        let mut words = [0u16; 11];
        for (i, word) in words.iter_mut().enumerate() {
            *word = u16::from_be_bytes([buf[2 * i], buf[2 * i + 1]]);
            if *word == 0x0000 || *word == 0xFFFF {
                return Err(SensorError::InvalidData);
            }
        }
        Ok(Self {
            ac1: words[0] as i16,
            ac2: words[1] as i16,
            ac3: words[2] as i16,
            ac4: words[3],
            ac5: words[4],
            ac6: words[5],
            b1: words[6] as i16,
            b2: words[7] as i16,
            mb: words[8] as i16,
            mc: words[9] as i16,
            md: words[10] as i16,
        })
    }

    /// `B5` from the uncompensated temperature. True temperature in 0.1 °C
    /// is `(B5 + 8) >> 4`.
    ///
    /// Intermediates are 64-bit, so a corrupt calibration word gives
    /// `InvalidData` instead of overflowing.
    pub fn b5(&self, ut: i32) -> Result<i32, SensorError> {
        let x1 = ((ut as i64 - self.ac6 as i64) * self.ac5 as i64) >> 15;
        let denom = x1 + self.md as i64;
        if denom == 0 {
            return Err(SensorError::InvalidData);
        }
        let x2 = ((self.mc as i64) << 11) / denom;
        i32::try_from(x1 + x2).map_err(|_| SensorError::InvalidData)
    }

    /// True pressure in Pa from the uncompensated pressure, using the
    /// `B5` of the preceding temperature conversion.
    pub fn pressure(&self, b5: i32, up: i32, oss: u8) -> Result<i32, SensorError> {
        let b6 = b5 as i64 - 4000;
        if b6.abs() > 1 << 27 {
            return Err(SensorError::InvalidData);
        }
        let b6_sq = (b6 * b6) >> 12;
        let x1 = (self.b2 as i64 * b6_sq) >> 11;
        let x2 = (self.ac2 as i64 * b6) >> 11;
        let x3 = x1 + x2;
        let b3 = (((self.ac1 as i64 * 4 + x3) << oss) + 2) / 4;

        let x1 = (self.ac3 as i64 * b6) >> 13;
        let x2 = (self.b1 as i64 * b6_sq) >> 16;
        let x3 = (x1 + x2 + 2) >> 2;
        let b4 = (self.ac4 as i64 * (x3 + 32768)) >> 15;
        if b4 <= 0 {
            return Err(SensorError::InvalidData);
        }
        let b7 = (up as i64 - b3)
            .checked_mul(50_000 >> oss)
            .filter(|b7| *b7 >= 0)
            .ok_or(SensorError::InvalidData)?;

        let p = if b7 < 0x8000_0000 {
            (b7 * 2) / b4
        } else {
            (b7 / b4) * 2
        };
        if p > i32::MAX as i64 {
            return Err(SensorError::InvalidData);
        }

        let x1 = (p >> 8) * (p >> 8);
        let x1 = (x1 * 3038) >> 16;
        let x2 = (-7357 * p) >> 16;
        i32::try_from(p + ((x1 + x2 + 3791) >> 4)).map_err(|_| SensorError::InvalidData)
    }
}

pub struct Bmp180<I2C> {
    i2c: I2C,
    oversampling: Oversampling,
    calibration: Option<Calibration>,
    pending: Option<ConversionKind>,
    /// From the last temperature conversion; pressure needs it.
    b5: Option<i32>,
}

impl<I2C: AsyncI2c> Bmp180<I2C> {
    pub const ADDR: u8 = 0x77;
    const CHIP_ID: u8 = 0xD0;
    const CALIB_START: u8 = 0xAA;
    const CTRL_MEAS: u8 = 0xF4;
    const OUT_MSB: u8 = 0xF6;
    const CMD_TEMPERATURE: u8 = 0x2E;
    const CMD_PRESSURE: u8 = 0x34;
    const SCO: u8 = 0x20;
    const TEMPERATURE_WAIT_MS: u32 = 5;

    pub fn new(i2c_dev: I2C, oversampling: Oversampling) -> Self {
        Self {
            i2c: i2c_dev,
            oversampling,
            calibration: None,
            pending: None,
            b5: None,
        }
    }

    /// Checks the chip id and loads the calibration block.
    pub async fn init(&mut self) -> Result<(), SensorError> {
        let mut id = [0u8; 1];
        self.i2c
            .write_read(Self::ADDR, &[Self::CHIP_ID], &mut id)
            .await
            .map_err(|_| SensorError::BusError)?;

        if id[0] != 0x55 {
            info!("BMP180: Wrong ID 0x{:x}", id[0]);
            return Err(SensorError::DeviceMissing);
        }

        let mut buf = [0u8; 22];
        self.i2c
            .write_read(Self::ADDR, &[Self::CALIB_START], &mut buf)
            .await
            .map_err(|_| SensorError::BusError)?;
        self.calibration = Some(Calibration::from_bytes(&buf)?);

        info!("BMP180: Online (oss {})", self.oversampling.oss());
        Ok(())
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    async fn read_output<const N: usize>(&mut self) -> Result<[u8; N], SensorError> {
        // SCO stays set until the conversion has finished.
        let mut ctrl = [0u8; 1];
        self.i2c
            .write_read(Self::ADDR, &[Self::CTRL_MEAS], &mut ctrl)
            .await
            .map_err(|_| SensorError::BusError)?;
        if ctrl[0] & Self::SCO != 0 {
            return Err(SensorError::Timeout);
        }

        let mut buf = [0u8; N];
        self.i2c
            .write_read(Self::ADDR, &[Self::OUT_MSB], &mut buf)
            .await
            .map_err(|_| SensorError::BusError)?;
        Ok(buf)
    }
}

impl<I2C: AsyncI2c> Barometer for Bmp180<I2C> {
    async fn start_conversion(&mut self, kind: ConversionKind) -> Result<u32, SensorError> {
        if self.calibration.is_none() {
            return Err(SensorError::DeviceMissing);
        }
        let (command, wait_ms) = match kind {
            ConversionKind::Temperature => (Self::CMD_TEMPERATURE, Self::TEMPERATURE_WAIT_MS),
            ConversionKind::Pressure => (
                Self::CMD_PRESSURE + (self.oversampling.oss() << 6),
                self.oversampling.wait_ms(),
            ),
        };
        self.pending = None;
        self.i2c
            .write(Self::ADDR, &[Self::CTRL_MEAS, command])
            .await
            .map_err(|_| SensorError::BusError)?;
        self.pending = Some(kind);
        Ok(wait_ms)
    }

    async fn read_result(&mut self, kind: ConversionKind) -> Result<f32, SensorError> {
        if self.pending != Some(kind) {
            return Err(SensorError::ConversionFailed);
        }
        let calibration = self.calibration.ok_or(SensorError::DeviceMissing)?;

        match kind {
            ConversionKind::Temperature => {
                let buf = self.read_output::<2>().await?;
                self.pending = None;
                let ut = u16::from_be_bytes(buf) as i32;
                let b5 = calibration.b5(ut)?;
                self.b5 = Some(b5);
                Ok(((b5 + 8) >> 4) as f32 / 10.0)
            }
            ConversionKind::Pressure => {
                let b5 = self.b5.ok_or(SensorError::ConversionFailed)?;
                let buf = self.read_output::<3>().await?;
                self.pending = None;
                let oss = self.oversampling.oss();
                let raw = ((buf[0] as i32) << 16) | ((buf[1] as i32) << 8) | buf[2] as i32;
                let up = raw >> (8 - oss);
                Ok(calibration.pressure(b5, up, oss)? as f32)
            }
        }
    }
}
