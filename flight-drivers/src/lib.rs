#![no_std]

pub mod bmp180;
pub mod mpu6050;

pub use bmp180::{Bmp180, Oversampling};
pub use mpu6050::{AccelRange, Axis, Mpu6050};

#[cfg(test)]
mod fake_bus;
