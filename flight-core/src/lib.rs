// lib.rs
#![no_std]

pub mod macros;

pub mod channels;
pub mod config;
pub mod datacells;
pub mod deployment;
pub mod estimator;
pub mod health_types;
pub mod pipeline;
pub mod readers;
pub mod sensors;
pub mod state_machine;
pub mod telemetry;
pub mod types;

pub use config::FlightConfig;
pub use deployment::{ActuatorError, BackupTimer, DeploymentController, EjectionChannel};
pub use estimator::{EstimateError, KinematicEstimator};
pub use health_types::*;
pub use pipeline::{CycleReport, FlightComputer};
pub use sensors::*;
pub use state_machine::*;
pub use types::*;
