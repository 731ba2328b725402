//! Rating aggregation and calibration engine for competency matrices.

pub mod calibration;
pub mod config;
pub mod error;
pub mod telemetry;
