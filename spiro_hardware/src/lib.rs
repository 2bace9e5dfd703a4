//! Pressure-sensor collaborators for the monitor.
//!
//! Physical gauge drivers are out of tree; this crate provides a synthetic
//! breather for bench runs and a replay source for recorded sessions.
pub mod error;
pub mod replay;
pub mod sim;

pub use error::HwError;
pub use replay::ReplaySensor;
pub use sim::{BreathPattern, SimulatedBreather};

/// Conversion for gauges that report millibar.
pub const MBAR_TO_CMH2O: f64 = 1.01972;
