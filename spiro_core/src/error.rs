use thiserror::Error;

/// Fatal, configuration-time calibration problems.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("unknown mouthpiece '{id}' (configured: {known})")]
    UnknownMouthpiece { id: String, known: String },
    #[error("malformed calibration table for '{mouthpiece}': {reason}")]
    Malformed { mouthpiece: String, reason: String },
    #[error("invalid calibration coefficients: {0}")]
    InvalidCoefficients(&'static str),
    #[error("no calibration tables configured")]
    Empty,
}

/// Per-tick and runtime failures. None of these stop a cadence.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MonitorError {
    #[error("sensor read failed: {0}")]
    SensorRead(String),
    #[error("sensor fault: {0}")]
    SensorFault(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("invalid sample: {0}")]
    InvalidSample(&'static str),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing calibration")]
    MissingCalibration,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
