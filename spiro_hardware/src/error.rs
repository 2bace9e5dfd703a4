use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("sensor read timeout")]
    Timeout,
    #[error("sensor fault: {0}")]
    Fault(String),
    #[error("recording line {line}: {reason}")]
    Parse { line: u64, reason: String },
    #[error("recording contains no samples")]
    EmptyRecording,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
