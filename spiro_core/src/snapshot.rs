//! Immutable copies of the fast cadence's buffers.

use crate::params::BreathParameters;

/// Channel arrays in time order, all of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferSnapshot {
    pub time: Vec<f64>,
    pub pressure: Vec<f64>,
    pub flow: Vec<f64>,
    /// Drift-corrected volume.
    pub volume: Vec<f64>,
    /// Integrator output before drift correction; the drift fit runs on this.
    pub volume_raw: Vec<f64>,
    pub inspiration: Vec<bool>,
    /// Inspiration starts seen since the monitor started.
    pub breaths: u64,
    /// Records computed since the previous snapshot, oldest first.
    pub parameters: Vec<BreathParameters>,
    /// Latest available record.
    pub latest: Option<BreathParameters>,
}

impl BufferSnapshot {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Time of the newest sample.
    pub fn t_end(&self) -> Option<f64> {
        self.time.last().copied()
    }
}
