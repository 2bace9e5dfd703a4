//! Differential pressure to signed flow.

use crate::calibration::{CalibrationPolynomial, CalibrationStore};
use crate::error::CalibrationError;
use crate::ring::RingBuffer;
use std::sync::Arc;

/// `flow = sign(dp) * P(|dp|)` with the active mouthpiece polynomial.
#[derive(Debug, Clone)]
pub struct FlowModel {
    store: Arc<CalibrationStore>,
    active: Arc<CalibrationPolynomial>,
    mouthpiece: String,
}

impl FlowModel {
    pub fn new(store: Arc<CalibrationStore>, mouthpiece: &str) -> Result<Self, CalibrationError> {
        let active = store.get(mouthpiece)?;
        Ok(Self {
            store,
            active,
            mouthpiece: mouthpiece.to_ascii_lowercase(),
        })
    }

    /// Antisymmetric by construction; `apply(0.0) == 0.0`.
    #[inline]
    pub fn apply(&self, dp: f64) -> f64 {
        // f64::signum(0.0) is 1.0, so zero needs its own arm.
        if dp == 0.0 {
            return 0.0;
        }
        dp.signum() * self.active.eval(dp.abs())
    }

    /// Swap the whole polynomial; on error the previous one stays active.
    pub fn set_mouthpiece(&mut self, mouthpiece: &str) -> Result<(), CalibrationError> {
        let next = self.store.get(mouthpiece)?;
        self.active = next;
        self.mouthpiece = mouthpiece.to_ascii_lowercase();
        tracing::debug!(mouthpiece = %self.mouthpiece, "flow calibration switched");
        Ok(())
    }

    #[inline]
    pub fn mouthpiece(&self) -> &str {
        &self.mouthpiece
    }

    #[inline]
    pub fn polynomial(&self) -> &CalibrationPolynomial {
        &self.active
    }

    pub fn store(&self) -> &Arc<CalibrationStore> {
        &self.store
    }
}

/// Sliding median over the last `window` dp samples (1 passes through).
#[derive(Debug, Clone)]
pub struct MedianPrefilter {
    window: usize,
    history: RingBuffer<f64>,
    scratch: Vec<f64>,
}

impl MedianPrefilter {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            history: RingBuffer::new(window),
            scratch: Vec::with_capacity(window),
        }
    }

    pub fn apply(&mut self, x: f64) -> f64 {
        if self.window == 1 {
            return x;
        }
        self.history.push(x);
        self.scratch.clear();
        self.scratch.extend(self.history.iter().copied());
        self.scratch.sort_by(f64::total_cmp);
        let n = self.scratch.len();
        let mid = n / 2;
        if n % 2 == 1 {
            self.scratch[mid]
        } else {
            0.5 * (self.scratch[mid - 1] + self.scratch[mid])
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
