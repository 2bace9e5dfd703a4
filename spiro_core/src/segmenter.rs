//! Breath segmentation on the flow stream.
//!
//! Two phases, starting in `Exhaling`. Inspiration start needs a steep rising
//! derivative, positive flow past a magnitude floor, and the inhale
//! refractory period elapsed since the previous start. The end-of-inspiration
//! marker mirrors that with negative thresholds and its own refractory period;
//! it only marks `tei` and never closes a breath.
//!
//! The inhale condition is checked in either phase. A missed exhale marker
//! therefore cannot wedge the detector in `Inhaling`; the refractory period
//! is what prevents double triggering.
//!
//! The detector assumes the subject starts at rest: the first sample is
//! preceded by an implicit zero-flow sample one period earlier, so a stream
//! that opens mid-inspiration still fires an inspiration start.

use crate::config::SegmenterCfg;
use crate::peaks::{PeakParams, volume_minima};
use crate::ring::RingBuffer;
use crate::types::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEvent {
    /// Inspiration start; closes the current breath window.
    InhaleStart,
    /// End of inspiration; marks `tei` in the current window.
    ExhaleMarker,
}

#[derive(Debug, Clone)]
pub struct BreathSegmenter {
    cfg: SegmenterCfg,
    phase: Phase,
    /// (t, flow) pairs spanning the derivative window.
    history: RingBuffer<(f64, f64)>,
    /// Nominal sample period, used to place the implicit rest sample.
    period_s: f64,
    derivative: f64,
    last_inhale_t: Option<f64>,
    last_exhale_t: Option<f64>,
    inhale_count: u64,
}

impl BreathSegmenter {
    pub fn new(cfg: SegmenterCfg, period_s: f64) -> Self {
        // N differences need N + 1 samples.
        let history = RingBuffer::new(cfg.derivative_window.max(1) + 1);
        Self {
            cfg,
            phase: Phase::Exhaling,
            history,
            period_s,
            derivative: 0.0,
            last_inhale_t: None,
            last_exhale_t: None,
            inhale_count: 0,
        }
    }

    /// Feed one sample; returns the transition it caused, if any.
    pub fn update(&mut self, t: f64, flow: f64) -> Option<SegmentEvent> {
        if self.history.is_empty() && self.period_s > 0.0 {
            self.history.push((t - self.period_s, 0.0));
        }
        self.history.push((t, flow));
        self.derivative = self.smoothed_derivative();
        let d = self.derivative;

        if d > self.cfg.inhale_dfdt
            && flow > self.cfg.inhale_flow
            && refractory_elapsed(self.last_inhale_t, t, self.cfg.inhale_refractory_s)
        {
            self.phase = Phase::Inhaling;
            self.last_inhale_t = Some(t);
            self.inhale_count += 1;
            tracing::trace!(t, flow, dfdt = d, "inspiration start");
            return Some(SegmentEvent::InhaleStart);
        }

        if self.phase == Phase::Inhaling
            && d < self.cfg.exhale_dfdt
            && flow < self.cfg.exhale_flow
            && refractory_elapsed(self.last_exhale_t, t, self.cfg.exhale_refractory_s)
        {
            self.phase = Phase::Exhaling;
            self.last_exhale_t = Some(t);
            tracing::trace!(t, flow, dfdt = d, "end of inspiration");
            return Some(SegmentEvent::ExhaleMarker);
        }

        None
    }

    /// Mean per-second change of flow across the history window.
    fn smoothed_derivative(&self) -> f64 {
        let (Some(&(t0, f0)), Some(&(t1, f1))) = (self.history.oldest(), self.history.latest())
        else {
            return 0.0;
        };
        let dt = t1 - t0;
        if self.history.len() < 2 || dt <= 0.0 {
            return 0.0;
        }
        (f1 - f0) / dt
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Latest smoothed derivative, (L/min)/s.
    #[inline]
    pub fn derivative(&self) -> f64 {
        self.derivative
    }

    #[inline]
    pub fn inhale_count(&self) -> u64 {
        self.inhale_count
    }

    #[inline]
    pub fn last_inhale_t(&self) -> Option<f64> {
        self.last_inhale_t
    }

    pub fn cfg(&self) -> &SegmenterCfg {
        &self.cfg
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Exhaling;
        self.history.clear();
        self.derivative = 0.0;
        self.last_inhale_t = None;
        self.last_exhale_t = None;
        self.inhale_count = 0;
    }

    /// Coarse, non-causal detector: indices of end-of-exhalation minima in a
    /// buffered volume trace.
    pub fn coarse_minima(volume: &[f64], params: &PeakParams) -> Vec<usize> {
        volume_minima(volume, params)
    }
}

#[inline]
fn refractory_elapsed(last: Option<f64>, t: f64, period_s: f64) -> bool {
    last.is_none_or(|prev| t - prev > period_s)
}
