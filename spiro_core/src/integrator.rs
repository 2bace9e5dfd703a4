//! Flow-to-volume integration with flat-signal and apnea zeroing.

use crate::config::IntegratorCfg;
use crate::drift::DriftModel;
use crate::types::Phase;

/// One integrated volume value, before and after drift correction (L).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VolumeSample {
    pub raw: f64,
    pub corrected: f64,
}

impl VolumeSample {
    pub const ZERO: Self = Self {
        raw: 0.0,
        corrected: 0.0,
    };
}

#[derive(Debug, Clone)]
pub struct VolumeIntegrator {
    cfg: IntegratorCfg,
    /// L per (L/min) per sample: 1 / (hz * 60).
    step_scale: f64,
    accumulated: f64,
    drift: DriftModel,
    /// Last inspiration start, or the first sample seen before any breath.
    anchor_t: Option<f64>,
    in_apnea: bool,
}

impl VolumeIntegrator {
    pub fn new(cfg: IntegratorCfg, sample_rate_hz: u32) -> Self {
        Self {
            cfg,
            step_scale: 1.0 / (f64::from(sample_rate_hz.max(1)) * 60.0),
            accumulated: 0.0,
            drift: DriftModel::Identity,
            anchor_t: None,
            in_apnea: false,
        }
    }

    /// Integrate one flow sample (L/min) taken at `t`.
    ///
    /// `dflow` is the segmenter's smoothed derivative for the same tick.
    pub fn update(&mut self, t: f64, flow: f64, dflow: f64, phase: Phase) -> VolumeSample {
        let anchor = *self.anchor_t.get_or_insert(t);
        let apnea = t - anchor > self.cfg.apnea_timeout_s;
        if apnea != self.in_apnea {
            self.in_apnea = apnea;
            if apnea {
                tracing::warn!(
                    t,
                    since_s = t - anchor,
                    "no inspiration start within apnea timeout; volume held at zero"
                );
            }
        }

        let flat = dflow.abs() < self.cfg.noise_dfdt
            && flow.abs() < self.cfg.noise_flow
            && phase != Phase::Inhaling;

        if apnea || flat {
            self.accumulated = 0.0;
            return VolumeSample::ZERO;
        }

        self.accumulated += flow * self.step_scale;
        VolumeSample {
            raw: self.accumulated,
            corrected: self.accumulated - self.drift.offset_at(t),
        }
    }

    /// Reset at an inspiration start.
    pub fn on_breath_start(&mut self, t: f64) {
        self.accumulated = 0.0;
        self.anchor_t = Some(t);
        self.in_apnea = false;
    }

    /// Install a new drift model; takes effect on the next `update`.
    pub fn set_drift(&mut self, model: DriftModel) {
        self.drift = model;
    }

    pub fn drift(&self) -> &DriftModel {
        &self.drift
    }

    #[inline]
    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }

    #[inline]
    pub fn in_apnea(&self) -> bool {
        self.in_apnea
    }

    pub fn reset(&mut self) {
        self.accumulated = 0.0;
        self.anchor_t = None;
        self.in_apnea = false;
        self.drift = DriftModel::Identity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_signal_zeroes_outside_inspiration() {
        let mut v = VolumeIntegrator::new(IntegratorCfg::default(), 100);
        v.on_breath_start(0.0);
        v.update(0.01, 30.0, 0.0, Phase::Inhaling);
        assert!(v.accumulated() > 0.0);
        let out = v.update(0.02, 1.0, 0.0, Phase::Exhaling);
        assert_eq!(out, VolumeSample::ZERO);
        assert_eq!(v.accumulated(), 0.0);
    }

    #[test]
    fn flat_signal_keeps_integrating_while_inhaling() {
        let mut v = VolumeIntegrator::new(IntegratorCfg::default(), 100);
        v.on_breath_start(0.0);
        let out = v.update(0.01, 1.0, 0.0, Phase::Inhaling);
        assert!(out.raw > 0.0);
    }

    #[test]
    fn drift_offset_is_subtracted() {
        let mut v = VolumeIntegrator::new(IntegratorCfg::default(), 100);
        v.on_breath_start(0.0);
        v.set_drift(DriftModel::Linear {
            t0: 0.0,
            slope: 0.0,
            intercept: 0.25,
            baseline: 0.0,
        });
        let out = v.update(0.01, 60.0, 0.0, Phase::Inhaling);
        assert!((out.raw - 0.01).abs() < 1e-12);
        assert!((out.corrected - (0.01 - 0.25)).abs() < 1e-12);
    }
}
