//! Drift models for the integrated volume.
//!
//! The slow cadence fits a model on the buffered raw volume; the fast cadence
//! subtracts `offset_at(t)` from every new raw sample until the next fit
//! arrives.

use crate::config::{DriftCfg, DriftStrategy};
use crate::peaks::{PeakParams, volume_minima};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DriftModel {
    /// No correction.
    #[default]
    Identity,
    /// `slope * (t - t0) + intercept + baseline`.
    Linear {
        t0: f64,
        slope: f64,
        intercept: f64,
        baseline: f64,
    },
    /// Piecewise-linear through `(t, raw)` knots at volume minima, extrapolated
    /// linearly past both ends.
    Pinned { knots: Vec<(f64, f64)> },
}

impl DriftModel {
    /// Volume to subtract from the raw value at time `t`.
    pub fn offset_at(&self, t: f64) -> f64 {
        match self {
            Self::Identity => 0.0,
            Self::Linear {
                t0,
                slope,
                intercept,
                baseline,
            } => slope.mul_add(t - t0, *intercept) + baseline,
            Self::Pinned { knots } => interp_extrapolate(knots, t),
        }
    }

    pub fn correct(&self, t: &[f64], raw: &[f64]) -> Vec<f64> {
        t.iter()
            .zip(raw)
            .map(|(&t, &v)| v - self.offset_at(t))
            .collect()
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Linear { .. } => "linear",
            Self::Pinned { .. } => "spline",
        }
    }
}

/// Ordinary least squares `y = slope * (x - x0) + intercept`, x0 = x[0].
///
/// Returns `(x0, slope, intercept)`; `None` for fewer than two points or no
/// spread in x.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<(f64, f64, f64)> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let x0 = x[0];
    let nf = n as f64;
    let mean_x = x[..n].iter().map(|v| v - x0).sum::<f64>() / nf;
    let mean_y = y[..n].iter().sum::<f64>() / nf;
    let mut sxx = 0.0f64;
    let mut sxy = 0.0f64;
    for (xi, yi) in x[..n].iter().zip(&y[..n]) {
        let dx = xi - x0 - mean_x;
        sxx += dx * dx;
        sxy += dx * (yi - mean_y);
    }
    if !sxx.is_finite() || sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    if !slope.is_finite() {
        return None;
    }
    Some((x0, slope, mean_y - slope * mean_x))
}

/// Remove the least-squares line; returns the input unchanged if no line fits.
pub fn detrend(t: &[f64], v: &[f64]) -> Vec<f64> {
    match linear_fit(t, v) {
        Some((t0, slope, intercept)) => t
            .iter()
            .zip(v)
            .map(|(&t, &v)| v - slope.mul_add(t - t0, intercept))
            .collect(),
        None => v.to_vec(),
    }
}

/// Linear trend with `|slope| <= max_slope`; baseline lifts the lowest point
/// of the corrected trace to zero.
pub fn fit_linear(t: &[f64], raw: &[f64], max_slope: f64) -> Option<DriftModel> {
    let (t0, slope, _) = linear_fit(t, raw)?;
    let slope = slope.clamp(-max_slope, max_slope);
    // Re-centre the intercept for the clamped slope.
    let n = t.len().min(raw.len()) as f64;
    let intercept = t
        .iter()
        .zip(raw)
        .map(|(&t, &v)| v - slope * (t - t0))
        .sum::<f64>()
        / n;
    let baseline = t
        .iter()
        .zip(raw)
        .map(|(&t, &v)| v - slope.mul_add(t - t0, intercept))
        .fold(f64::INFINITY, f64::min);
    if !baseline.is_finite() {
        return None;
    }
    Some(DriftModel::Linear {
        t0,
        slope,
        intercept,
        baseline,
    })
}

/// Pin the raw trace to zero at every detected volume minimum.
pub fn fit_pinned(t: &[f64], raw: &[f64], params: &PeakParams) -> Option<DriftModel> {
    let minima = volume_minima(&detrend(t, raw), params);
    if minima.len() < 2 {
        return None;
    }
    let knots = minima
        .into_iter()
        .filter_map(|i| Some((*t.get(i)?, *raw.get(i)?)))
        .collect();
    Some(DriftModel::Pinned { knots })
}

fn interp_extrapolate(knots: &[(f64, f64)], t: f64) -> f64 {
    match knots {
        [] => 0.0,
        [(_, v)] => *v,
        _ => {
            // First segment whose right knot is at or past t; clamp to the ends
            // so the outer segments extrapolate.
            let idx = knots.partition_point(|&(kt, _)| kt < t).clamp(1, knots.len() - 1);
            let (t_a, v_a) = knots[idx - 1];
            let (t_b, v_b) = knots[idx];
            let span = t_b - t_a;
            if span <= 0.0 {
                return v_b;
            }
            v_a + (v_b - v_a) * (t - t_a) / span
        }
    }
}

/// Fits drift models on the trailing window of a raw-volume snapshot.
#[derive(Debug, Clone)]
pub struct DriftEstimator {
    cfg: DriftCfg,
    peaks: PeakParams,
}

impl DriftEstimator {
    pub fn new(cfg: DriftCfg, sample_rate_hz: u32) -> Self {
        let peaks = PeakParams::from_cfg(&cfg.peaks, f64::from(sample_rate_hz.max(1)));
        Self { cfg, peaks }
    }

    pub fn strategy(&self) -> DriftStrategy {
        self.cfg.strategy
    }

    /// `None` means keep the model currently in use.
    pub fn estimate(&self, t: &[f64], raw: &[f64]) -> Option<DriftModel> {
        if self.cfg.strategy == DriftStrategy::Disabled {
            return Some(DriftModel::Identity);
        }
        let n = t.len().min(raw.len());
        let t_end = *t[..n].last()?;
        let start = t[..n].partition_point(|&ti| ti < t_end - self.cfg.window_s);
        let (t, raw) = (&t[start..n], &raw[start..n]);

        let model = match self.cfg.strategy {
            DriftStrategy::Linear => fit_linear(t, raw, self.cfg.max_slope_l_per_s),
            DriftStrategy::Spline => fit_pinned(t, raw, &self.peaks),
            DriftStrategy::Disabled => Some(DriftModel::Identity),
        };
        if model.is_none() {
            tracing::debug!(
                strategy = ?self.cfg.strategy,
                samples = t.len(),
                "drift fit skipped; keeping previous model"
            );
        }
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_fit_recovers_line() {
        let t: Vec<f64> = (0..50).map(|i| 10.0 + i as f64 * 0.1).collect();
        let y: Vec<f64> = t.iter().map(|t| 0.3 * t - 1.0).collect();
        let (t0, slope, intercept) = linear_fit(&t, &y).unwrap();
        assert!((slope - 0.3).abs() < 1e-9);
        assert!((intercept - (0.3 * t0 - 1.0)).abs() < 1e-9);
    }

    #[test]
    fn slope_is_clamped() {
        let t: Vec<f64> = (0..100).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = t.iter().map(|t| 2.0 * t).collect();
        match fit_linear(&t, &y, 0.5).unwrap() {
            DriftModel::Linear { slope, .. } => assert!((slope - 0.5).abs() < 1e-12),
            other => panic!("unexpected model {other:?}"),
        }
    }

    #[test]
    fn pinned_interpolates_and_extrapolates() {
        let m = DriftModel::Pinned {
            knots: vec![(0.0, 0.0), (2.0, 1.0), (4.0, 1.0)],
        };
        assert!((m.offset_at(1.0) - 0.5).abs() < 1e-12);
        assert!((m.offset_at(3.0) - 1.0).abs() < 1e-12);
        assert!((m.offset_at(-2.0) + 1.0).abs() < 1e-12);
        assert!((m.offset_at(6.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn too_few_points_keep_previous_model() {
        let est = DriftEstimator::new(DriftCfg::default(), 100);
        assert!(est.estimate(&[1.0], &[0.5]).is_none());
        assert!(est.estimate(&[], &[]).is_none());
    }
}
