//! Per-breath parameter extraction.
//!
//! Every field is a [`Measure`]: one indeterminate ratio never invalidates
//! the rest of the record, and nothing here can fail.

use crate::config::ParamsCfg;
use crate::types::Measure;
use crate::window::BreathWindow;

/// Parameters of one closed breath. Units: s, L, breaths/min, cmH2O, L/cmH2O, L/min.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreathParameters {
    pub tsi: Measure,
    pub tei: Measure,
    pub tee: Measure,
    /// Time of the volume maximum.
    pub tie: Measure,
    pub vt: Measure,
    pub rr: Measure,
    pub ie: Measure,
    pub pip: Measure,
    pub peep: Measure,
    pub pp: Measure,
    pub compliance: Measure,
    pub mve_inferred: Measure,
    pub mve_measured: Measure,
}

impl BreathParameters {
    /// The record reported while fewer than two breath boundaries exist.
    pub const fn unavailable() -> Self {
        Self {
            tsi: Measure::NoData,
            tei: Measure::NoData,
            tee: Measure::NoData,
            tie: Measure::NoData,
            vt: Measure::NoData,
            rr: Measure::NoData,
            ie: Measure::NoData,
            pip: Measure::NoData,
            peep: Measure::NoData,
            pp: Measure::NoData,
            compliance: Measure::NoData,
            mve_inferred: Measure::NoData,
            mve_measured: Measure::NoData,
        }
    }

    /// Good enough to replace the last displayed record.
    #[inline]
    pub fn is_available(&self) -> bool {
        self.vt.is_value() && self.rr.is_value()
    }
}

impl Default for BreathParameters {
    fn default() -> Self {
        Self::unavailable()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BreathParameterCalculator {
    cfg: ParamsCfg,
}

impl BreathParameterCalculator {
    pub fn new(cfg: ParamsCfg) -> Self {
        Self { cfg }
    }

    pub fn cfg(&self) -> &ParamsCfg {
        &self.cfg
    }

    /// Compute the record for a closed `window`.
    ///
    /// `boundaries_seen` counts every inspiration start so far, including the
    /// one that closed `window`. `flow_history` is the buffered `(t, flow)`
    /// channel in time order; only its trailing `mve_window_s` is used.
    pub fn compute<I>(
        &self,
        window: &BreathWindow,
        boundaries_seen: u64,
        flow_history: I,
    ) -> BreathParameters
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let Some(tee) = window.tee() else {
            return BreathParameters::unavailable();
        };
        if boundaries_seen < 2 || window.is_empty() {
            return BreathParameters::unavailable();
        }
        let eps = self.cfg.min_denominator;
        let tsi = window.tsi();
        let time = window.time();

        let (vt, tie) = match argmax(window.volume()) {
            Some((i, v)) => (Measure::from_f64(v), Measure::from_f64(time[i])),
            None => (Measure::Indeterminate, Measure::Indeterminate),
        };
        let pip = argmax(window.pressure()).map_or(Measure::Indeterminate, |(_, p)| {
            Measure::from_f64(p)
        });

        let tei = match window.tei() {
            Some(t) => Measure::Value(t),
            None => tie,
        };

        let rr = Measure::ratio(60.0, tee - tsi, eps);
        let ie = tei.zip_with(Measure::Value(tsi), |tei, tsi| {
            Measure::ratio((tee - tei).abs(), (tei - tsi).abs(), eps)
        });
        let mve_inferred = rr.zip_with(vt, |rr, vt| Measure::from_f64(rr * vt));

        let peep = trailing_mean(time, window.pressure(), tee, self.cfg.peep_window_s)
            .or_else(|| window.pressure().last().copied())
            .map_or(Measure::Indeterminate, Measure::from_f64);
        let pp = match tei.value() {
            Some(tei) => trailing_mean(time, window.pressure(), tei, self.cfg.plateau_window_s)
                .or_else(|| last_at_or_before(time, window.pressure(), tei))
                .map_or(Measure::Indeterminate, Measure::from_f64),
            None => tei,
        };
        let min_dp = self.cfg.min_driving_pressure_cmh2o;
        let driving = pp.zip_with(peep, |pp, peep| Measure::Value(pp - peep));
        let compliance = vt.zip_with(driving, |vt, dp| Measure::ratio(vt, dp, min_dp));

        let history: Vec<(f64, f64)> = flow_history.into_iter().collect();
        let mve_measured = measured_minute_volume(&history, self.cfg.mve_window_s, eps);

        BreathParameters {
            tsi: Measure::Value(tsi),
            tei,
            tee: Measure::Value(tee),
            tie,
            vt,
            rr,
            ie,
            pip,
            peep,
            pp,
            compliance,
            mve_inferred,
            mve_measured,
        }
    }
}

/// Minute volume from the trailing `window_s` of `(t, flow)` history.
///
/// Inspiratory and expiratory legs are integrated separately with per-point
/// clamping, then averaged so a constant flow bias cancels out.
pub fn measured_minute_volume(history: &[(f64, f64)], window_s: f64, min_duration: f64) -> Measure {
    let Some(&(t_last, _)) = history.last() else {
        return Measure::NoData;
    };
    let start = history.partition_point(|&(t, _)| t < t_last - window_s);
    let tail = &history[start..];
    if tail.len() < 2 {
        return Measure::NoData;
    }

    let mut inspired = 0.0f64;
    let mut expired = 0.0f64;
    for pair in tail.windows(2) {
        let [(t0, f0), (t1, f1)] = [pair[0], pair[1]];
        let dt = t1 - t0;
        if dt <= 0.0 {
            continue;
        }
        inspired += 0.5 * (f0.max(0.0) + f1.max(0.0)) * dt;
        expired += 0.5 * (f0.min(0.0) + f1.min(0.0)) * dt;
    }
    // (L/min * s) / s = L/min
    let duration = tail[tail.len() - 1].0 - tail[0].0;
    Measure::ratio(0.5 * (inspired.abs() + expired.abs()), duration, min_duration)
}

fn argmax(values: &[f64]) -> Option<(usize, f64)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
}

/// Mean of `values` whose time falls in `[end - span, end]`.
fn trailing_mean(time: &[f64], values: &[f64], end: f64, span: f64) -> Option<f64> {
    let (sum, n) = time
        .iter()
        .zip(values)
        .filter(|&(&t, _)| t >= end - span && t <= end)
        .fold((0.0, 0u32), |(s, n), (_, &v)| (s + v, n + 1));
    (n > 0).then(|| sum / f64::from(n))
}

fn last_at_or_before(time: &[f64], values: &[f64], t: f64) -> Option<f64> {
    let idx = time.partition_point(|&ti| ti <= t);
    if idx == 0 {
        values.first().copied()
    } else {
        values.get(idx - 1).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_window() -> BreathWindow {
        // 1 s inspiration to 0.5 L, 1 s expiration back to 0; pressure 20 then 5.
        let mut w = BreathWindow::open(0.0);
        for k in 0..200 {
            let t = f64::from(k) * 0.01;
            let (f, v) = if k < 100 {
                (30.0, 0.5 * t)
            } else {
                (-30.0, 0.5 * (2.0 - t))
            };
            let p = if k <= 100 { 20.0 } else { 5.0 };
            w.push(t, p, f, v);
        }
        w.mark_end_of_inspiration(1.0);
        w.close(2.0)
    }

    #[test]
    fn fewer_than_two_boundaries_is_unavailable() {
        let calc = BreathParameterCalculator::default();
        let p = calc.compute(&closed_window(), 1, std::iter::empty());
        assert_eq!(p, BreathParameters::unavailable());
        assert!(!p.is_available());
    }

    #[test]
    fn open_window_is_unavailable() {
        let calc = BreathParameterCalculator::default();
        let w = BreathWindow::open(0.0);
        assert_eq!(calc.compute(&w, 5, std::iter::empty()), BreathParameters::unavailable());
    }

    #[test]
    fn square_breath_parameters() {
        let calc = BreathParameterCalculator::default();
        let w = closed_window();
        let hist: Vec<(f64, f64)> = w.time().iter().copied().zip(w.flow().iter().copied()).collect();
        let p = calc.compute(&w, 2, hist);
        assert!(p.is_available());
        assert!((p.rr.value().unwrap() - 30.0).abs() < 1e-9);
        assert!((p.ie.value().unwrap() - 1.0).abs() < 1e-9);
        assert!((p.pip.value().unwrap() - 20.0).abs() < 1e-12);
        assert!((p.peep.value().unwrap() - 5.0).abs() < 1e-12);
        assert!((p.pp.value().unwrap() - 20.0).abs() < 1e-12);
        let vt = p.vt.value().unwrap();
        assert!((vt - 0.5).abs() < 0.01);
        assert!((p.compliance.value().unwrap() - vt / 15.0).abs() < 1e-9);
        assert!((p.mve_inferred.value().unwrap() - 30.0 * vt).abs() < 1e-9);
    }

    #[test]
    fn constant_bias_cancels_in_measured_minute_volume() {
        let hist: Vec<(f64, f64)> = (0..=400)
            .map(|k| {
                let t = f64::from(k) * 0.01;
                let f = if (k / 100) % 2 == 0 { 30.0 } else { -30.0 };
                (t, f + 1.0)
            })
            .collect();
        let mve = measured_minute_volume(&hist, 60.0, 1e-3).value().unwrap();
        assert!((mve - 15.0).abs() < 0.5, "mve = {mve}");
    }
}
