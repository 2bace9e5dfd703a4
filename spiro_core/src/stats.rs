//! Rolling statistics over recent breath parameters.

use crate::params::BreathParameters;
use crate::ring::RingBuffer;
use crate::types::Measure;

/// Summary of the values currently held by a [`RollingStats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatSummary {
    pub n: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation over sqrt(n).
    pub stderr: f64,
    /// 100 * stderr / |mean|; `None` when the mean is zero.
    pub pct_err: Option<f64>,
}

/// Last `len` finite values of one quantity.
#[derive(Debug, Clone)]
pub struct RollingStats {
    values: RingBuffer<f64>,
}

impl RollingStats {
    pub fn new(len: usize) -> Self {
        Self {
            values: RingBuffer::new(len),
        }
    }

    /// Record a value; non-finite input is ignored.
    pub fn push(&mut self, x: f64) {
        if x.is_finite() {
            self.values.push(x);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn summary(&self) -> Option<StatSummary> {
        if self.values.is_empty() {
            return None;
        }
        let n = self.values.len();
        let nf = n as f64;
        let (mut sum, mut min, mut max) = (0.0f64, f64::INFINITY, f64::NEG_INFINITY);
        for &v in self.values.iter() {
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        let mean = sum / nf;
        let var = self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / nf;
        let stderr = var.sqrt() / nf.sqrt();
        let pct_err = (mean != 0.0).then(|| 100.0 * stderr / mean.abs());
        Some(StatSummary {
            n,
            mean,
            min,
            max,
            stderr,
            pct_err,
        })
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// The per-breath quantities tracked by [`ParameterStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parameter {
    Vt,
    Rr,
    Ie,
    Pip,
    Peep,
    Pp,
    Compliance,
    MveInferred,
    MveMeasured,
}

impl Parameter {
    pub const ALL: [Self; 9] = [
        Self::Vt,
        Self::Rr,
        Self::Ie,
        Self::Pip,
        Self::Peep,
        Self::Pp,
        Self::Compliance,
        Self::MveInferred,
        Self::MveMeasured,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Vt => "vt",
            Self::Rr => "rr",
            Self::Ie => "ie",
            Self::Pip => "pip",
            Self::Peep => "peep",
            Self::Pp => "pp",
            Self::Compliance => "compliance",
            Self::MveInferred => "mve_inferred",
            Self::MveMeasured => "mve_measured",
        }
    }

    pub fn pick(self, p: &BreathParameters) -> Measure {
        match self {
            Self::Vt => p.vt,
            Self::Rr => p.rr,
            Self::Ie => p.ie,
            Self::Pip => p.pip,
            Self::Peep => p.peep,
            Self::Pp => p.pp,
            Self::Compliance => p.compliance,
            Self::MveInferred => p.mve_inferred,
            Self::MveMeasured => p.mve_measured,
        }
    }
}

/// One [`RollingStats`] per [`Parameter`], fed by the slow cadence.
#[derive(Debug, Clone)]
pub struct ParameterStats {
    series: Vec<(Parameter, RollingStats)>,
}

impl ParameterStats {
    pub fn new(len: usize) -> Self {
        Self {
            series: Parameter::ALL
                .iter()
                .map(|&p| (p, RollingStats::new(len)))
                .collect(),
        }
    }

    /// Fold one record in; fields without a value are skipped.
    pub fn record(&mut self, params: &BreathParameters) {
        for (which, stats) in &mut self.series {
            if let Some(v) = which.pick(params).value() {
                stats.push(v);
            }
        }
    }

    pub fn summary(&self, which: Parameter) -> Option<StatSummary> {
        self.series
            .iter()
            .find(|(p, _)| *p == which)
            .and_then(|(_, s)| s.summary())
    }

    /// Summaries of every parameter that has at least one value.
    pub fn summaries(&self) -> Vec<(Parameter, StatSummary)> {
        self.series
            .iter()
            .filter_map(|(p, s)| s.summary().map(|sum| (*p, sum)))
            .collect()
    }

    pub fn reset(&mut self) {
        for (_, s) in &mut self.series {
            s.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_known_values() {
        let mut s = RollingStats::new(4);
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            s.push(v);
        }
        // Keeps 5, 5, 7, 9.
        let sum = s.summary().unwrap();
        assert_eq!(sum.n, 4);
        assert!((sum.mean - 6.5).abs() < 1e-12);
        assert_eq!(sum.min, 5.0);
        assert_eq!(sum.max, 9.0);
        let std = (2.75f64).sqrt();
        assert!((sum.stderr - std / 2.0).abs() < 1e-12);
        assert!((sum.pct_err.unwrap() - 100.0 * (std / 2.0) / 6.5).abs() < 1e-9);
    }

    #[test]
    fn non_finite_values_are_skipped() {
        let mut s = RollingStats::new(3);
        s.push(f64::NAN);
        s.push(f64::INFINITY);
        assert!(s.summary().is_none());
    }
}
