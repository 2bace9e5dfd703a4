//! Value types shared across the pipeline.

/// One processed sensor read. Built once per tick and never mutated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Seconds since the monitor epoch.
    pub t: f64,
    pub p1: f64,
    pub p2: f64,
    /// Differential pressure after zero-offset removal and prefiltering, cmH2O.
    pub dp: f64,
    /// Signed flow, L/min (positive is inspiratory).
    pub flow: f64,
}

impl Sample {
    /// Airway pressure channel.
    #[inline]
    pub fn pressure(&self) -> f64 {
        self.p1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Exhaling,
    Inhaling,
}

/// A derived quantity that may be missing.
///
/// `NoData` and `Indeterminate` are kept apart so a display can tell "not
/// enough breaths yet" from "this breath produced an undefined ratio".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measure {
    Value(f64),
    /// Not enough data to compute (e.g. fewer than two breath boundaries).
    NoData,
    /// Near-zero denominator or non-finite input.
    Indeterminate,
}

impl Measure {
    /// Wrap a computed number; non-finite results become `Indeterminate`.
    #[inline]
    pub fn from_f64(x: f64) -> Self {
        if x.is_finite() {
            Self::Value(x)
        } else {
            Self::Indeterminate
        }
    }

    /// `num / den`, or `Indeterminate` when `|den| < eps`.
    #[inline]
    pub fn ratio(num: f64, den: f64, eps: f64) -> Self {
        if !den.is_finite() || den.abs() < eps {
            return Self::Indeterminate;
        }
        Self::from_f64(num / den)
    }

    #[inline]
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(v),
            Self::NoData | Self::Indeterminate => None,
        }
    }

    #[inline]
    pub fn is_value(self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Combine two measures; `NoData` dominates `Indeterminate`.
    pub fn zip_with(self, other: Self, f: impl FnOnce(f64, f64) -> Self) -> Self {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => f(a, b),
            (Self::NoData, _) | (_, Self::NoData) => Self::NoData,
            _ => Self::Indeterminate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_guards_small_denominators() {
        assert_eq!(Measure::ratio(1.0, 0.0, 1e-6), Measure::Indeterminate);
        assert_eq!(Measure::ratio(1.0, f64::NAN, 1e-6), Measure::Indeterminate);
        assert_eq!(Measure::ratio(3.0, 2.0, 1e-6), Measure::Value(1.5));
    }

    #[test]
    fn zip_prefers_no_data() {
        let nd = Measure::NoData;
        let ind = Measure::Indeterminate;
        assert_eq!(nd.zip_with(ind, |a, b| Measure::Value(a + b)), Measure::NoData);
        assert_eq!(
            ind.zip_with(Measure::Value(1.0), |a, b| Measure::Value(a + b)),
            Measure::Indeterminate
        );
    }
}
