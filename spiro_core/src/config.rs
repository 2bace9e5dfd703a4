//! Configuration types for the monitor pipeline.
//!
//! These are the runtime structs consumed by the pipeline stages. They are
//! separate from the TOML-deserialized config in `spiro_config`.

/// Sensor sampling and sample construction.
#[derive(Debug, Clone)]
pub struct SamplingCfg {
    /// Fast-cadence rate; also the nominal integration step.
    pub sample_rate_hz: u32,
    /// Per-read sensor timeout.
    pub read_timeout_ms: u64,
    /// Zero-flow readings averaged at startup (0 disables zeroing).
    pub zero_samples: usize,
    /// Median prefilter window on dp (1 = disabled).
    pub median_window: usize,
}

impl Default for SamplingCfg {
    fn default() -> Self {
        Self {
            sample_rate_hz: 100,
            read_timeout_ms: 20,
            zero_samples: 100,
            median_window: 1,
        }
    }
}

impl SamplingCfg {
    #[inline]
    pub fn dt_s(&self) -> f64 {
        1.0 / f64::from(self.sample_rate_hz.max(1))
    }
}

/// History depth of the streamed channels.
#[derive(Debug, Clone)]
pub struct BufferCfg {
    pub history_s: f64,
}

impl Default for BufferCfg {
    fn default() -> Self {
        Self { history_s: 60.0 }
    }
}

impl BufferCfg {
    /// Ring capacity in samples for the given rate (at least 1).
    pub fn capacity(&self, sample_rate_hz: u32) -> usize {
        let n = (self.history_s * f64::from(sample_rate_hz)).ceil();
        if n.is_finite() && n >= 1.0 {
            n as usize
        } else {
            1
        }
    }
}

/// Breath segmentation thresholds. Flow in L/min, derivative in (L/min)/s.
#[derive(Debug, Clone)]
pub struct SegmenterCfg {
    /// Samples spanned by the smoothed derivative.
    pub derivative_window: usize,
    pub inhale_dfdt: f64,
    pub inhale_flow: f64,
    pub inhale_refractory_s: f64,
    pub exhale_dfdt: f64,
    pub exhale_flow: f64,
    pub exhale_refractory_s: f64,
}

impl Default for SegmenterCfg {
    fn default() -> Self {
        Self {
            derivative_window: 8,
            inhale_dfdt: 15.0,
            inhale_flow: 5.0,
            inhale_refractory_s: 0.75,
            exhale_dfdt: -15.0,
            exhale_flow: -5.0,
            exhale_refractory_s: 0.5,
        }
    }
}

/// Flat-signal and apnea handling of the volume integrator.
#[derive(Debug, Clone)]
pub struct IntegratorCfg {
    pub noise_dfdt: f64,
    pub noise_flow: f64,
    pub apnea_timeout_s: f64,
}

impl Default for IntegratorCfg {
    fn default() -> Self {
        Self {
            noise_dfdt: 5.0,
            noise_flow: 2.0,
            apnea_timeout_s: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriftStrategy {
    Disabled,
    /// Least-squares trend with clamped slope.
    #[default]
    Linear,
    /// Piecewise-linear interpolant pinned through volume minima.
    Spline,
}

/// Coarse peak-finder thresholds in physical units.
#[derive(Debug, Clone)]
pub struct PeakCfg {
    pub min_height: Option<f64>,
    pub min_distance_s: f64,
    pub min_prominence: Option<f64>,
    pub min_width_s: Option<f64>,
}

impl Default for PeakCfg {
    fn default() -> Self {
        Self {
            min_height: Some(0.05),
            min_distance_s: 1.5,
            min_prominence: Some(0.05),
            min_width_s: Some(0.3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriftCfg {
    pub strategy: DriftStrategy,
    pub window_s: f64,
    pub max_slope_l_per_s: f64,
    pub peaks: PeakCfg,
}

impl Default for DriftCfg {
    fn default() -> Self {
        Self {
            strategy: DriftStrategy::Linear,
            window_s: 20.0,
            max_slope_l_per_s: 0.05,
            peaks: PeakCfg::default(),
        }
    }
}

/// Per-breath parameter extraction.
#[derive(Debug, Clone)]
pub struct ParamsCfg {
    pub peep_window_s: f64,
    pub plateau_window_s: f64,
    pub mve_window_s: f64,
    /// I:E is indeterminate when |tei - tsi| is below this (s).
    pub min_denominator: f64,
    /// Compliance is indeterminate when |pp - peep| is below this (cmH2O).
    pub min_driving_pressure_cmh2o: f64,
}

impl Default for ParamsCfg {
    fn default() -> Self {
        Self {
            peep_window_s: 0.05,
            plateau_window_s: 0.05,
            mve_window_s: 60.0,
            min_denominator: 1e-3,
            min_driving_pressure_cmh2o: 0.5,
        }
    }
}
