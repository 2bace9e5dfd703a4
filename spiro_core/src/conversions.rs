//! `From` implementations bridging `spiro_config` types to `spiro_core` types.

use crate::config::{
    BufferCfg, DriftCfg, DriftStrategy, IntegratorCfg, ParamsCfg, PeakCfg, SamplingCfg,
    SegmenterCfg,
};
use crate::runner::RunParams;
use std::time::Duration;

// ── SamplingCfg ──────────────────────────────────────────────────────────────

impl From<&spiro_config::SensorCfg> for SamplingCfg {
    fn from(c: &spiro_config::SensorCfg) -> Self {
        Self {
            sample_rate_hz: c.sample_rate_hz,
            read_timeout_ms: c.read_timeout_ms,
            zero_samples: c.zero_samples,
            median_window: c.median_window,
        }
    }
}

// ── BufferCfg ────────────────────────────────────────────────────────────────

impl From<&spiro_config::BufferCfg> for BufferCfg {
    fn from(c: &spiro_config::BufferCfg) -> Self {
        Self {
            history_s: c.history_s,
        }
    }
}

// ── SegmenterCfg ─────────────────────────────────────────────────────────────

impl From<&spiro_config::SegmenterCfg> for SegmenterCfg {
    fn from(c: &spiro_config::SegmenterCfg) -> Self {
        Self {
            derivative_window: c.derivative_window,
            inhale_dfdt: c.inhale_dfdt,
            inhale_flow: c.inhale_flow,
            inhale_refractory_s: c.inhale_refractory_s,
            exhale_dfdt: c.exhale_dfdt,
            exhale_flow: c.exhale_flow,
            exhale_refractory_s: c.exhale_refractory_s,
        }
    }
}

// ── IntegratorCfg ────────────────────────────────────────────────────────────

impl From<&spiro_config::IntegratorCfg> for IntegratorCfg {
    fn from(c: &spiro_config::IntegratorCfg) -> Self {
        Self {
            noise_dfdt: c.noise_dfdt,
            noise_flow: c.noise_flow,
            apnea_timeout_s: c.apnea_timeout_s,
        }
    }
}

// ── DriftCfg ─────────────────────────────────────────────────────────────────

impl From<spiro_config::DriftStrategy> for DriftStrategy {
    fn from(s: spiro_config::DriftStrategy) -> Self {
        match s {
            spiro_config::DriftStrategy::Disabled => Self::Disabled,
            spiro_config::DriftStrategy::Linear => Self::Linear,
            spiro_config::DriftStrategy::Spline => Self::Spline,
        }
    }
}

impl From<&spiro_config::PeakCfg> for PeakCfg {
    fn from(c: &spiro_config::PeakCfg) -> Self {
        Self {
            min_height: c.min_height,
            min_distance_s: c.min_distance_s,
            min_prominence: c.min_prominence,
            min_width_s: c.min_width_s,
        }
    }
}

impl From<&spiro_config::DriftCfg> for DriftCfg {
    fn from(c: &spiro_config::DriftCfg) -> Self {
        Self {
            strategy: c.strategy.into(),
            window_s: c.window_s,
            max_slope_l_per_s: c.max_slope_l_per_s,
            peaks: (&c.peaks).into(),
        }
    }
}

// ── ParamsCfg ────────────────────────────────────────────────────────────────

impl From<&spiro_config::ParametersCfg> for ParamsCfg {
    fn from(c: &spiro_config::ParametersCfg) -> Self {
        Self {
            peep_window_s: c.peep_window_s,
            plateau_window_s: c.plateau_window_s,
            mve_window_s: c.mve_window_s,
            min_denominator: c.min_denominator,
            min_driving_pressure_cmh2o: c.min_driving_pressure_cmh2o,
        }
    }
}

// ── RunParams ────────────────────────────────────────────────────────────────

impl From<&spiro_config::Config> for RunParams {
    fn from(c: &spiro_config::Config) -> Self {
        Self {
            sample_rate_hz: c.sensor.sample_rate_hz,
            read_timeout: Duration::from_millis(c.sensor.read_timeout_ms),
            slow_period: Duration::from_millis(c.cadence.slow_period_ms),
            event_capacity: c.cadence.event_capacity,
            stats_len: c.parameters.stats_len,
            drift: (&c.drift).into(),
        }
    }
}
