//! Type-state builder for `Monitor`.
//!
//! `build()` only exists once a calibration has been supplied; `try_build()`
//! is available in every state and reports what is missing.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::calibration::CalibrationStore;
use crate::config::{BufferCfg, IntegratorCfg, ParamsCfg, SamplingCfg, SegmenterCfg};
use crate::error::{BuildError, Result};
use crate::flow::{FlowModel, MedianPrefilter};
use crate::integrator::VolumeIntegrator;
use crate::monitor::{ChannelBuffers, Monitor};
use crate::params::BreathParameterCalculator;
use crate::segmenter::BreathSegmenter;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct MonitorBuilder<C> {
    calibration: Option<(Arc<CalibrationStore>, String)>,
    sampling: Option<SamplingCfg>,
    buffer: Option<BufferCfg>,
    segmenter: Option<SegmenterCfg>,
    integrator: Option<IntegratorCfg>,
    params: Option<ParamsCfg>,
    zero_offset: f64,
    _c: PhantomData<C>,
}

impl Default for MonitorBuilder<Missing> {
    fn default() -> Self {
        Self {
            calibration: None,
            sampling: None,
            buffer: None,
            segmenter: None,
            integrator: None,
            params: None,
            zero_offset: 0.0,
            _c: PhantomData,
        }
    }
}

impl Monitor {
    pub fn builder() -> MonitorBuilder<Missing> {
        MonitorBuilder::default()
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(
    sampling: &SamplingCfg,
    buffer: &BufferCfg,
    segmenter: &SegmenterCfg,
    integrator: &IntegratorCfg,
    params: &ParamsCfg,
) -> Result<()> {
    // ── Sampling ─────────────────────────────────────────────────────────────
    if sampling.sample_rate_hz == 0 {
        return Err(invalid("sample_rate_hz must be > 0"));
    }
    if sampling.read_timeout_ms == 0 {
        return Err(invalid("read_timeout_ms must be >= 1"));
    }
    if buffer.history_s.is_nan() || buffer.history_s <= 0.0 {
        return Err(invalid("history_s must be > 0"));
    }
    // ── Segmenter ────────────────────────────────────────────────────────────
    if segmenter.derivative_window == 0 {
        return Err(invalid("derivative_window must be >= 1"));
    }
    if segmenter.inhale_dfdt.is_nan() || segmenter.inhale_dfdt <= 0.0 {
        return Err(invalid("inhale_dfdt must be > 0"));
    }
    if segmenter.exhale_dfdt.is_nan() || segmenter.exhale_dfdt >= 0.0 {
        return Err(invalid("exhale_dfdt must be < 0"));
    }
    if segmenter.inhale_flow.is_nan() || segmenter.inhale_flow < 0.0 {
        return Err(invalid("inhale_flow must be >= 0"));
    }
    if segmenter.exhale_flow.is_nan() || segmenter.exhale_flow > 0.0 {
        return Err(invalid("exhale_flow must be <= 0"));
    }
    if segmenter.inhale_refractory_s.is_sign_negative()
        || segmenter.exhale_refractory_s.is_sign_negative()
    {
        return Err(invalid("refractory periods must be >= 0"));
    }
    // ── Integrator ───────────────────────────────────────────────────────────
    if integrator.noise_dfdt.is_sign_negative() || integrator.noise_flow.is_sign_negative() {
        return Err(invalid("noise floors must be >= 0"));
    }
    if integrator.apnea_timeout_s.is_nan() || integrator.apnea_timeout_s <= 0.0 {
        return Err(invalid("apnea_timeout_s must be > 0"));
    }
    // ── Parameters ───────────────────────────────────────────────────────────
    if params.peep_window_s.is_sign_negative() || params.plateau_window_s.is_sign_negative() {
        return Err(invalid("pressure windows must be >= 0"));
    }
    if params.mve_window_s.is_nan() || params.mve_window_s <= 0.0 {
        return Err(invalid("mve_window_s must be > 0"));
    }
    if params.min_denominator.is_nan() || params.min_denominator <= 0.0 {
        return Err(invalid("min_denominator must be > 0"));
    }
    Ok(())
}

impl<C> MonitorBuilder<C> {
    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<Monitor> {
        let (store, mouthpiece) = self
            .calibration
            .ok_or_else(|| eyre::Report::new(BuildError::MissingCalibration))?;
        let sampling = self.sampling.unwrap_or_default();
        let buffer = self.buffer.unwrap_or_default();
        let segmenter = self.segmenter.unwrap_or_default();
        let integrator = self.integrator.unwrap_or_default();
        let params = self.params.unwrap_or_default();

        validate(&sampling, &buffer, &segmenter, &integrator, &params)?;
        if !self.zero_offset.is_finite() {
            return Err(invalid("zero offset must be finite"));
        }

        let flow_model = FlowModel::new(store, &mouthpiece).map_err(eyre::Report::new)?;
        let capacity = buffer.capacity(sampling.sample_rate_hz);
        tracing::debug!(
            mouthpiece = %flow_model.mouthpiece(),
            hz = sampling.sample_rate_hz,
            capacity,
            "monitor built"
        );

        Ok(Monitor {
            prefilter: MedianPrefilter::new(sampling.median_window),
            segmenter: BreathSegmenter::new(
                segmenter,
                1.0 / f64::from(sampling.sample_rate_hz.max(1)),
            ),
            integrator: VolumeIntegrator::new(integrator, sampling.sample_rate_hz),
            calculator: BreathParameterCalculator::new(params),
            buffers: ChannelBuffers::new(capacity),
            flow_model,
            sampling,
            window: None,
            boundaries: 0,
            dp_offset: self.zero_offset,
            last_good: None,
            pending: Vec::new(),
            last_t: None,
        })
    }

    pub fn with_sampling(mut self, sampling: SamplingCfg) -> Self {
        self.sampling = Some(sampling);
        self
    }
    pub fn with_buffer(mut self, buffer: BufferCfg) -> Self {
        self.buffer = Some(buffer);
        self
    }
    pub fn with_segmenter(mut self, segmenter: SegmenterCfg) -> Self {
        self.segmenter = Some(segmenter);
        self
    }
    pub fn with_integrator(mut self, integrator: IntegratorCfg) -> Self {
        self.integrator = Some(integrator);
        self
    }
    pub fn with_params(mut self, params: ParamsCfg) -> Self {
        self.params = Some(params);
        self
    }
    /// Differential-pressure zero offset (cmH2O).
    pub fn with_zero_offset(mut self, dp_offset: f64) -> Self {
        self.zero_offset = dp_offset;
        self
    }
}

impl MonitorBuilder<Missing> {
    pub fn with_calibration(
        self,
        store: Arc<CalibrationStore>,
        mouthpiece: &str,
    ) -> MonitorBuilder<Set> {
        MonitorBuilder {
            calibration: Some((store, mouthpiece.to_string())),
            sampling: self.sampling,
            buffer: self.buffer,
            segmenter: self.segmenter,
            integrator: self.integrator,
            params: self.params,
            zero_offset: self.zero_offset,
            _c: PhantomData,
        }
    }
}

impl MonitorBuilder<Set> {
    /// Validate and build. Only available once a calibration is set.
    pub fn build(self) -> Result<Monitor> {
        self.try_build()
    }
}
