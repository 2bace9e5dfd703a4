//! The per-sample pipeline: pressure to flow, segmentation, volume and
//! per-breath parameters, plus the buffered channels.
//!
//! A `Monitor` is single-owner state. The fast cadence owns one and hands out
//! [`BufferSnapshot`]s; nothing else mutates it.

use std::sync::Arc;
use std::time::Duration;

use spiro_traits::{PressureReading, PressureSensor};

use crate::config::SamplingCfg;
use crate::drift::DriftModel;
use crate::error::{CalibrationError, MonitorError};
use crate::flow::{FlowModel, MedianPrefilter};
use crate::integrator::{VolumeIntegrator, VolumeSample};
use crate::params::{BreathParameterCalculator, BreathParameters};
use crate::ring::RingBuffer;
use crate::segmenter::{BreathSegmenter, SegmentEvent};
use crate::snapshot::BufferSnapshot;
use crate::types::{Phase, Sample};
use crate::window::BreathWindow;

/// Parameter records kept for the next snapshot before the oldest is dropped.
const PENDING_CAP: usize = 64;

/// The streamed channels, all pushed together so they stay aligned.
#[derive(Debug, Clone)]
pub struct ChannelBuffers {
    time: RingBuffer<f64>,
    pressure: RingBuffer<f64>,
    flow: RingBuffer<f64>,
    volume: RingBuffer<f64>,
    volume_raw: RingBuffer<f64>,
    inspiration: RingBuffer<bool>,
}

impl ChannelBuffers {
    pub fn new(capacity: usize) -> Self {
        Self {
            time: RingBuffer::new(capacity),
            pressure: RingBuffer::new(capacity),
            flow: RingBuffer::new(capacity),
            volume: RingBuffer::new(capacity),
            volume_raw: RingBuffer::new(capacity),
            inspiration: RingBuffer::new(capacity),
        }
    }

    fn push(&mut self, sample: &Sample, volume: VolumeSample, inspiring: bool) {
        self.time.push(sample.t);
        self.pressure.push(sample.pressure());
        self.flow.push(sample.flow);
        self.volume.push(volume.corrected);
        self.volume_raw.push(volume.raw);
        self.inspiration.push(inspiring);
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.time.capacity()
    }

    /// `(t, flow)` pairs, oldest first.
    pub fn flow_history(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.time.iter().copied().zip(self.flow.iter().copied())
    }

    pub fn time(&self) -> &RingBuffer<f64> {
        &self.time
    }

    pub fn flow(&self) -> &RingBuffer<f64> {
        &self.flow
    }

    pub fn volume(&self) -> &RingBuffer<f64> {
        &self.volume
    }

    pub fn volume_raw(&self) -> &RingBuffer<f64> {
        &self.volume_raw
    }

    pub fn pressure(&self) -> &RingBuffer<f64> {
        &self.pressure
    }

    pub fn inspiration(&self) -> &RingBuffer<bool> {
        &self.inspiration
    }

    fn clear(&mut self) {
        self.time.clear();
        self.pressure.clear();
        self.flow.clear();
        self.volume.clear();
        self.volume_raw.clear();
        self.inspiration.clear();
    }
}

/// A breath window handed over at the inspiration start that closed it.
#[derive(Debug, Clone)]
pub struct ClosedBreath {
    /// 1-based number of the breath, counted from the first inspiration start.
    pub breath: u64,
    pub window: Arc<BreathWindow>,
    pub parameters: BreathParameters,
}

/// Result of processing one reading.
#[derive(Debug, Clone)]
pub struct Tick {
    pub sample: Sample,
    pub volume: VolumeSample,
    pub phase: Phase,
    pub event: Option<SegmentEvent>,
    pub closed: Option<ClosedBreath>,
}

#[derive(Debug)]
pub struct Monitor {
    pub(crate) sampling: SamplingCfg,
    pub(crate) flow_model: FlowModel,
    pub(crate) prefilter: MedianPrefilter,
    pub(crate) segmenter: BreathSegmenter,
    pub(crate) integrator: VolumeIntegrator,
    pub(crate) calculator: BreathParameterCalculator,
    pub(crate) buffers: ChannelBuffers,
    pub(crate) window: Option<BreathWindow>,
    pub(crate) boundaries: u64,
    pub(crate) dp_offset: f64,
    pub(crate) last_good: Option<(u64, BreathParameters)>,
    pub(crate) pending: Vec<BreathParameters>,
    pub(crate) last_t: Option<f64>,
}

impl Monitor {
    /// Run one reading taken at `t` through the pipeline.
    ///
    /// Rejected readings leave every piece of state untouched.
    pub fn process(&mut self, t: f64, reading: PressureReading) -> Result<Tick, MonitorError> {
        if !reading.is_finite() {
            return Err(MonitorError::InvalidSample("non-finite pressure"));
        }
        if !t.is_finite() {
            return Err(MonitorError::InvalidSample("non-finite timestamp"));
        }
        if let Some(prev) = self.last_t
            && t <= prev
        {
            return Err(MonitorError::InvalidSample("timestamp did not increase"));
        }
        self.last_t = Some(t);

        let dp = self.prefilter.apply(reading.dp() - self.dp_offset);
        let flow = self.flow_model.apply(dp);
        let sample = Sample {
            t,
            p1: reading.p1,
            p2: reading.p2,
            dp,
            flow,
        };

        let event = self.segmenter.update(t, flow);
        let closed = match event {
            Some(SegmentEvent::InhaleStart) => self.on_inhale_start(t),
            Some(SegmentEvent::ExhaleMarker) => {
                if let Some(w) = self.window.as_mut() {
                    w.mark_end_of_inspiration(t);
                }
                None
            }
            None => None,
        };

        let phase = self.segmenter.phase();
        let volume = self
            .integrator
            .update(t, flow, self.segmenter.derivative(), phase);
        self.buffers
            .push(&sample, volume, phase == Phase::Inhaling);

        if let Some(w) = self.window.as_mut() {
            w.push(t, sample.pressure(), flow, volume.corrected);
            if w.len() > self.buffers.capacity() {
                tracing::debug!(tsi = w.tsi(), "breath window outgrew history; discarded");
                self.window = None;
            }
        }

        Ok(Tick {
            sample,
            volume,
            phase,
            event,
            closed,
        })
    }

    /// Close the open window (if any), compute its parameters, open the next.
    fn on_inhale_start(&mut self, t: f64) -> Option<ClosedBreath> {
        self.boundaries += 1;
        let closed = if let Some(open) = self.window.take() {
            let breath = self.boundaries - 1;
            let window = open.close(t);
            let parameters =
                self.calculator
                    .compute(&window, self.boundaries, self.buffers.flow_history());
            if parameters.is_available() {
                self.last_good = Some((breath, parameters));
                tracing::info!(
                    breath,
                    tsi = window.tsi(),
                    tee = t,
                    vt = ?parameters.vt.value(),
                    rr = ?parameters.rr.value(),
                    "breath closed"
                );
            } else {
                tracing::debug!(breath, "breath closed without parameters");
            }
            if self.pending.len() >= PENDING_CAP {
                self.pending.remove(0);
            }
            self.pending.push(parameters);
            Some(ClosedBreath {
                breath,
                window: Arc::new(window),
                parameters,
            })
        } else {
            None
        };
        self.window = Some(BreathWindow::open(t));
        self.integrator.on_breath_start(t);
        closed
    }

    /// Read one sample from `sensor` and process it at time `t`.
    pub fn step<S: PressureSensor + ?Sized>(
        &mut self,
        sensor: &mut S,
        t: f64,
        timeout: Duration,
    ) -> Result<Tick, MonitorError> {
        let reading = sensor
            .read(timeout)
            .map_err(|e| crate::hw_error::map_hw_error(&*e))?;
        self.process(t, reading)
    }

    /// Copy the buffers out and drain the parameter records computed since
    /// the previous snapshot.
    pub fn snapshot(&mut self) -> BufferSnapshot {
        BufferSnapshot {
            time: self.buffers.time.to_vec(),
            pressure: self.buffers.pressure.to_vec(),
            flow: self.buffers.flow.to_vec(),
            volume: self.buffers.volume.to_vec(),
            volume_raw: self.buffers.volume_raw.to_vec(),
            inspiration: self.buffers.inspiration.to_vec(),
            breaths: self.boundaries,
            parameters: std::mem::take(&mut self.pending),
            latest: self.latest_parameters(),
        }
    }

    /// Install a drift model from the slow cadence.
    pub fn set_drift(&mut self, model: DriftModel) {
        tracing::trace!(model = model.name(), "drift model applied");
        self.integrator.set_drift(model);
    }

    pub fn drift(&self) -> &DriftModel {
        self.integrator.drift()
    }

    /// Switch calibration; the previous polynomial stays active on error.
    pub fn set_mouthpiece(&mut self, mouthpiece: &str) -> Result<(), CalibrationError> {
        self.flow_model.set_mouthpiece(mouthpiece)
    }

    pub fn mouthpiece(&self) -> &str {
        self.flow_model.mouthpiece()
    }

    pub fn flow_model(&self) -> &FlowModel {
        &self.flow_model
    }

    /// Differential-pressure offset subtracted from every reading.
    pub fn set_zero_offset(&mut self, dp_offset: f64) {
        self.dp_offset = dp_offset;
    }

    pub fn zero_offset(&self) -> f64 {
        self.dp_offset
    }

    /// Mean `p2 - p1` of the finite readings; `None` when there are none.
    pub fn estimate_zero_offset(readings: &[PressureReading]) -> Option<f64> {
        let (sum, n) = readings
            .iter()
            .filter(|r| r.is_finite())
            .fold((0.0, 0usize), |(s, n), r| (s + r.dp(), n + 1));
        (n > 0).then(|| sum / n as f64)
    }

    /// Latest record that passed the availability check.
    pub fn latest_parameters(&self) -> Option<BreathParameters> {
        self.last_good.map(|(_, p)| p)
    }

    /// Number of the breath behind [`Monitor::latest_parameters`].
    pub fn latest_breath(&self) -> Option<u64> {
        self.last_good.map(|(n, _)| n)
    }

    /// Inspiration starts seen so far.
    pub fn breaths(&self) -> u64 {
        self.boundaries
    }

    pub fn phase(&self) -> Phase {
        self.segmenter.phase()
    }

    pub fn buffers(&self) -> &ChannelBuffers {
        &self.buffers
    }

    pub fn open_window(&self) -> Option<&BreathWindow> {
        self.window.as_ref()
    }

    pub fn sampling(&self) -> &SamplingCfg {
        &self.sampling
    }

    #[inline]
    pub fn sample_rate_hz(&self) -> u32 {
        self.sampling.sample_rate_hz
    }

    /// Drop all history and breath state; calibration and zero offset stay.
    pub fn reset(&mut self) {
        self.prefilter.reset();
        self.segmenter.reset();
        self.integrator.reset();
        self.buffers.clear();
        self.window = None;
        self.boundaries = 0;
        self.last_good = None;
        self.pending.clear();
        self.last_t = None;
    }
}
