//! Orchestration: the threaded runner and the inline direct mode.

use crossbeam_channel as xch;
use eyre::WrapErr;
use spiro_traits::PressureSensor;
use spiro_traits::clock::Clock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cadence::{
    CadenceCounters, CounterValues, FastCadence, LatestParameters, MonitorEvent, SlowCadence,
    SlowParams, links,
};
use crate::config::DriftCfg;
use crate::drift::{DriftEstimator, DriftModel};
use crate::error::{MonitorError, Result};
use crate::monitor::Monitor;
use crate::params::BreathParameters;
use crate::stats::{Parameter, ParameterStats, StatSummary};
use spiro_traits::PressureReading;

/// How sampling should be orchestrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    /// Inline, no threads; timestamps come from the sample index.
    Direct,
    /// Fast and slow cadence threads, the fast one paced at the given Hz.
    Paced(u32),
}

/// Runner settings derived from the whole config.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub sample_rate_hz: u32,
    pub read_timeout: Duration,
    pub slow_period: Duration,
    pub event_capacity: usize,
    pub stats_len: usize,
    pub drift: DriftCfg,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            sample_rate_hz: 100,
            read_timeout: Duration::from_millis(20),
            slow_period: Duration::from_secs(1),
            event_capacity: 256,
            stats_len: 10,
            drift: DriftCfg::default(),
        }
    }
}

/// How long the slow cadence waits for a snapshot reply.
#[inline]
fn reply_wait(read_timeout: Duration, sample_rate_hz: u32) -> Duration {
    let period = Duration::from_micros(crate::util::period_us(sample_rate_hz));
    (read_timeout + period)
        .saturating_mul(4)
        .max(Duration::from_millis(50))
}

/// Owns both cadence threads; dropping it stops and joins them.
pub struct MonitorRunner {
    fast: Option<FastCadence>,
    slow: Option<SlowCadence>,
    events: xch::Receiver<MonitorEvent>,
    latest: LatestParameters,
    counters: Arc<CadenceCounters>,
}

impl MonitorRunner {
    pub fn spawn<S, C>(sensor: S, monitor: Monitor, params: &RunParams, clock: C) -> Self
    where
        S: PressureSensor + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let (events_tx, events) = xch::bounded(params.event_capacity.max(1));
        let (fast_links, slow_links) = links(&events_tx);
        drop(events_tx);
        let counters = Arc::new(CadenceCounters::default());
        let latest: LatestParameters = Arc::new(Mutex::new(
            monitor.latest_breath().zip(monitor.latest_parameters()),
        ));

        let hz = params.sample_rate_hz;
        let fast = FastCadence::spawn(
            sensor,
            monitor,
            hz,
            params.read_timeout,
            clock,
            fast_links,
            Arc::clone(&latest),
            Arc::clone(&counters),
        );
        let slow = SlowCadence::spawn(
            SlowParams {
                period: params.slow_period,
                reply_wait: reply_wait(params.read_timeout, hz),
                stats_len: params.stats_len,
                sample_rate_hz: hz,
                drift: params.drift.clone(),
            },
            slow_links,
            Arc::clone(&counters),
        );
        tracing::info!(hz, slow_period = ?params.slow_period, "monitor running");

        Self {
            fast: Some(fast),
            slow: Some(slow),
            events,
            latest,
            counters,
        }
    }

    pub fn events(&self) -> &xch::Receiver<MonitorEvent> {
        &self.events
    }

    /// Latest record that passed the availability check.
    pub fn latest_parameters(&self) -> Option<BreathParameters> {
        self.latest.lock().ok().and_then(|g| g.map(|(_, p)| p))
    }

    /// Number of the breath behind [`MonitorRunner::latest_parameters`].
    pub fn latest_breath(&self) -> Option<u64> {
        self.latest.lock().ok().and_then(|g| g.map(|(n, _)| n))
    }

    pub fn counters(&self) -> CounterValues {
        self.counters.load()
    }

    /// Stop both cadences; idempotent.
    pub fn stop(&mut self) {
        // Fast first: its exit disconnects the snapshot channel the slow side may wait on.
        if let Some(mut fast) = self.fast.take() {
            fast.stop();
        }
        if let Some(mut slow) = self.slow.take() {
            slow.stop();
        }
        tracing::debug!(counters = ?self.counters.load(), "monitor stopped");
    }
}

impl Drop for MonitorRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Outcome of [`run_direct`].
#[derive(Debug, Clone)]
pub struct DirectSummary {
    pub samples: u64,
    pub breaths: u64,
    pub read_failures: u64,
    pub invalid_samples: u64,
    pub latest: Option<BreathParameters>,
    pub latest_breath: Option<u64>,
    pub stats: Vec<(Parameter, StatSummary)>,
    pub drift: DriftModel,
}

/// Drive `monitor` inline for `samples` reads.
///
/// Sample `k` is stamped `k / sample_rate_hz` (offset past any earlier
/// samples the monitor holds). The slow work (stats fold, drift fit) runs
/// every `slow_period` worth of samples, on a snapshot just like the slow
/// cadence does. Read failures are reported and skipped; only a run in which
/// every read failed returns an error.
pub fn run_direct<S, F>(
    sensor: &mut S,
    monitor: &mut Monitor,
    params: &RunParams,
    samples: u64,
    on_event: F,
) -> Result<DirectSummary>
where
    S: PressureSensor + ?Sized,
    F: FnMut(&MonitorEvent),
{
    run_direct_until(sensor, monitor, params, samples, &AtomicBool::new(false), on_event)
}

/// [`run_direct`] that also returns early once `stop` is set.
pub fn run_direct_until<S, F>(
    sensor: &mut S,
    monitor: &mut Monitor,
    params: &RunParams,
    samples: u64,
    stop: &AtomicBool,
    mut on_event: F,
) -> Result<DirectSummary>
where
    S: PressureSensor + ?Sized,
    F: FnMut(&MonitorEvent),
{
    let hz = params.sample_rate_hz.max(1);
    let slow_every = crate::util::samples_per_period(
        hz,
        u64::try_from(params.slow_period.as_millis()).unwrap_or(u64::MAX),
    );
    let dt = 1.0 / f64::from(hz);
    let t0 = monitor.last_t.map_or(0.0, |t| t + dt);

    let estimator = DriftEstimator::new(params.drift.clone(), hz);
    let mut stats = ParameterStats::new(params.stats_len);
    let mut consecutive = 0u64;
    let mut failures = 0u64;
    let mut invalid = 0u64;
    let mut last_error: Option<MonitorError> = None;
    tracing::info!(hz, samples, mode = "direct", "monitor start");

    let mut processed = 0u64;
    for k in 0..samples {
        if stop.load(Ordering::Relaxed) {
            tracing::info!(processed, "stop requested");
            break;
        }
        processed += 1;
        let t = (k as f64).mul_add(dt, t0);
        match monitor.step(sensor, t, params.read_timeout) {
            Ok(tick) => {
                consecutive = 0;
                for ev in MonitorEvent::from_tick(&tick) {
                    on_event(&ev);
                }
            }
            Err(MonitorError::InvalidSample(why)) => {
                invalid += 1;
                tracing::trace!(t, reason = why, "sample rejected");
            }
            Err(error) => {
                consecutive += 1;
                failures += 1;
                if consecutive == 1 || consecutive % 100 == 0 {
                    tracing::warn!(
                        %error,
                        consecutive,
                        total = failures,
                        "sensor read failed; sample skipped"
                    );
                }
                on_event(&MonitorEvent::SensorFault {
                    consecutive,
                    total: failures,
                    error: error.clone(),
                });
                last_error = Some(error);
            }
        }

        if (k + 1) % slow_every == 0 {
            slow_step(monitor, &estimator, &mut stats, &mut on_event);
        }
    }

    if processed > 0
        && failures == processed
        && let Some(error) = last_error
    {
        return Err(eyre::Report::new(error))
            .wrap_err(format!("no sensor read succeeded in {processed} attempts"));
    }
    tracing::info!(
        samples = processed,
        breaths = monitor.breaths(),
        failures,
        "monitor finished"
    );
    Ok(DirectSummary {
        samples: processed,
        breaths: monitor.breaths(),
        read_failures: failures,
        invalid_samples: invalid,
        latest: monitor.latest_parameters(),
        latest_breath: monitor.latest_breath(),
        stats: stats.summaries(),
        drift: monitor.drift().clone(),
    })
}

fn slow_step<F: FnMut(&MonitorEvent)>(
    monitor: &mut Monitor,
    estimator: &DriftEstimator,
    stats: &mut ParameterStats,
    on_event: &mut F,
) {
    let snap = Arc::new(monitor.snapshot());
    for p in &snap.parameters {
        stats.record(p);
    }
    if let Some(model) = estimator.estimate(&snap.time, &snap.volume_raw) {
        monitor.set_drift(model.clone());
        on_event(&MonitorEvent::Drift(model));
    }
    let summaries = stats.summaries();
    if !summaries.is_empty() {
        on_event(&MonitorEvent::Stats(summaries));
    }
    on_event(&MonitorEvent::Snapshot(snap));
}

/// Re-zero the gauges, then average `n` zero-flow readings into a
/// differential-pressure offset.
///
/// Failed reads are skipped; fewer than half succeeding is an error carrying
/// the last read failure.
pub fn measure_zero_offset<S: PressureSensor + ?Sized>(
    sensor: &mut S,
    n: usize,
    timeout: Duration,
) -> Result<f64> {
    sensor
        .rezero()
        .map_err(|e| eyre::Report::new(crate::hw_error::map_hw_error(&*e)))
        .wrap_err("re-zeroing pressure gauges")?;
    if n == 0 {
        return Ok(0.0);
    }
    let mut readings: Vec<PressureReading> = Vec::with_capacity(n);
    let mut last_err: Option<MonitorError> = None;
    for _ in 0..n {
        match sensor.read(timeout) {
            Ok(r) if r.is_finite() => readings.push(r),
            Ok(_) => last_err = Some(MonitorError::InvalidSample("non-finite pressure")),
            Err(e) => last_err = Some(crate::hw_error::map_hw_error(&*e)),
        }
    }
    let ok = readings.len();
    if ok * 2 < n {
        let err = last_err.unwrap_or(MonitorError::SensorRead("no readings".into()));
        return Err(eyre::Report::new(err))
            .wrap_err(format!("zero-offset measurement: {ok}/{n} reads succeeded"));
    }
    let offset = Monitor::estimate_zero_offset(&readings).unwrap_or(0.0);
    tracing::debug!(offset, reads = ok, "zero offset measured");
    Ok(offset)
}
