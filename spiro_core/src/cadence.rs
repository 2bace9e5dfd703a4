//! The fast and slow cadence threads.
//!
//! The fast cadence owns the sensor and the `Monitor`. The slow cadence only
//! ever sees `BufferSnapshot`s, requested over a one-slot channel, and answers
//! with drift models over another one-slot channel. The fast side applies the
//! newest model at the top of its next tick.
//!
//! Each cadence spawns exactly one thread, joined when the handle is dropped.

use crossbeam_channel::{self as xch, RecvTimeoutError, TrySendError};
use spiro_traits::PressureSensor;
use spiro_traits::clock::Clock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::DriftCfg;
use crate::drift::{DriftEstimator, DriftModel};
use crate::error::MonitorError;
use crate::monitor::{Monitor, Tick};
use crate::params::BreathParameters;
use crate::segmenter::SegmentEvent;
use crate::snapshot::BufferSnapshot;
use crate::stats::{Parameter, ParameterStats, StatSummary};
use crate::window::BreathWindow;

/// Log the first failure of a streak, then every this many.
const FAULT_LOG_EVERY: u64 = 100;

/// What the cadences publish to the presentation side.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    InhaleStart {
        t: f64,
    },
    ExhaleMarker {
        t: f64,
    },
    BreathClosed {
        /// Same numbering as [`crate::Monitor::breaths`].
        breath: u64,
        window: Arc<BreathWindow>,
        parameters: BreathParameters,
    },
    SensorFault {
        consecutive: u64,
        total: u64,
        error: MonitorError,
    },
    Snapshot(Arc<BufferSnapshot>),
    Drift(DriftModel),
    Stats(Vec<(Parameter, StatSummary)>),
}

impl MonitorEvent {
    /// Events for one processed tick, in order.
    pub fn from_tick(tick: &Tick) -> Vec<Self> {
        let mut out = Vec::new();
        if let Some(closed) = &tick.closed {
            out.push(Self::BreathClosed {
                breath: closed.breath,
                window: Arc::clone(&closed.window),
                parameters: closed.parameters,
            });
        }
        match tick.event {
            Some(SegmentEvent::InhaleStart) => out.push(Self::InhaleStart { t: tick.sample.t }),
            Some(SegmentEvent::ExhaleMarker) => out.push(Self::ExhaleMarker { t: tick.sample.t }),
            None => {}
        }
        out
    }
}

/// Lock-free counters shared by both cadences.
#[derive(Debug, Default)]
pub struct CadenceCounters {
    ticks: AtomicU64,
    read_failures: AtomicU64,
    invalid_samples: AtomicU64,
    dropped_events: AtomicU64,
    overruns: AtomicU64,
    slow_runs: AtomicU64,
    missed_snapshots: AtomicU64,
    breaths: AtomicU64,
    last_ok_ms: AtomicU64,
}

/// Plain copy of [`CadenceCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterValues {
    pub ticks: u64,
    pub read_failures: u64,
    pub invalid_samples: u64,
    pub dropped_events: u64,
    pub overruns: u64,
    pub slow_runs: u64,
    pub missed_snapshots: u64,
    /// Inspiration starts the fast cadence's monitor has seen.
    pub breaths: u64,
    /// Milliseconds after start of the last good read.
    pub last_ok_ms: u64,
}

impl CadenceCounters {
    pub fn load(&self) -> CounterValues {
        CounterValues {
            ticks: self.ticks.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            invalid_samples: self.invalid_samples.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            slow_runs: self.slow_runs.load(Ordering::Relaxed),
            missed_snapshots: self.missed_snapshots.load(Ordering::Relaxed),
            breaths: self.breaths.load(Ordering::Relaxed),
            last_ok_ms: self.last_ok_ms.load(Ordering::Relaxed),
        }
    }

    /// Milliseconds since the last good read, given the current offset.
    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_ok_ms.load(Ordering::Relaxed))
    }
}

/// Non-blocking publish; a full queue drops the event and counts it.
fn publish(tx: &xch::Sender<MonitorEvent>, counters: &CadenceCounters, ev: MonitorEvent) {
    match tx.try_send(ev) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(_)) => {
            counters.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Fast-side ends of the cadence channels.
pub struct FastLinks {
    pub drift_rx: xch::Receiver<DriftModel>,
    pub request_rx: xch::Receiver<()>,
    pub snapshot_tx: xch::Sender<Arc<BufferSnapshot>>,
    pub events: xch::Sender<MonitorEvent>,
}

/// Slow-side ends of the cadence channels.
pub struct SlowLinks {
    pub drift_tx: xch::Sender<DriftModel>,
    pub request_tx: xch::Sender<()>,
    pub snapshot_rx: xch::Receiver<Arc<BufferSnapshot>>,
    pub events: xch::Sender<MonitorEvent>,
}

/// Wire both sides; every cross-cadence channel holds one message.
pub fn links(events: &xch::Sender<MonitorEvent>) -> (FastLinks, SlowLinks) {
    let (drift_tx, drift_rx) = xch::bounded(1);
    let (request_tx, request_rx) = xch::bounded(1);
    let (snapshot_tx, snapshot_rx) = xch::bounded(1);
    (
        FastLinks {
            drift_rx,
            request_rx,
            snapshot_tx,
            events: events.clone(),
        },
        SlowLinks {
            drift_tx,
            request_tx,
            snapshot_rx,
            events: events.clone(),
        },
    )
}

/// Shared handle to the latest available parameter record and its breath number.
pub type LatestParameters = Arc<Mutex<Option<(u64, BreathParameters)>>>;

pub struct FastCadence {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl FastCadence {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn<S, C>(
        mut sensor: S,
        mut monitor: Monitor,
        hz: u32,
        timeout: Duration,
        clock: C,
        links: FastLinks,
        latest: LatestParameters,
        counters: Arc<CadenceCounters>,
    ) -> Self
    where
        S: PressureSensor + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let period = Duration::from_micros(crate::util::period_us(hz));

        let join_handle = std::thread::spawn(move || {
            let epoch = clock.now();
            let mut next = epoch + period;
            let mut consecutive = 0u64;
            let mut total_failures = 0u64;
            tracing::debug!(hz, ?timeout, "fast cadence started");

            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("fast cadence received shutdown signal");
                    break;
                }

                if let Some(model) = links.drift_rx.try_iter().last() {
                    monitor.set_drift(model);
                }

                let t = clock.secs_since(epoch);
                match monitor.step(&mut sensor, t, timeout) {
                    Ok(tick) => {
                        if consecutive > 0 {
                            tracing::info!(after = consecutive, "sensor reads recovered");
                        }
                        consecutive = 0;
                        counters.ticks.fetch_add(1, Ordering::Relaxed);
                        counters.breaths.store(monitor.breaths(), Ordering::Relaxed);
                        counters
                            .last_ok_ms
                            .store(clock.ms_since(epoch), Ordering::Relaxed);
                        if let Some(closed) = &tick.closed
                            && closed.parameters.is_available()
                            && let Ok(mut slot) = latest.lock()
                        {
                            *slot = Some((closed.breath, closed.parameters));
                        }
                        for ev in MonitorEvent::from_tick(&tick) {
                            publish(&links.events, &counters, ev);
                        }
                    }
                    Err(MonitorError::InvalidSample(why)) => {
                        counters.invalid_samples.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!(t, reason = why, "sample rejected");
                    }
                    Err(error) => {
                        consecutive += 1;
                        total_failures += 1;
                        counters.read_failures.fetch_add(1, Ordering::Relaxed);
                        if consecutive == 1 || consecutive % FAULT_LOG_EVERY == 0 {
                            tracing::warn!(
                                %error,
                                consecutive,
                                total = total_failures,
                                "sensor read failed; tick skipped"
                            );
                        }
                        publish(
                            &links.events,
                            &counters,
                            MonitorEvent::SensorFault {
                                consecutive,
                                total: total_failures,
                                error,
                            },
                        );
                    }
                }

                if links.request_rx.try_recv().is_ok() {
                    let snap = Arc::new(monitor.snapshot());
                    if links.snapshot_tx.try_send(snap).is_err() {
                        tracing::warn!("previous snapshot still unread; dropping this one");
                    }
                }

                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                let now = clock.now();
                if now > next {
                    counters.overruns.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(late_us = (now - next).as_micros(), "tick overran");
                    next = now + period;
                } else {
                    clock.sleep_until(next);
                    next += period;
                }
            }
            tracing::trace!("fast cadence exiting cleanly");
        });

        Self {
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("fast cadence joined"),
                Err(e) => tracing::warn!(?e, "fast cadence panicked during shutdown"),
            }
        }
    }
}

impl Drop for FastCadence {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Settings for the slow cadence.
#[derive(Debug, Clone)]
pub struct SlowParams {
    pub period: Duration,
    /// How long to wait for the fast side to answer a snapshot request.
    pub reply_wait: Duration,
    pub stats_len: usize,
    pub sample_rate_hz: u32,
    pub drift: DriftCfg,
}

pub struct SlowCadence {
    stop_tx: Option<xch::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl SlowCadence {
    pub fn spawn(params: SlowParams, links: SlowLinks, counters: Arc<CadenceCounters>) -> Self {
        let (stop_tx, stop_rx) = xch::bounded::<()>(1);

        let join_handle = std::thread::spawn(move || {
            let estimator = DriftEstimator::new(params.drift.clone(), params.sample_rate_hz);
            let mut stats = ParameterStats::new(params.stats_len);
            tracing::debug!(period = ?params.period, strategy = ?estimator.strategy(), "slow cadence started");

            loop {
                xch::select! {
                    recv(stop_rx) -> _ => break,
                    default(params.period) => {}
                }

                // A reply that arrived after its wait expired is stale. Its
                // parameter records were drained from the monitor, so keep those.
                while let Ok(stale) = links.snapshot_rx.try_recv() {
                    tracing::trace!(t_end = ?stale.t_end(), "discarding late snapshot");
                    for p in &stale.parameters {
                        stats.record(p);
                    }
                }

                // A full request slot means the previous request is still pending.
                let _ = links.request_tx.try_send(());
                let snap = match links.snapshot_rx.recv_timeout(params.reply_wait) {
                    Ok(snap) => snap,
                    Err(RecvTimeoutError::Timeout) => {
                        counters.missed_snapshots.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(wait = ?params.reply_wait, "no snapshot from fast cadence");
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        tracing::debug!("fast cadence gone; slow cadence exiting");
                        break;
                    }
                };
                counters.slow_runs.fetch_add(1, Ordering::Relaxed);

                for p in &snap.parameters {
                    stats.record(p);
                }

                if let Some(model) = estimator.estimate(&snap.time, &snap.volume_raw) {
                    if let Err(TrySendError::Full(_)) = links.drift_tx.try_send(model.clone()) {
                        tracing::debug!("fast cadence has not applied the previous drift model");
                    }
                    publish(&links.events, &counters, MonitorEvent::Drift(model));
                }

                let summaries = stats.summaries();
                if !summaries.is_empty() {
                    publish(&links.events, &counters, MonitorEvent::Stats(summaries));
                }
                publish(&links.events, &counters, MonitorEvent::Snapshot(snap));
            }
            tracing::trace!("slow cadence exiting cleanly");
        });

        Self {
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        }
    }

    pub fn stop(&mut self) {
        // Dropping the sender disconnects the stop channel and wakes the select.
        self.stop_tx.take();
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("slow cadence joined"),
                Err(e) => tracing::warn!(?e, "slow cadence panicked during shutdown"),
            }
        }
    }
}

impl Drop for SlowCadence {
    fn drop(&mut self) {
        self.stop();
    }
}
