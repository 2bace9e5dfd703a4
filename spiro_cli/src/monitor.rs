//! Monitor command: sensor assembly, the run itself, and breath output.

use crossbeam_channel::RecvTimeoutError;
use eyre::WrapErr;
use serde_json::{Value, json};
use spiro_config::{Config, RunMode};
use spiro_core::error::{MonitorError, Result as CoreResult};
use spiro_core::{
    BreathParameters, CalibrationStore, DriftModel, Measure, Monitor, MonitorEvent, MonitorRunner,
    Parameter, RunParams, SamplingMode, StatSummary,
};
use spiro_hardware::{BreathPattern, ReplaySensor, SimulatedBreather};
use spiro_traits::PressureSensor;
use spiro_traits::clock::MonotonicClock;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub type BoxedSensor = Box<dyn PressureSensor + Send>;

/// Options of the `monitor` subcommand after merging with the config.
#[derive(Debug, Clone)]
pub struct MonitorOpts {
    pub duration_s: f64,
    pub replay: Option<std::path::PathBuf>,
    pub direct: bool,
    pub stats: bool,
    pub json: bool,
}

/// Load every configured table; relative paths resolve against `base`.
pub fn load_store(cfg: &Config, base: &Path) -> CoreResult<Arc<CalibrationStore>> {
    let store = CalibrationStore::from_config(&cfg.calibration, base).map_err(eyre::Report::new)?;
    tracing::info!(
        tables = store.len(),
        active = %cfg.calibration.mouthpiece,
        "calibration loaded"
    );
    Ok(Arc::new(store))
}

/// The simulated breather shaped by `[simulation]`, with the test hooks applied.
fn simulated(cfg: &Config) -> SimulatedBreather {
    let sim = &cfg.simulation;
    let mut pattern = BreathPattern {
        rr_bpm: sim.rr_bpm,
        ie_ratio: sim.ie_ratio,
        peak_dp_cmh2o: sim.peak_dp_cmh2o,
        pip_cmh2o: sim.pip_cmh2o,
        peep_cmh2o: sim.peep_cmh2o,
        bias_dp_cmh2o: sim.bias_dp_cmh2o,
        noise_cmh2o: sim.noise_cmh2o,
    };
    if let Ok(v) = std::env::var("SPIRO_TEST_SIM_RR")
        && let Ok(rr) = v.parse::<f64>()
        && rr > 0.0
    {
        pattern.rr_bpm = rr;
    }
    let hz = cfg.sensor.sample_rate_hz;
    // Quiet lead-in covers the zeroing reads plus half a second.
    let lead_in = cfg.sensor.zero_samples as f64 / f64::from(hz.max(1)) + 0.5;
    let timeout = std::env::var("SPIRO_TEST_SIM_TIMEOUT").is_ok_and(|v| v == "1");
    SimulatedBreather::new(pattern, hz, sim.seed)
        .with_quiet_lead_in(lead_in)
        .with_always_timeout(timeout)
}

/// Replay when a recording is given (CLI first, then config), else simulate.
pub fn make_sensor(cfg: &Config, base: &Path, replay: Option<&Path>) -> CoreResult<BoxedSensor> {
    let configured = cfg
        .simulation
        .replay
        .as_ref()
        .map(|p| if p.is_absolute() { p.clone() } else { base.join(p) });
    match replay.map(Path::to_path_buf).or(configured) {
        Some(path) => {
            let sensor = ReplaySensor::from_path(&path)
                .wrap_err_with(|| format!("open recording {}", path.display()))?;
            if let Some(hz) = sensor.estimated_rate_hz()
                && (hz - f64::from(cfg.sensor.sample_rate_hz)).abs() > 0.05 * hz
            {
                tracing::warn!(
                    recording_hz = hz,
                    configured_hz = cfg.sensor.sample_rate_hz,
                    "recording rate differs from sensor.sample_rate_hz"
                );
            }
            Ok(Box::new(sensor))
        }
        None => Ok(Box::new(simulated(cfg))),
    }
}

/// Zero the sensor, then build the monitor with the measured offset.
pub fn build_monitor(
    cfg: &Config,
    store: Arc<CalibrationStore>,
    sensor: &mut BoxedSensor,
) -> CoreResult<Monitor> {
    let timeout = Duration::from_millis(cfg.sensor.read_timeout_ms);
    let offset = spiro_core::measure_zero_offset(sensor, cfg.sensor.zero_samples, timeout)?;
    if cfg.sensor.zero_samples > 0 {
        tracing::info!(offset, reads = cfg.sensor.zero_samples, "dp zero offset");
    }
    Monitor::builder()
        .with_calibration(store, &cfg.calibration.mouthpiece)
        .with_sampling((&cfg.sensor).into())
        .with_buffer((&cfg.buffer).into())
        .with_segmenter((&cfg.segmenter).into())
        .with_integrator((&cfg.integrator).into())
        .with_params((&cfg.parameters).into())
        .with_zero_offset(offset)
        .build()
}

/// Final numbers of a monitor run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub samples: u64,
    pub breaths: u64,
    pub read_failures: u64,
    pub dropped_events: u64,
    pub latest: Option<BreathParameters>,
    pub latest_breath: Option<u64>,
    pub stats: Vec<(Parameter, StatSummary)>,
    pub drift: Option<DriftModel>,
}

/// Prints breath lines as events arrive and remembers what the summary needs.
struct Printer {
    json: bool,
    stats: Vec<(Parameter, StatSummary)>,
    drift: Option<DriftModel>,
    last_fault: Option<MonitorError>,
}

impl Printer {
    fn new(json: bool) -> Self {
        Self {
            json,
            stats: Vec::new(),
            drift: None,
            last_fault: None,
        }
    }

    fn on_event(&mut self, ev: &MonitorEvent) {
        match ev {
            MonitorEvent::BreathClosed {
                breath, parameters, ..
            } => {
                if parameters.is_available() {
                    println!("{}", self.breath_line(*breath, parameters));
                }
            }
            MonitorEvent::Stats(s) => self.stats.clone_from(s),
            MonitorEvent::Drift(model) => self.drift = Some(model.clone()),
            MonitorEvent::SensorFault { error, .. } => self.last_fault = Some(error.clone()),
            MonitorEvent::InhaleStart { .. }
            | MonitorEvent::ExhaleMarker { .. }
            | MonitorEvent::Snapshot(_) => {}
        }
    }

    fn breath_line(&self, n: u64, p: &BreathParameters) -> String {
        if self.json {
            return breath_json(n, p).to_string();
        }
        format!(
            "breath {n:>4}  vt {} L  rr {} /min  ie {}  pip {}  peep {}  pp {}  C {} L/cmH2O  mve {} L/min",
            fmt_measure(p.vt, 3),
            fmt_measure(p.rr, 1),
            fmt_measure(p.ie, 2),
            fmt_measure(p.pip, 1),
            fmt_measure(p.peep, 1),
            fmt_measure(p.pp, 1),
            fmt_measure(p.compliance, 4),
            fmt_measure(p.mve_measured, 2),
        )
    }
}

fn measure_json(m: Measure) -> Value {
    m.value().map_or(Value::Null, Value::from)
}

pub fn breath_json(n: u64, p: &BreathParameters) -> Value {
    json!({
        "breath": n,
        "tsi": measure_json(p.tsi),
        "tei": measure_json(p.tei),
        "tee": measure_json(p.tee),
        "vt": measure_json(p.vt),
        "rr": measure_json(p.rr),
        "ie": measure_json(p.ie),
        "pip": measure_json(p.pip),
        "peep": measure_json(p.peep),
        "pp": measure_json(p.pp),
        "compliance": measure_json(p.compliance),
        "mve_inferred": measure_json(p.mve_inferred),
        "mve_measured": measure_json(p.mve_measured),
    })
}

fn fmt_measure(m: Measure, prec: usize) -> String {
    match m {
        Measure::Value(v) => format!("{v:.prec$}"),
        Measure::NoData => "-".to_string(),
        Measure::Indeterminate => "?".to_string(),
    }
}

pub fn run_monitor(
    cfg: &Config,
    base: &Path,
    opts: &MonitorOpts,
    shutdown: &Arc<AtomicBool>,
) -> CoreResult<RunSummary> {
    if !(opts.duration_s.is_finite() && opts.duration_s > 0.0) {
        return Err(eyre::Report::new(MonitorError::Config(
            "--duration-s must be > 0".into(),
        )));
    }
    let store = load_store(cfg, base)?;
    let mut sensor = make_sensor(cfg, base, opts.replay.as_deref())?;
    let monitor = build_monitor(cfg, store, &mut sensor)?;
    let params = RunParams::from(cfg);

    let hz = cfg.sensor.sample_rate_hz;
    let mode = if opts.direct || cfg.runner.mode == RunMode::Direct {
        SamplingMode::Direct
    } else {
        SamplingMode::Paced(hz)
    };
    tracing::info!(
        ?mode,
        duration_s = opts.duration_s,
        mouthpiece = %monitor.mouthpiece(),
        "monitor start"
    );

    let mut printer = Printer::new(opts.json);
    let summary = match mode {
        SamplingMode::Direct => {
            let samples = (opts.duration_s * f64::from(hz)).round() as u64;
            let mut monitor = monitor;
            let s = spiro_core::run_direct_until(
                &mut sensor,
                &mut monitor,
                &params,
                samples,
                shutdown,
                |ev| printer.on_event(ev),
            )?;
            RunSummary {
                samples: s.samples,
                breaths: s.breaths,
                read_failures: s.read_failures,
                dropped_events: 0,
                latest: s.latest,
                latest_breath: s.latest_breath,
                stats: s.stats,
                drift: Some(s.drift),
            }
        }
        SamplingMode::Paced(_) => run_paced(sensor, monitor, &params, opts, shutdown, &mut printer)?,
    };

    print_summary(&summary, opts);
    Ok(summary)
}

fn run_paced(
    sensor: BoxedSensor,
    monitor: Monitor,
    params: &RunParams,
    opts: &MonitorOpts,
    shutdown: &Arc<AtomicBool>,
    printer: &mut Printer,
) -> CoreResult<RunSummary> {
    let mut runner = MonitorRunner::spawn(sensor, monitor, params, MonotonicClock::new());
    let deadline = Instant::now() + Duration::from_secs_f64(opts.duration_s);

    while Instant::now() < deadline && !shutdown.load(Ordering::Relaxed) {
        match runner.events().recv_timeout(Duration::from_millis(100)) {
            Ok(ev) => printer.on_event(&ev),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    runner.stop();
    for ev in runner.events().try_iter() {
        printer.on_event(&ev);
    }

    let counters = runner.counters();
    if counters.ticks == 0
        && counters.read_failures > 0
        && let Some(error) = printer.last_fault.take()
    {
        return Err(eyre::Report::new(error)).wrap_err(format!(
            "no sensor read succeeded in {} attempts",
            counters.read_failures
        ));
    }
    Ok(RunSummary {
        samples: counters.ticks,
        breaths: counters.breaths,
        read_failures: counters.read_failures,
        dropped_events: counters.dropped_events,
        latest: runner.latest_parameters(),
        latest_breath: runner.latest_breath(),
        stats: std::mem::take(&mut printer.stats),
        drift: printer.drift.take(),
    })
}

fn stats_json(stats: &[(Parameter, StatSummary)]) -> Value {
    let mut obj = serde_json::Map::new();
    for (p, s) in stats {
        obj.insert(
            p.name().to_string(),
            json!({
                "n": s.n,
                "mean": s.mean,
                "min": s.min,
                "max": s.max,
                "stderr": s.stderr,
                "pct_err": s.pct_err,
            }),
        );
    }
    Value::Object(obj)
}

fn print_summary(s: &RunSummary, opts: &MonitorOpts) {
    if opts.json {
        let mut obj = json!({
            "samples": s.samples,
            "breaths": s.breaths,
            "read_failures": s.read_failures,
            "latest": s
                .latest
                .zip(s.latest_breath)
                .map(|(p, n)| breath_json(n, &p)),
            "drift": s.drift.as_ref().map(DriftModel::name),
        });
        if opts.stats {
            obj["dropped_events"] = json!(s.dropped_events);
            obj["stats"] = stats_json(&s.stats);
        }
        println!("{}", json!({ "summary": obj }));
        return;
    }

    println!(
        "Monitoring complete: {} samples, {} breaths, {} read failures.",
        s.samples, s.breaths, s.read_failures
    );
    if let Some(p) = &s.latest {
        println!(
            "Latest: vt {} L, rr {} /min, ie {}, compliance {} L/cmH2O",
            fmt_measure(p.vt, 3),
            fmt_measure(p.rr, 1),
            fmt_measure(p.ie, 2),
            fmt_measure(p.compliance, 4),
        );
    }
    if opts.stats {
        eprintln!("\n--- Breath Stats (last {} breaths) ---", stats_window(&s.stats));
        for (p, st) in &s.stats {
            let pct = st.pct_err.map_or_else(|| "-".to_string(), |v| format!("{v:.1}%"));
            eprintln!(
                "{:<13} mean {:>9.3}  min {:>9.3}  max {:>9.3}  se {:>8.4}  ({pct})",
                p.name(),
                st.mean,
                st.min,
                st.max,
                st.stderr
            );
        }
        eprintln!("Dropped events: {}", s.dropped_events);
        if let Some(d) = &s.drift {
            eprintln!("Drift model: {}", d.name());
        }
        eprintln!("-------------------------------------\n");
    }
}

fn stats_window(stats: &[(Parameter, StatSummary)]) -> usize {
    stats.iter().map(|(_, s)| s.n).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_fields_serialize_as_null() {
        let v = breath_json(3, &BreathParameters::unavailable());
        assert_eq!(v["breath"], 3);
        for key in ["tsi", "vt", "rr", "compliance", "mve_measured"] {
            assert!(v[key].is_null(), "{key}");
        }
    }

    #[test]
    fn measures_format_by_kind() {
        assert_eq!(fmt_measure(Measure::Value(0.5), 3), "0.500");
        assert_eq!(fmt_measure(Measure::NoData, 3), "-");
        assert_eq!(fmt_measure(Measure::Indeterminate, 3), "?");
    }
}
