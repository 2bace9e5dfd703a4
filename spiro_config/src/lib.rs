#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and calibration table parsing for the respiratory monitor.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - Flow calibration tables are tab-delimited: one header row, then a single
//!   row of polynomial coefficients ordered highest degree first.
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct SensorCfg {
    /// Fast-cadence sampling rate.
    pub sample_rate_hz: u32,
    /// Per-read timeout handed to the sensor.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Zero-flow readings averaged into the dp offset at startup (0 disables).
    #[serde(default = "default_zero_samples")]
    pub zero_samples: usize,
    /// Median prefilter length applied to dp (1 disables).
    #[serde(default = "default_median_window")]
    pub median_window: usize,
}

const fn default_read_timeout_ms() -> u64 {
    20
}
const fn default_zero_samples() -> usize {
    100
}
const fn default_median_window() -> usize {
    1
}

#[derive(Debug, Deserialize)]
pub struct CalibrationCfg {
    /// Mouthpiece selected at startup; must be a key of `tables`.
    pub mouthpiece: String,
    /// Base directory for relative table paths.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Upper bound of the |dp| domain checked for monotonicity.
    #[serde(default = "default_max_dp")]
    pub max_dp_cmh2o: f64,
    /// Mouthpiece id -> calibration table path.
    #[serde(default)]
    pub tables: BTreeMap<String, PathBuf>,
}

const fn default_max_dp() -> f64 {
    10.0
}

impl CalibrationCfg {
    /// Resolve a configured table path against `dir`, or `base` when `dir` is unset.
    pub fn resolve(&self, path: &Path, base: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match &self.dir {
            Some(dir) if dir.is_absolute() => dir.join(path),
            Some(dir) => base.join(dir).join(path),
            None => base.join(path),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BufferCfg {
    /// Seconds of history kept per streamed channel.
    pub history_s: f64,
}

impl Default for BufferCfg {
    fn default() -> Self {
        Self { history_s: 60.0 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SegmenterCfg {
    /// Samples spanned by the smoothed flow derivative.
    pub derivative_window: usize,
    /// Inspiration start: derivative must exceed this, (L/min)/s.
    pub inhale_dfdt: f64,
    /// Inspiration start: flow must exceed this, L/min.
    pub inhale_flow: f64,
    pub inhale_refractory_s: f64,
    /// End-of-inspiration marker: derivative must fall below this (negative).
    pub exhale_dfdt: f64,
    /// End-of-inspiration marker: flow must fall below this (negative).
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IntegratorCfg {
    /// Flat-signal floor for |dflow/dt|, (L/min)/s.
    pub noise_dfdt: f64,
    /// Flat-signal floor for |flow|, L/min.
    pub noise_flow: f64,
    /// Volume is pinned to zero once this long passes without an inspiration start.
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

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DriftStrategy {
    #[serde(alias = "none")]
    Disabled,
    #[default]
    Linear,
    Spline,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DriftCfg {
    pub strategy: DriftStrategy,
    /// Trailing window of raw volume used for each fit.
    pub window_s: f64,
    /// Clamp for the fitted linear slope, L/s.
    pub max_slope_l_per_s: f64,
    /// Minima finder used by the spline strategy.
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ParametersCfg {
    pub peep_window_s: f64,
    pub plateau_window_s: f64,
    /// Trailing flow history integrated for measured minute volume.
    pub mve_window_s: f64,
    /// Smallest |tei - tsi| (s) for which I:E is computed.
    pub min_denominator: f64,
    /// Smallest |pp - peep| (cmH2O) for which compliance is computed.
    pub min_driving_pressure_cmh2o: f64,
    /// Values kept per parameter for rolling statistics.
    pub stats_len: usize,
}

impl Default for ParametersCfg {
    fn default() -> Self {
        Self {
            peep_window_s: 0.05,
            plateau_window_s: 0.05,
            mve_window_s: 60.0,
            min_denominator: 1e-3,
            min_driving_pressure_cmh2o: 0.5,
            stats_len: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CadenceCfg {
    /// Slow cadence period (drift refit, statistics, snapshots).
    pub slow_period_ms: u64,
    /// Capacity of the outbound event channel.
    pub event_capacity: usize,
}

impl Default for CadenceCfg {
    fn default() -> Self {
        Self {
            slow_period_ms: 1000,
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Two timer-driven cadence threads.
    #[default]
    Paced,
    /// Inline processing as fast as the sensor yields samples.
    Direct,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RunnerCfg {
    pub mode: RunMode,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulationCfg {
    pub rr_bpm: f64,
    /// Expiratory over inspiratory duration.
    pub ie_ratio: f64,
    pub peak_dp_cmh2o: f64,
    pub pip_cmh2o: f64,
    pub peep_cmh2o: f64,
    pub bias_dp_cmh2o: f64,
    pub noise_cmh2o: f64,
    pub seed: u32,
    /// Replay this recording instead of synthesizing breaths.
    pub replay: Option<PathBuf>,
}

impl Default for SimulationCfg {
    fn default() -> Self {
        Self {
            rr_bpm: 15.0,
            ie_ratio: 2.0,
            peak_dp_cmh2o: 1.0,
            pip_cmh2o: 20.0,
            peep_cmh2o: 5.0,
            bias_dp_cmh2o: 0.0,
            noise_cmh2o: 0.0,
            seed: 0x5eed,
            replay: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub sensor: SensorCfg,
    pub calibration: CalibrationCfg,
    #[serde(default)]
    pub buffer: BufferCfg,
    #[serde(default)]
    pub segmenter: SegmenterCfg,
    #[serde(default)]
    pub integrator: IntegratorCfg,
    #[serde(default)]
    pub drift: DriftCfg,
    #[serde(default)]
    pub parameters: ParametersCfg,
    #[serde(default)]
    pub cadence: CadenceCfg,
    #[serde(default)]
    pub runner: RunnerCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub simulation: SimulationCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Polynomial coefficients read from one calibration table, highest degree first.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowCalibration {
    pub coefficients: Vec<f64>,
}

/// Parse a tab-delimited calibration table.
///
/// The first row is a header and only fixes the expected column count. Exactly
/// one coefficient row must follow.
pub fn parse_calibration_table<R: Read>(rdr: R) -> eyre::Result<FlowCalibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(rdr);

    let columns = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read calibration header: {}", e))?
        .len();
    if columns == 0 {
        eyre::bail!("calibration table header is empty");
    }

    let mut coefficients: Option<Vec<f64>> = None;
    for (idx, rec) in rdr.records().enumerate() {
        let line = idx + 2;
        let rec = rec.map_err(|e| eyre::eyre!("invalid calibration row {}: {}", line, e))?;
        if rec.iter().all(str::is_empty) {
            continue;
        }
        if coefficients.is_some() {
            eyre::bail!("calibration table must contain exactly one coefficient row (extra row {line})");
        }
        if rec.len() != columns {
            eyre::bail!(
                "calibration row {} has {} columns, header has {}",
                line,
                rec.len(),
                columns
            );
        }
        let mut row = Vec::with_capacity(columns);
        for field in &rec {
            let c: f64 = field
                .parse()
                .map_err(|_| eyre::eyre!("invalid coefficient '{}' in calibration row {}", field, line))?;
            if !c.is_finite() {
                eyre::bail!("non-finite coefficient '{}' in calibration row {}", field, line);
            }
            row.push(c);
        }
        coefficients = Some(row);
    }

    match coefficients {
        Some(coefficients) => Ok(FlowCalibration { coefficients }),
        None => eyre::bail!("calibration table has no coefficient row"),
    }
}

pub fn load_calibration_table(path: &Path) -> eyre::Result<FlowCalibration> {
    let file = std::fs::File::open(path)
        .map_err(|e| eyre::eyre!("open calibration table {:?}: {}", path, e))?;
    parse_calibration_table(file).map_err(|e| e.wrap_err(format!("calibration table {path:?}")))
}

#[inline]
fn positive(x: f64) -> bool {
    x.is_finite() && x > 0.0
}

#[inline]
fn non_negative(x: f64) -> bool {
    x.is_finite() && x >= 0.0
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Sensor
        if self.sensor.sample_rate_hz == 0 {
            eyre::bail!("sensor.sample_rate_hz must be > 0");
        }
        if self.sensor.sample_rate_hz > 1000 {
            eyre::bail!("sensor.sample_rate_hz must be <= 1000");
        }
        if self.sensor.read_timeout_ms == 0 {
            eyre::bail!("sensor.read_timeout_ms must be >= 1");
        }
        if self.sensor.median_window == 0 {
            eyre::bail!("sensor.median_window must be >= 1");
        }

        // Calibration
        if self.calibration.mouthpiece.trim().is_empty() {
            eyre::bail!("calibration.mouthpiece must not be empty");
        }
        if self.calibration.tables.is_empty() {
            eyre::bail!("calibration.tables must list at least one mouthpiece");
        }
        if !positive(self.calibration.max_dp_cmh2o) {
            eyre::bail!("calibration.max_dp_cmh2o must be > 0");
        }

        // Buffer
        if !positive(self.buffer.history_s) {
            eyre::bail!("buffer.history_s must be > 0");
        }

        // Segmenter
        let seg = &self.segmenter;
        if seg.derivative_window == 0 {
            eyre::bail!("segmenter.derivative_window must be >= 1");
        }
        if !positive(seg.inhale_dfdt) {
            eyre::bail!("segmenter.inhale_dfdt must be > 0");
        }
        if !positive(-seg.exhale_dfdt) {
            eyre::bail!("segmenter.exhale_dfdt must be < 0");
        }
        if !non_negative(seg.inhale_flow) {
            eyre::bail!("segmenter.inhale_flow must be >= 0");
        }
        if !non_negative(-seg.exhale_flow) {
            eyre::bail!("segmenter.exhale_flow must be <= 0");
        }
        if !non_negative(seg.inhale_refractory_s) || !non_negative(seg.exhale_refractory_s) {
            eyre::bail!("segmenter refractory periods must be >= 0");
        }

        // Integrator
        if !non_negative(self.integrator.noise_dfdt) || !non_negative(self.integrator.noise_flow) {
            eyre::bail!("integrator noise floors must be >= 0");
        }
        if !positive(self.integrator.apnea_timeout_s) {
            eyre::bail!("integrator.apnea_timeout_s must be > 0");
        }

        // Drift
        if !positive(self.drift.window_s) {
            eyre::bail!("drift.window_s must be > 0");
        }
        if !non_negative(self.drift.max_slope_l_per_s) {
            eyre::bail!("drift.max_slope_l_per_s must be >= 0");
        }
        if !non_negative(self.drift.peaks.min_distance_s) {
            eyre::bail!("drift.peaks.min_distance_s must be >= 0");
        }

        // Parameters
        let p = &self.parameters;
        if !non_negative(p.peep_window_s) || !non_negative(p.plateau_window_s) {
            eyre::bail!("parameters pressure windows must be >= 0");
        }
        if !positive(p.mve_window_s) {
            eyre::bail!("parameters.mve_window_s must be > 0");
        }
        if !positive(p.min_denominator) {
            eyre::bail!("parameters.min_denominator must be > 0");
        }
        if !non_negative(p.min_driving_pressure_cmh2o) {
            eyre::bail!("parameters.min_driving_pressure_cmh2o must be >= 0");
        }
        if p.stats_len == 0 {
            eyre::bail!("parameters.stats_len must be >= 1");
        }

        // Cadence
        if self.cadence.slow_period_ms == 0 {
            eyre::bail!("cadence.slow_period_ms must be >= 1");
        }
        if self.cadence.event_capacity == 0 {
            eyre::bail!("cadence.event_capacity must be >= 1");
        }

        // Simulation
        if !positive(self.simulation.rr_bpm) {
            eyre::bail!("simulation.rr_bpm must be > 0");
        }
        if !positive(self.simulation.ie_ratio) {
            eyre::bail!("simulation.ie_ratio must be > 0");
        }

        // Runner: no extra validation; serde restricts to known modes

        Ok(())
    }
}
