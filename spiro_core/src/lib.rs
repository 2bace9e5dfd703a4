#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Streaming respiratory monitor core (hardware-agnostic).
//!
//! All sensor interaction goes through `spiro_traits::PressureSensor`; time
//! comes from `spiro_traits::Clock`.
//!
//! ## Pipeline
//!
//! - **Flow**: `dp = p2 - p1 - offset`, optional median prefilter, then the
//!   mouthpiece calibration polynomial (`flow`, `calibration`)
//! - **Segmentation**: derivative state machine for inspiration start and the
//!   end-of-inspiration marker; batch peak finder on volume (`segmenter`, `peaks`)
//! - **Volume**: per-sample integration with flat-signal and apnea zeroing,
//!   live drift correction (`integrator`, `drift`)
//! - **Parameters**: one record per closed breath window (`window`, `params`)
//!   and rolling statistics on the slow side (`stats`)
//!
//! ## Cadences
//!
//! `runner::MonitorRunner` spawns a fast cadence that owns the `Monitor` and
//! a slow cadence that works on `BufferSnapshot`s and sends drift models
//! back. `runner::run_direct` drives the same pipeline inline.

pub mod builder;
pub mod cadence;
pub mod calibration;
pub mod config;
pub mod conversions;
pub mod drift;
pub mod error;
pub mod flow;
pub mod hw_error;
pub mod integrator;
pub mod mocks;
pub mod monitor;
pub mod params;
pub mod peaks;
pub mod ring;
pub mod runner;
pub mod segmenter;
pub mod snapshot;
pub mod stats;
pub mod types;
pub mod util;
pub mod window;

pub use builder::{Missing, MonitorBuilder, Set};
pub use cadence::{CounterValues, MonitorEvent};
pub use calibration::{CalibrationPolynomial, CalibrationStore};
pub use config::{
    BufferCfg, DriftCfg, DriftStrategy, IntegratorCfg, ParamsCfg, PeakCfg, SamplingCfg,
    SegmenterCfg,
};
pub use drift::{DriftEstimator, DriftModel};
pub use error::{BuildError, CalibrationError, MonitorError};
pub use flow::{FlowModel, MedianPrefilter};
pub use integrator::{VolumeIntegrator, VolumeSample};
pub use monitor::{ClosedBreath, Monitor, Tick};
pub use params::{BreathParameterCalculator, BreathParameters};
pub use peaks::{PeakParams, find_peaks, volume_minima};
pub use ring::RingBuffer;
pub use runner::{
    DirectSummary, MonitorRunner, RunParams, SamplingMode, measure_zero_offset, run_direct,
    run_direct_until,
};
pub use segmenter::{BreathSegmenter, SegmentEvent};
pub use snapshot::BufferSnapshot;
pub use stats::{Parameter, ParameterStats, RollingStats, StatSummary};
pub use types::{Measure, Phase, Sample};
pub use window::BreathWindow;
