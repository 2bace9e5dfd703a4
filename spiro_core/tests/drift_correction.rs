//! A constant 2 L/min flow bias on ±30 L/min breathing makes the raw volume
//! climb 1/15 L per breath; drift correction pins the troughs back to zero.

use std::sync::Arc;
use std::time::Duration;

use spiro_core::drift::{fit_linear, fit_pinned};
use spiro_core::{
    CalibrationStore, DriftCfg, DriftEstimator, DriftModel, DriftStrategy, IntegratorCfg, Monitor,
    PeakCfg, PeakParams, Phase, RunParams, VolumeIntegrator, run_direct, volume_minima,
};
use spiro_traits::{PressureReading, PressureSensor};

const HZ: u32 = 100;
const BIAS: f64 = 2.0;

fn flow_at(k: u32) -> f64 {
    let f = if (k / HZ) % 2 == 0 { 30.0 } else { -30.0 };
    f + BIAS
}

/// Integrator with zeroing effectively disabled, so only drift is under test.
fn integrator() -> VolumeIntegrator {
    VolumeIntegrator::new(
        IntegratorCfg {
            noise_dfdt: 0.0,
            noise_flow: 0.0,
            apnea_timeout_s: 1e9,
        },
        HZ,
    )
}

fn run(v: &mut VolumeIntegrator, ks: std::ops::Range<u32>) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let (mut t, mut raw, mut corrected) = (Vec::new(), Vec::new(), Vec::new());
    for k in ks {
        let tk = f64::from(k) / f64::from(HZ);
        let out = v.update(tk, flow_at(k), 0.0, Phase::Exhaling);
        t.push(tk);
        raw.push(out.raw);
        corrected.push(out.corrected);
    }
    (t, raw, corrected)
}

/// End-of-expiration samples: the last one of every 2 s cycle.
fn troughs(start_k: u32, len: usize) -> Vec<usize> {
    (0..len)
        .filter(|&i| (start_k as usize + i) % (2 * HZ as usize) == 2 * HZ as usize - 1)
        .collect()
}

/// Trough finder for a corrected trace, whose troughs sit at zero rather than below it.
fn trough_params() -> PeakParams {
    PeakParams {
        min_height: None,
        ..PeakParams::from_cfg(&PeakCfg::default(), f64::from(HZ))
    }
}

#[test]
fn linear_correction_pins_troughs_to_zero() {
    let mut v = integrator();
    let (t, raw, _) = run(&mut v, 0..20 * HZ);
    let idx = troughs(0, t.len());
    assert_eq!(idx.len(), 10);

    // Raw troughs climb with the bias.
    let last_raw = raw[*idx.last().unwrap()];
    assert!(last_raw > 0.3, "raw trough {last_raw}");

    let model = fit_linear(&t, &raw, 0.05).unwrap();
    let corrected = model.correct(&t, &raw);
    let detected = volume_minima(&corrected, &trough_params());
    // Interior troughs only; the last sample is an edge.
    assert!(detected.len() >= 8, "{detected:?}");
    assert!(detected.iter().all(|i| idx.contains(i)), "{detected:?}");
    for &i in &detected {
        assert!(corrected[i].abs() < 0.01, "t = {}: {}", t[i], corrected[i]);
    }

    // Applied live, the model keeps later troughs near zero as well.
    v.set_drift(model);
    let (t2, raw2, corrected2) = run(&mut v, 20 * HZ..30 * HZ);
    let detected = volume_minima(&corrected2, &trough_params());
    assert!(detected.len() >= 4, "{detected:?}");
    for i in detected {
        assert!(raw2[i] > 0.6);
        assert!(corrected2[i].abs() < 0.01, "t = {}: {}", t2[i], corrected2[i]);
    }
}

#[test]
fn uncorrected_troughs_do_not_converge() {
    let mut v = integrator();
    let (t, raw, corrected) = run(&mut v, 0..20 * HZ);
    let idx = troughs(0, t.len());
    let first = corrected[idx[0]];
    let last = corrected[*idx.last().unwrap()];
    assert_eq!(raw, corrected);
    assert!(last - first > 0.5);
}

#[test]
fn pinned_correction_zeroes_every_detected_trough() {
    let mut v = integrator();
    let (t, raw, _) = run(&mut v, 0..20 * HZ);
    let params = PeakParams::from_cfg(&PeakCfg::default(), f64::from(HZ));
    let model = fit_pinned(&t, &raw, &params).unwrap();
    let DriftModel::Pinned { knots } = &model else {
        panic!("expected pinned model, got {model:?}");
    };
    assert!(knots.len() >= 8, "{} knots", knots.len());

    let corrected = model.correct(&t, &raw);
    // Interior troughs; the final sample is an edge and never a detected minimum.
    for &i in troughs(0, t.len()).iter().take(9) {
        assert!(corrected[i].abs() < 1e-9, "t = {}: {}", t[i], corrected[i]);
    }
}

#[test]
fn estimator_uses_configured_strategy() {
    let mut v = integrator();
    let (t, raw, _) = run(&mut v, 0..30 * HZ);

    let disabled = DriftEstimator::new(
        DriftCfg {
            strategy: DriftStrategy::Disabled,
            ..DriftCfg::default()
        },
        HZ,
    );
    assert_eq!(disabled.estimate(&t, &raw), Some(DriftModel::Identity));

    let linear = DriftEstimator::new(DriftCfg::default(), HZ);
    assert!(matches!(
        linear.estimate(&t, &raw),
        Some(DriftModel::Linear { .. })
    ));

    let spline = DriftEstimator::new(
        DriftCfg {
            strategy: DriftStrategy::Spline,
            ..DriftCfg::default()
        },
        HZ,
    );
    assert!(matches!(
        spline.estimate(&t, &raw),
        Some(DriftModel::Pinned { .. })
    ));
    // A flat trace has no minima: keep whatever model is in use.
    let flat = vec![0.0; t.len()];
    assert_eq!(spline.estimate(&t, &flat), None);
}

/// Biased ±30 L/min square wave read through a unit calibration.
struct BiasedSquare {
    k: u32,
}

impl PressureSensor for BiasedSquare {
    fn read(
        &mut self,
        _timeout: Duration,
    ) -> Result<PressureReading, Box<dyn std::error::Error + Send + Sync>> {
        let flow = flow_at(self.k);
        self.k += 1;
        Ok(PressureReading::new(5.0, 5.0 + flow))
    }
}

#[test]
fn live_linear_correction_zeroes_detected_minima_in_the_monitor() {
    let mut store = CalibrationStore::new(50.0);
    store.insert("unit", vec![1.0, 0.0]).unwrap();
    let mut monitor = Monitor::builder()
        .with_calibration(Arc::new(store), "unit")
        .build()
        .unwrap();
    let params = RunParams::default();
    assert_eq!(params.drift.strategy, DriftStrategy::Linear);

    let mut sensor = BiasedSquare { k: 0 };
    let samples = 40 * u64::from(HZ);
    let summary = run_direct(&mut sensor, &mut monitor, &params, samples, |_| {}).unwrap();
    assert!(matches!(summary.drift, DriftModel::Linear { .. }));

    let snap = monitor.snapshot();
    let tail = snap.len() - 15 * HZ as usize;
    let volume = &snap.volume[tail..];
    let detected = volume_minima(volume, &trough_params());
    assert!(detected.len() >= 6, "{detected:?}");
    for i in detected {
        assert!(
            volume[i].abs() < 0.02,
            "t = {}: corrected {}",
            snap.time[tail + i],
            volume[i]
        );
    }
}
