use std::sync::Arc;

use rstest::rstest;
use spiro_core::{
    BufferCfg, CalibrationError, CalibrationStore, Monitor, MonitorError, Phase, SegmentEvent,
};
use spiro_traits::PressureReading;

const HZ: u32 = 100;

fn store() -> Arc<CalibrationStore> {
    let mut store = CalibrationStore::new(10.0);
    store.insert("unit", vec![1.0, 0.0]).unwrap();
    store.insert("double", vec![2.0, 0.0]).unwrap();
    Arc::new(store)
}

fn monitor(history_s: f64) -> Monitor {
    Monitor::builder()
        .with_calibration(store(), "unit")
        .with_buffer(BufferCfg { history_s })
        .build()
        .unwrap()
}

/// Airway pressure 10 cmH2O, dp chosen so the unit calibration yields `flow`.
fn reading(flow: f64) -> PressureReading {
    PressureReading::new(10.0, 10.0 + flow)
}

fn square(k: u32) -> f64 {
    if (k / HZ) % 2 == 0 { 30.0 } else { -30.0 }
}

fn t(k: u32) -> f64 {
    f64::from(k) / f64::from(HZ)
}

#[test]
fn snapshot_channels_stay_aligned_and_bounded() {
    let mut m = monitor(2.0);
    for k in 0..500 {
        m.process(t(k), reading(square(k))).unwrap();
    }
    let snap = m.snapshot();
    assert_eq!(snap.len(), 200);
    for len in [
        snap.pressure.len(),
        snap.flow.len(),
        snap.volume.len(),
        snap.volume_raw.len(),
        snap.inspiration.len(),
    ] {
        assert_eq!(len, 200);
    }
    assert_eq!(snap.t_end(), Some(t(499)));
    assert!((snap.time[0] - t(300)).abs() < 1e-12);
    assert!(snap.pressure.iter().all(|&p| p == 10.0));
    assert!(snap.time.windows(2).all(|w| w[0] < w[1]));
}

#[rstest]
#[case::nan_pressure(0.05, PressureReading::new(f64::NAN, 1.0))]
#[case::infinite_pressure(0.05, PressureReading::new(0.0, f64::INFINITY))]
#[case::nan_time(f64::NAN, PressureReading::new(0.0, 1.0))]
#[case::repeated_time(0.04, PressureReading::new(0.0, 1.0))]
#[case::time_went_back(0.01, PressureReading::new(0.0, 1.0))]
fn rejected_samples_leave_state_untouched(#[case] at: f64, #[case] r: PressureReading) {
    let mut m = monitor(60.0);
    for k in 0..5 {
        m.process(t(k), reading(1.0)).unwrap();
    }
    let before = m.snapshot();

    let err = m.process(at, r).unwrap_err();
    assert!(matches!(err, MonitorError::InvalidSample(_)), "{err:?}");

    assert_eq!(m.snapshot().time, before.time);
    // The stream continues where it left off.
    m.process(t(5), reading(1.0)).unwrap();
    assert_eq!(m.buffers().len(), 6);
}

#[test]
fn zero_offset_is_removed_before_calibration() {
    let mut m = Monitor::builder()
        .with_calibration(store(), "unit")
        .with_zero_offset(0.4)
        .build()
        .unwrap();
    let tick = m.process(0.0, PressureReading::new(1.0, 1.4)).unwrap();
    assert!(tick.sample.dp.abs() < 1e-12);
    assert!(tick.sample.flow.abs() < 1e-12);

    m.set_zero_offset(0.0);
    let tick = m.process(0.01, PressureReading::new(1.0, 1.4)).unwrap();
    assert!((tick.sample.flow - 0.4).abs() < 1e-12);
}

#[test]
fn zero_offset_estimate_ignores_bad_readings() {
    let readings = [
        PressureReading::new(1.0, 1.5),
        PressureReading::new(f64::NAN, 3.0),
        PressureReading::new(2.0, 2.7),
    ];
    let offset = Monitor::estimate_zero_offset(&readings).unwrap();
    assert!((offset - 0.6).abs() < 1e-12);
    assert_eq!(Monitor::estimate_zero_offset(&[]), None);
}

#[test]
fn unknown_mouthpiece_keeps_previous_calibration() {
    let mut m = monitor(60.0);
    let err = m.set_mouthpiece("missing").unwrap_err();
    assert!(matches!(err, CalibrationError::UnknownMouthpiece { .. }));
    assert_eq!(m.mouthpiece(), "unit");
    let tick = m.process(0.0, reading(3.0)).unwrap();
    assert!((tick.sample.flow - 3.0).abs() < 1e-12);

    m.set_mouthpiece("DOUBLE").unwrap();
    let tick = m.process(0.01, reading(3.0)).unwrap();
    assert!((tick.sample.flow - 6.0).abs() < 1e-12);
}

#[test]
fn snapshot_drains_parameter_records() {
    let mut m = monitor(60.0);
    let mut closed = 0;
    for k in 0..1000 {
        if m.process(t(k), reading(square(k))).unwrap().closed.is_some() {
            closed += 1;
        }
    }
    assert!(closed >= 3, "closed {closed}");
    let first = m.snapshot();
    assert_eq!(first.parameters.len(), closed);
    assert_eq!(first.breaths, m.breaths());
    assert!(first.latest.is_some_and(|p| p.is_available()));

    let second = m.snapshot();
    assert!(second.parameters.is_empty());
    assert_eq!(second.latest, first.latest);
}

#[test]
fn inspiration_channel_tracks_phase() {
    let mut m = monitor(60.0);
    let mut saw_inhale = false;
    for k in 0..400 {
        let tick = m.process(t(k), reading(square(k))).unwrap();
        if tick.event == Some(SegmentEvent::InhaleStart) {
            saw_inhale = true;
            assert_eq!(tick.phase, Phase::Inhaling);
            assert!(m.open_window().is_some());
        }
    }
    assert!(saw_inhale);
    let snap = m.snapshot();
    assert!(snap.inspiration.iter().any(|&i| i));
    assert!(snap.inspiration.iter().any(|&i| !i));
}

#[test]
fn reset_clears_history_but_keeps_calibration() {
    let mut m = monitor(60.0);
    m.set_zero_offset(0.1);
    for k in 0..500 {
        m.process(t(k), reading(square(k))).unwrap();
    }
    m.reset();
    assert!(m.buffers().is_empty());
    assert_eq!(m.breaths(), 0);
    assert!(m.latest_parameters().is_none());
    assert!(m.open_window().is_none());
    assert_eq!(m.mouthpiece(), "unit");
    assert_eq!(m.zero_offset(), 0.1);
    // Timestamps may restart after a reset.
    m.process(0.0, reading(0.0)).unwrap();
}

#[test]
fn overlong_window_is_discarded() {
    let mut m = monitor(1.0);
    // One inhale, then 3 s of steady inspiration: the window outgrows 100 samples.
    for k in 0..300 {
        let flow = if k < 10 { 0.0 } else { 30.0 };
        m.process(t(k), reading(flow)).unwrap();
        if k == 10 {
            assert!(m.open_window().is_some());
        }
    }
    assert_eq!(m.breaths(), 1);
    assert!(m.open_window().is_none());
}
