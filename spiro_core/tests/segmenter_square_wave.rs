//! 60 s of ±30 L/min square-wave breathing at 100 Hz through the full pipeline.

use std::sync::Arc;

use rstest::rstest;
use spiro_core::{CalibrationStore, Monitor, SamplingCfg, SegmentEvent};
use spiro_traits::PressureReading;

const HZ: u32 = 100;

/// Identity calibration so dp in cmH2O reads directly as L/min.
fn monitor() -> Monitor {
    let mut store = CalibrationStore::new(10.0);
    store.insert("unit", vec![1.0, 0.0]).unwrap();
    Monitor::builder()
        .with_calibration(Arc::new(store), "unit")
        .build()
        .unwrap()
}

/// `lead_in` samples of silence, then alternating 1 s of +30 and 1 s of -30.
fn square_flow(k: u32, lead_in: u32) -> f64 {
    if k < lead_in {
        return 0.0;
    }
    if ((k - lead_in) / HZ) % 2 == 0 { 30.0 } else { -30.0 }
}

#[rstest]
#[case::opens_mid_inspiration(0)]
#[case::opens_at_rest(HZ / 2)]
fn thirty_breaths_at_rr_30_and_ie_1(#[case] lead_in: u32) {
    let offset = f64::from(lead_in) / f64::from(HZ);
    let mut m = monitor();
    let mut inhales = Vec::new();
    let mut markers = 0;
    let mut closed = Vec::new();

    for k in 0..60 * HZ {
        let t = f64::from(k) / f64::from(HZ);
        let tick = m
            .process(t, PressureReading::new(0.0, square_flow(k, lead_in)))
            .unwrap();
        match tick.event {
            Some(SegmentEvent::InhaleStart) => inhales.push(t),
            Some(SegmentEvent::ExhaleMarker) => markers += 1,
            None => {}
        }
        if let Some(c) = tick.closed {
            closed.push(c);
        }
    }

    assert_eq!(inhales.len(), 30, "inhales at {inhales:?}");
    assert_eq!(markers, 30);
    for (i, t) in inhales.iter().enumerate() {
        assert!((t - (offset + 2.0 * i as f64)).abs() < 1e-9);
    }
    for pair in inhales.windows(2) {
        assert!(pair[1] - pair[0] >= 0.75);
    }

    // The first inspiration start closes nothing.
    assert_eq!(closed.len(), 29);
    for c in &closed {
        let p = c.parameters;
        assert!(p.is_available());
        let rr = p.rr.value().unwrap();
        let ie = p.ie.value().unwrap();
        assert!((rr - 30.0).abs() <= 0.3, "rr = {rr}");
        assert!((ie - 1.0).abs() <= 0.01, "ie = {ie}");
        // 1 s at 30 L/min
        let vt = p.vt.value().unwrap();
        assert!((vt - 0.5).abs() < 0.02, "vt = {vt}");
    }
    assert_eq!(m.breaths(), 30);
    assert!(m.latest_parameters().is_some());
}

#[test]
fn median_prefilter_swallows_single_sample_spike() {
    let mut store = CalibrationStore::new(10.0);
    store.insert("unit", vec![1.0, 0.0]).unwrap();
    let mut m = Monitor::builder()
        .with_calibration(Arc::new(store), "unit")
        .with_sampling(SamplingCfg {
            median_window: 3,
            ..SamplingCfg::default()
        })
        .build()
        .unwrap();
    for k in 0..300u32 {
        let t = f64::from(k) / f64::from(HZ);
        let dp = if k == 150 { 40.0 } else { 0.0 };
        let tick = m.process(t, PressureReading::new(0.0, dp)).unwrap();
        assert_eq!(tick.event, None, "spurious event at t = {t}");
        assert_eq!(tick.sample.flow, 0.0);
    }
    assert_eq!(m.breaths(), 0);
    assert!(m.latest_parameters().is_none());
}
