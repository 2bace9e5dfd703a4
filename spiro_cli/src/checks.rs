//! check-calibration, self-check and health.

use serde_json::json;
use spiro_config::Config;
use spiro_core::error::Result as CoreResult;
use spiro_core::hw_error::map_hw_error;
use spiro_core::{CalibrationStore, FlowModel};
use spiro_traits::PressureSensor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::monitor::{build_monitor, load_store, make_sensor};

const DEFAULT_DP: [f64; 4] = [0.1, 0.5, 1.0, 2.0];

/// Print flow for each dp value through every configured table.
pub fn check_calibration(cfg: &Config, base: &Path, dp: &[f64], json: bool) -> CoreResult<()> {
    let store = load_store(cfg, base)?;
    let dp = if dp.is_empty() { &DEFAULT_DP[..] } else { dp };

    for id in store.mouthpieces() {
        let model = FlowModel::new(Arc::clone(&store), id).map_err(eyre::Report::new)?;
        let flows: Vec<f64> = dp.iter().map(|&x| model.apply(x)).collect();
        if json {
            println!(
                "{}",
                json!({
                    "mouthpiece": id,
                    "active": id.eq_ignore_ascii_case(&cfg.calibration.mouthpiece),
                    "coefficients": model.polynomial().coefficients(),
                    "dp": dp,
                    "flow": flows,
                })
            );
        } else {
            let marker = if id.eq_ignore_ascii_case(&cfg.calibration.mouthpiece) {
                " (active)"
            } else {
                ""
            };
            println!("{id}{marker}: {:?}", model.polynomial().coefficients());
            for (x, f) in dp.iter().zip(&flows) {
                println!("  dp {x:>7.3} cmH2O -> {f:>9.3} L/min");
            }
        }
    }
    Ok(())
}

/// Config and calibration load, the monitor builds, one sensor read succeeds.
pub fn self_check(cfg: &Config, base: &Path) -> CoreResult<()> {
    let store = load_store(cfg, base)?;
    let mut sensor = make_sensor(cfg, base, None)?;
    let monitor = build_monitor(cfg, store, &mut sensor)?;
    let reading = sensor
        .read(Duration::from_millis(cfg.sensor.read_timeout_ms))
        .map_err(|e| eyre::Report::new(map_hw_error(&*e)))?;
    tracing::debug!(p1 = reading.p1, p2 = reading.p2, "self-check read");
    println!(
        "OK: mouthpiece {}, {} Hz, dp offset {:.4} cmH2O",
        monitor.mouthpiece(),
        monitor.sample_rate_hz(),
        monitor.zero_offset()
    );
    Ok(())
}

/// JSON status object; calibration problems are reported, not raised.
pub fn health(cfg: &Config, base: &Path) -> CoreResult<()> {
    let calibration = CalibrationStore::from_config(&cfg.calibration, base);
    let status = if calibration.is_ok() { "ok" } else { "degraded" };
    let mut obj = json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "sample_rate_hz": cfg.sensor.sample_rate_hz,
        "mouthpiece": cfg.calibration.mouthpiece,
        "runner": format!("{:?}", cfg.runner.mode).to_lowercase(),
        "drift": format!("{:?}", cfg.drift.strategy).to_lowercase(),
    });
    match calibration {
        Ok(store) => obj["calibrations"] = json!(store.mouthpieces().collect::<Vec<_>>()),
        Err(e) => obj["error"] = json!(e.to_string()),
    }
    println!("{obj}");
    Ok(())
}
