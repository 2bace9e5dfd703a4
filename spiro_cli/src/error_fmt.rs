//! Human-readable error descriptions and structured JSON error formatting.

use spiro_core::error::{BuildError, CalibrationError, MonitorError};
use spiro_hardware::HwError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingCalibration => {
                "What happened: No calibration was provided to the monitor.\nLikely causes: The calibration store was not wired into the builder.\nHow to fix: Configure [calibration] and pass the store via with_calibration(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(ce) = calibration_error(err) {
        return match ce {
            CalibrationError::UnknownMouthpiece { id, known } => format!(
                "What happened: No calibration table for mouthpiece '{id}'.\nLikely causes: Typo in calibration.mouthpiece or --mouthpiece, or the table is not listed under [calibration.tables].\nHow to fix: Use one of: {known}; or add a table for '{id}'."
            ),
            CalibrationError::Malformed { mouthpiece, reason } => format!(
                "What happened: The calibration table for '{mouthpiece}' was rejected ({reason}).\nLikely causes: Wrong path, a header/row column mismatch, non-numeric coefficients, or a polynomial that is not increasing over the dp range.\nHow to fix: Check the tab-delimited table (one header row, one coefficient row, highest degree first) and calibration.max_dp_cmh2o."
            ),
            CalibrationError::InvalidCoefficients(why) => format!(
                "What happened: Invalid calibration coefficients ({why}).\nLikely causes: Empty or non-finite coefficient row.\nHow to fix: Regenerate the calibration table."
            ),
            CalibrationError::Empty => {
                "What happened: No calibration tables are configured.\nLikely causes: [calibration.tables] is missing or empty.\nHow to fix: Add at least one `id = \"path\"` entry under [calibration.tables].".to_string()
            }
        };
    }

    if let Some(me) = err.downcast_ref::<MonitorError>() {
        return match me {
            MonitorError::Timeout => {
                "What happened: Pressure sensor read timed out.\nLikely causes: Sensor disconnected or unpowered, or the timeout is too low for the sensor.\nHow to fix: Check the sensor connection and consider increasing sensor.read_timeout_ms in the config.".to_string()
            }
            MonitorError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing sections ([sensor], [calibration]) or out-of-range values.\nHow to fix: Edit the TOML config and try again."
            ),
            MonitorError::SensorFault(msg) | MonitorError::SensorRead(msg) => format!(
                "What happened: The pressure sensor failed ({msg}).\nLikely causes: Sensor fault, wiring problem, or a broken recording.\nHow to fix: Re-run with --log-level=debug for details and check the sensor."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(hw) = err.downcast_ref::<HwError>() {
        return match hw {
            HwError::Parse { line, reason } => format!(
                "What happened: The recording could not be read (line {line}: {reason}).\nLikely causes: The file is not a tab-delimited `time p1 p2 dp` recording.\nHow to fix: Fix or re-export the recording."
            ),
            HwError::EmptyRecording => {
                "What happened: The recording contains no samples.\nLikely causes: Empty file or only comment lines.\nHow to fix: Point --replay or simulation.replay at a non-empty recording.".to_string()
            }
            other => format!(
                "What happened: {other}.\nLikely causes: Missing file or permissions.\nHow to fix: Check the path and rerun."
            ),
        };
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

fn calibration_error(err: &eyre::Report) -> Option<&CalibrationError> {
    err.downcast_ref::<CalibrationError>()
        .or_else(|| match err.downcast_ref::<MonitorError>() {
            Some(MonitorError::Calibration(ce)) => Some(ce),
            _ => None,
        })
}

/// Stable exit codes: 2 config, 3 calibration, 4 sensor timeout, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    if calibration_error(err).is_some() {
        return 3;
    }
    match err.downcast_ref::<MonitorError>() {
        Some(MonitorError::Config(_)) => 2,
        Some(MonitorError::Timeout) => 4,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match exit_code_for_error(err) {
        2 => "Config",
        3 => "Calibration",
        4 => "Timeout",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    });
    if let Some(CalibrationError::UnknownMouthpiece { id, .. }) = calibration_error(err) {
        obj["details"] = json!({ "mouthpiece": id });
    }
    obj.to_string()
}
