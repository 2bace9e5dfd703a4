use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    fs::write(dir.path().join("a.tsv"), "a\tb\tc\n10.0\t30.0\t0.0\n").unwrap();
    let toml = r#"
[sensor]
sample_rate_hz = 100
zero_samples = 20

[calibration]
mouthpiece = "a"

[calibration.tables]
a = "a.tsv"
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

const BREATH_KEYS: [&str; 12] = [
    "tsi",
    "tei",
    "tee",
    "vt",
    "rr",
    "ie",
    "pip",
    "peep",
    "pp",
    "compliance",
    "mve_inferred",
    "mve_measured",
];

/// Every stdout line is JSON: one object per breath, then a summary.
#[rstest]
fn jsonl_breath_and_summary_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("spiro_cli").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .args(["monitor", "--duration-s", "30", "--direct", "--stats"]);

    let out = cmd.assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&out);
    let values: Vec<serde_json::Value> = stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("not JSON ({e}): {l}")))
        .collect();

    let breaths: Vec<_> = values.iter().filter(|v| v.get("breath").is_some()).collect();
    assert!(breaths.len() >= 5, "too few breath lines: {stdout}");
    for b in &breaths {
        assert!(b["breath"].is_u64());
        for key in BREATH_KEYS {
            let field = &b[key];
            assert!(
                field.is_number() || field.is_null(),
                "{key} should be number or null in {b}"
            );
        }
        let rr = b["rr"].as_f64().unwrap();
        assert!((rr - 15.0).abs() < 1.0, "rr {rr}");
    }
    let numbers: Vec<u64> = breaths.iter().map(|b| b["breath"].as_u64().unwrap()).collect();
    assert!(numbers.windows(2).all(|w| w[0] < w[1]));

    let summary = values
        .last()
        .and_then(|v| v.get("summary"))
        .expect("summary must be the last line");
    assert_eq!(summary["samples"], 3000);
    assert!(summary["breaths"].as_u64().unwrap() >= breaths.len() as u64);
    assert_eq!(summary["latest"]["breath"].as_u64(), numbers.last().copied());
    assert_eq!(summary["read_failures"], 0);
    assert_eq!(summary["drift"], "linear");
    assert!(summary["stats"]["vt"]["n"].is_u64());
    assert!(summary["dropped_events"].is_u64());
}

/// Errors under --json are a single structured object.
#[rstest]
fn jsonl_error_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("spiro_cli").unwrap();
    cmd.arg("--json")
        .arg("--config")
        .arg(&cfg)
        .args(["monitor", "--duration-s", "5", "--mouthpiece", "unknown"]);

    let out = cmd.assert().code(3).get_output().stdout.clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["reason"], "Calibration");
    assert_eq!(v["exit_code"], 3);
    assert_eq!(v["details"]["mouthpiece"], "unknown");
    assert!(v["message"].as_str().unwrap().starts_with("What happened:"));
}
