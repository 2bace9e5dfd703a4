use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Minimal sim-mode config with one calibration table next to it
fn write_valid_config(dir: &tempfile::TempDir, extra: &str) -> PathBuf {
    fs::create_dir_all(dir.path().join("cal")).unwrap();
    fs::write(dir.path().join("cal/a.tsv"), "a\tb\tc\n10.0\t30.0\t0.0\n").unwrap();

    let toml = format!(
        r#"
[sensor]
sample_rate_hz = 100
read_timeout_ms = 50
zero_samples = 20

[calibration]
mouthpiece = "a"
dir = "cal"

[calibration.tables]
a = "a.tsv"

[runner]
mode = "direct"
{extra}
"#
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["monitor", "--duration-s", "30", "--direct"], 0, "breath", "stdout")]
#[case(&["monitor", "--duration-s", "30"], 0, "Monitoring complete", "stdout")]
#[case(&["monitor"], 2, "required", "stderr")]
#[case(&["monitor", "--duration-s", "0"], 2, "duration", "stdout")]
#[case(&["monitor", "--duration-s", "5", "--mouthpiece", "nope"], 3, "No calibration table for mouthpiece 'nope'", "stdout")]
#[case(&["check-calibration", "--dp", "0.5,1"], 0, "17.500", "stdout")]
#[case(&["check-calibration", "--dp", "0.5,1"], 0, "40.000", "stdout")]
#[case(&["self-check"], 0, "OK: mouthpiece a", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir, "");

    let mut cmd = Command::cargo_bin("spiro_cli").unwrap();
    cmd.arg("--config").arg(&cfg).arg("--log-level").arg("warn");
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn cli_reports_malformed_calibration_table() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir, "");

    let mut f = fs::File::create(dir.path().join("cal/a.tsv")).unwrap();
    writeln!(f, "a\tb\tc").unwrap();
    writeln!(f, "10.0\tthirty").unwrap();

    let mut cmd = Command::cargo_bin("spiro_cli").unwrap();
    cmd.arg("--config").arg(&cfg).arg("self-check");
    cmd.assert()
        .code(3)
        .stdout(predicate::str::contains("calibration table for 'a' was rejected"));
}

#[rstest]
fn cli_rejects_invalid_config_values() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir, "");
    let text = fs::read_to_string(&cfg)
        .unwrap()
        .replace("sample_rate_hz = 100", "sample_rate_hz = 0");
    fs::write(&cfg, text).unwrap();

    let mut cmd = Command::cargo_bin("spiro_cli").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("monitor")
        .arg("--duration-s")
        .arg("1");
    cmd.assert()
        .code(2)
        .stdout(predicate::str::contains("sample_rate_hz must be > 0"));
}

#[rstest]
fn cli_missing_config_file_is_a_config_error() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("spiro_cli").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("health");
    cmd.assert().code(2);
}

#[rstest]
fn health_reports_status_json() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir, "");

    let mut cmd = Command::cargo_bin("spiro_cli").unwrap();
    cmd.arg("--config").arg(&cfg).arg("health");
    let out = cmd.assert().success().get_output().stdout.clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["status"], "ok");
    assert_eq!(v["sample_rate_hz"], 100);
    assert_eq!(v["runner"], "direct");
    assert_eq!(v["calibrations"][0], "a");
}

#[rstest]
fn health_is_degraded_when_a_table_is_missing() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir, "");
    fs::remove_file(dir.path().join("cal/a.tsv")).unwrap();

    let mut cmd = Command::cargo_bin("spiro_cli").unwrap();
    cmd.arg("--config").arg(&cfg).arg("health");
    let out = cmd.assert().success().get_output().stdout.clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["status"], "degraded");
    assert!(v["error"].as_str().unwrap().contains("'a'"));
}

#[rstest]
fn stats_table_goes_to_stderr() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir, "");

    let mut cmd = Command::cargo_bin("spiro_cli").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("--log-level")
        .arg("error")
        .args(["monitor", "--duration-s", "40", "--stats"]);
    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Breath Stats"))
        .stderr(predicate::str::contains("rr"));
}

#[rstest]
fn replay_recording_drives_the_monitor() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir, "");

    // 0.5 s inhale at dp 1, 1.5 s exhale at dp -0.5, eight breaths
    let mut rec = String::from("# time\tp1\tp2\tdp\n");
    for i in 0..1600 {
        let t = f64::from(i) / 100.0;
        let phase = t % 2.0;
        let dp = if i < 50 {
            0.0
        } else if phase < 0.5 {
            1.0
        } else {
            -0.5
        };
        rec.push_str(&format!("{t:.2}\t10.0\t{:.3}\t{dp:.3}\n", 10.0 + dp));
    }
    let path = dir.path().join("session.tsv");
    fs::write(&path, rec).unwrap();

    let mut cmd = Command::cargo_bin("spiro_cli").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("--log-level")
        .arg("error")
        .args(["monitor", "--duration-s", "15", "--replay"])
        .arg(&path);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Monitoring complete"));
}
