use std::fs::File;
use std::io::Write;

use rstest::rstest;
use spiro_config::{load_calibration_table, parse_calibration_table};
use tempfile::tempdir;

#[test]
fn parses_single_coefficient_row() {
    let table = "a\tb\tc\n0.5\t30.0\t0.0\n";
    let cal = parse_calibration_table(table.as_bytes()).unwrap();
    assert_eq!(cal.coefficients, vec![0.5, 30.0, 0.0]);
}

#[test]
fn tolerates_trailing_blank_line_and_padding() {
    let table = "# p2\tp1\tp0\n 1.5 \t 20.0 \t0\n\n";
    let cal = parse_calibration_table(table.as_bytes()).unwrap();
    assert_eq!(cal.coefficients, vec![1.5, 20.0, 0.0]);
}

#[rstest]
#[case("a\tb\tc\n1.0\t2.0\n", "has 2 columns, header has 3")]
#[case("a\tb\n1.0\tx\n", "invalid coefficient 'x'")]
#[case("a\tb\n1.0\tNaN\n", "non-finite coefficient")]
#[case("a\tb\n", "no coefficient row")]
#[case("a\tb\n1.0\t2.0\n3.0\t4.0\n", "exactly one coefficient row")]
fn rejects_malformed_tables(#[case] table: &str, #[case] needle: &str) {
    let err = parse_calibration_table(table.as_bytes()).expect_err("should reject");
    assert!(format!("{err}").contains(needle), "got: {err}");
}

#[test]
fn load_from_path_reports_file_name() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flow_calibration_iqspiro.txt");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "a\tb").unwrap();
    writeln!(f, "1.0").unwrap();
    drop(f);

    let err = load_calibration_table(&path).expect_err("wrong column count");
    let chain = format!("{err:#}");
    assert!(chain.contains("flow_calibration_iqspiro.txt"), "got: {chain}");
    assert!(chain.contains("columns"), "got: {chain}");
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    let err = load_calibration_table(&dir.path().join("nope.txt")).expect_err("missing");
    assert!(format!("{err}").contains("open calibration table"));
}
