#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(table) = spiro_config::parse_calibration_table(data) {
        // An accepted table is never empty and holds only finite numbers.
        assert!(!table.coefficients.is_empty());
        assert!(table.coefficients.iter().all(|c| c.is_finite()));
    }
});
