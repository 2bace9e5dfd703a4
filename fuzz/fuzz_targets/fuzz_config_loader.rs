#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse or validation errors are fine; panics are not.
    let parsed = toml::from_str::<spiro_config::Config>(data);
    // The crate's loader accepts exactly what serde does.
    assert_eq!(parsed.is_ok(), spiro_config::load_toml(data).is_ok());
    if let Ok(cfg) = parsed {
        let _ = cfg.validate();
    }
});
