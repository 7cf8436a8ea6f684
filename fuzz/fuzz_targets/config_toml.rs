#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let raw = toml::from_str::<toml::Value>(input).ok();
    if let Ok(config) = loadfleet::fuzzing::parse_config_toml_input(input) {
        let Some(raw) = raw else {
            debug_assert!(false, "typed parse succeeded where raw parse failed");
            return;
        };
        let fan_out_given = raw.get("poll_fan_out").is_some() || raw.get("pollFanOut").is_some();
        if !fan_out_given {
            debug_assert_eq!(config.poll_fan_out, 256);
        }
    }
});
