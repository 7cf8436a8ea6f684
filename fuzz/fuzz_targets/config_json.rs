#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let raw = serde_json::from_str::<serde_json::Value>(input).ok();
    if let Ok(config) = loadfleet::fuzzing::parse_config_json_input(input) {
        let Some(raw) = raw else {
            debug_assert!(false, "typed parse succeeded where raw parse failed");
            return;
        };
        let port_given = raw.get("control_port").is_some() || raw.get("controlPort").is_some();
        if !port_given {
            debug_assert_eq!(config.control_port, 8889);
        }
    }
});
