#![no_main]

use libfuzzer_sys::fuzz_target;
use loadfleet::args::StopCount;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(value) = loadfleet::fuzzing::parse_positive_u64_input(input) {
        debug_assert!(value >= 1);
    }
    match loadfleet::fuzzing::parse_stop_count_input(input) {
        Ok(StopCount::All) => debug_assert!(input.trim().eq_ignore_ascii_case("all")),
        Ok(StopCount::Count(_)) => debug_assert!(input.trim().parse::<usize>().is_ok()),
        Err(_) => {}
    }
});
