#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match loadfleet::fuzzing::parse_control_request_input(data) {
        Ok(request) => {
            debug_assert!(!request.method.is_empty());
            debug_assert!(!request.target.is_empty());
            let _pairs = request.query_pairs();
            debug_assert!(request.target.starts_with(request.path()));
        }
        Err(status) => debug_assert_eq!(status, 400),
    }
});
