#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let template = String::from_utf8_lossy(data);
    if let Ok(expanded) = loadfleet::fuzzing::expand_user_data_input(&template) {
        // No include file exists, so success means there were no markers.
        debug_assert!(!template.contains("<%="));
        debug_assert_eq!(expanded, template);
    }
});
