#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((mode, payload)) = data.split_first() else {
        return;
    };
    let query = String::from_utf8_lossy(payload);
    let strict = mode % 2 == 0;

    let Ok(first) = loadfleet::fuzzing::apply_set_query_input(&query, strict) else {
        return;
    };
    let Ok(second) = loadfleet::fuzzing::apply_set_query_input(&query, strict) else {
        debug_assert!(false, "same query must apply twice");
        return;
    };
    debug_assert_eq!(first, second);
    if strict {
        debug_assert!(first.extra.is_empty());
    }
    if let Ok(json) = serde_json::to_value(&first) {
        debug_assert!(json.get("n").is_some_and(serde_json::Value::is_u64));
        debug_assert!(json.get("concurrency").is_some_and(serde_json::Value::is_u64));
    }
});
