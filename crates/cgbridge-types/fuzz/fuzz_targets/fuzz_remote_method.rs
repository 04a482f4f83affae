#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The method list comes straight off the wire; parsing must never panic
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(methods) = serde_json::from_str::<Vec<cgbridge_types::RemoteMethod>>(s) {
            for method in &methods {
                let _ = method.action_id();
                let _ = method.display_name();
            }
        }
    }
});
