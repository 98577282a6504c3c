#![no_main]

use libfuzzer_sys::fuzz_target;
use todos_adapters_xml::parse_report;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Errors are fine, panics are not
        let _ = parse_report(text);
    }
});
