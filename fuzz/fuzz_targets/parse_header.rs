#![no_main]
use libfuzzer_sys::fuzz_target;
use mrdconv::NormalizedHeader;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(header) = NormalizedHeader::from_xml(text) {
            let _ = header.to_xml();
        }
    }
});
