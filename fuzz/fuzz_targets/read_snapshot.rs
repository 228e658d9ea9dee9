#![no_main]
use libfuzzer_sys::fuzz_target;
use mrdconv::{ConvertOptions, Converter, MemorySink, Snapshot};

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = Snapshot::from_reader(data) {
        let mut sink = MemorySink::new();
        let _ = Converter::new(&source, ConvertOptions::default()).write_to(&mut sink);
    }
});
