#![no_main]
use libfuzzer_sys::fuzz_target;
use mrdconv::{ContainerReader, MemorySink};

fuzz_target!(|data: &[u8]| {
    if let Ok(mut reader) = ContainerReader::new(data) {
        let mut sink = MemorySink::new();
        let _ = reader.read_into(&mut sink);
    }
});
