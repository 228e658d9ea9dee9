#![no_main]
use libfuzzer_sys::fuzz_target;
use mrdconv::registry::ConversionConfig;
use mrdconv::ConverterRegistry;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(config) = ConversionConfig::parse(text) {
            let registry = ConverterRegistry::default();
            for mapping in &config.mappings {
                let _ = registry.select(&mapping.psd_name, Some(&config));
            }
        }
    }
});
