#![no_main]
use libfuzzer_sys::fuzz_target;
use mrdconv::packet::ControlPacket;

fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = ControlPacket::decode(data) {
        let _ = packet.opcode();
        let _ = packet.is_data();
        assert_eq!(ControlPacket::decode(&packet.encode()).ok(), Some(packet));
    }
});
