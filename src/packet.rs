//! Frame-control packets of the archive container.
//!
//! Every packet is 16 bytes long. Multi-byte fields are split into high and
//! low bytes stored at separate offsets, and are reassembled with [`packed`].
//!
//! | offset | width | field |
//! |---|---|---|
//! | 0 | 8 | opcode |
//! | 1 | 8 | frame type |
//! | 2, 3 | 16 (hi, lo) | view number, `0` for non-data packets |
//! | 4, 5 | 16 (hi, lo) | slice (partition) number |
//! | 6 | 8 | echo number |
//! | 7, 8 | 16 (hi, lo) | echo train index |
//! | 9 | 8 | pass number |
//! | 10..16 | | reserved |
//!
//! [`packed`]: ./fn.packed.html

use crate::error::{ConvertError, Result};
use crate::typedef::ControlOpcode;
use num_traits::FromPrimitive;

/// Length of a control packet in bytes.
pub const PACKET_LEN: usize = 16;

/// View number carried by control packets which announce no data.
pub const NON_DATA_VIEW: u16 = 0;

/// Reassemble a 16-bit field from its high and low bytes.
#[inline]
pub fn packed(hi: u8, lo: u8) -> u16 {
    (u16::from(hi) << 8) | u16::from(lo)
}

/// Split a 16-bit field into its high and low bytes.
#[inline]
pub fn unpacked(value: u16) -> (u8, u8) {
    ((value >> 8) as u8, (value & 0xff) as u8)
}

/// A decoded frame-control packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ControlPacket {
    /// Packet opcode, see [`Opcode`](../typedef/enum.Opcode.html)
    pub opcode: u8,
    /// Frame type
    pub frame_type: u8,
    /// One-based view number, 0 for non-data packets
    pub view: u16,
    /// Slice or partition
    pub slice: u16,
    /// Echo
    pub echo: u8,
    /// Position in the echo train
    pub echo_train_index: u16,
    /// Acquisition pass
    pub pass: u8,
}

impl ControlPacket {
    /// Decode a packet from its raw bytes.
    ///
    /// # Errors
    ///
    /// `MalformedSource` if fewer than 16 bytes are given. Trailing bytes
    /// are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PACKET_LEN {
            return Err(ConvertError::MalformedSource(format!(
                "control packet is {} bytes long, expected {}",
                bytes.len(),
                PACKET_LEN
            )));
        }
        Ok(ControlPacket {
            opcode: bytes[0],
            frame_type: bytes[1],
            view: packed(bytes[2], bytes[3]),
            slice: packed(bytes[4], bytes[5]),
            echo: bytes[6],
            echo_train_index: packed(bytes[7], bytes[8]),
            pass: bytes[9],
        })
    }

    /// Encode the packet back into its raw form.
    pub fn encode(&self) -> [u8; PACKET_LEN] {
        let mut out = [0u8; PACKET_LEN];
        out[0] = self.opcode;
        out[1] = self.frame_type;
        let (hi, lo) = unpacked(self.view);
        out[2] = hi;
        out[3] = lo;
        let (hi, lo) = unpacked(self.slice);
        out[4] = hi;
        out[5] = lo;
        out[6] = self.echo;
        let (hi, lo) = unpacked(self.echo_train_index);
        out[7] = hi;
        out[8] = lo;
        out[9] = self.pass;
        out
    }

    /// A scan packet announcing one frame at the given position.
    pub fn scan(view: u16, slice: u16, echo: u8) -> Self {
        ControlPacket {
            opcode: ControlOpcode::Scan as u8,
            view,
            slice,
            echo,
            ..Default::default()
        }
    }

    /// The packet's opcode, if it is a known one.
    pub fn opcode(&self) -> Option<ControlOpcode> {
        ControlOpcode::from_u8(self.opcode)
    }

    /// Whether this packet announces a readout to be converted.
    pub fn is_data(&self) -> bool {
        self.opcode() == Some(ControlOpcode::Scan) && self.view != NON_DATA_VIEW
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_fields() {
        assert_eq!(packed(0, 0), 0);
        assert_eq!(packed(0x01, 0x02), 0x0102);
        assert_eq!(packed(0xff, 0xff), u16::max_value());
        assert_eq!(unpacked(0x0102), (0x01, 0x02));
    }

    #[test]
    fn decode_layout() {
        let bytes = [1u8, 0, 0x01, 0x2c, 0, 3, 1, 0, 2, 4, 0, 0, 0, 0, 0, 0];
        let p = ControlPacket::decode(&bytes).unwrap();
        assert_eq!(p.opcode(), Some(ControlOpcode::Scan));
        assert_eq!(p.view, 300);
        assert_eq!(p.slice, 3);
        assert_eq!(p.echo, 1);
        assert_eq!(p.echo_train_index, 2);
        assert_eq!(p.pass, 4);
        assert!(p.is_data());
        assert_eq!(p.encode(), bytes);
    }

    #[test]
    fn view_zero_is_not_data() {
        let p = ControlPacket::scan(0, 1, 0);
        assert!(!p.is_data());
        let mut p = ControlPacket::scan(5, 1, 0);
        p.opcode = ControlOpcode::Done as u8;
        assert!(!p.is_data());
    }

    #[test]
    fn short_packet() {
        assert!(matches!(
            ControlPacket::decode(&[1, 0, 0, 1]),
            Err(ConvertError::MalformedSource(_))
        ));
    }
}
