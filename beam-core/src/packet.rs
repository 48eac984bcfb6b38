//! Media datagram header codec.
//!
//! Every UDP datagram starts with a fixed 12-byte header, big-endian
//! throughout:
//!
//! ```text
//! sequence:        u16  (2)   per-sender monotonic, wraps
//! timestamp:       u32  (4)   90 kHz media clock (video) or packet counter (audio)
//! flags:           u8   (1)   bit 0 keyframe, bit 1 start-of-NAL, bit 2 end-of-NAL
//! reserved:        u8   (1)   zero on send, ignored on receive
//! fragment_index:  u16  (2)   0-based within this NAL
//! fragment_count:  u16  (2)   total fragments for this NAL, >= 1
//! ```
//!
//! Everything after the header is the NAL fragment payload.

use crate::error::BeamError;

// ── Constants ────────────────────────────────────────────────────

/// Largest datagram we will put on the wire.
pub const MAX_DATAGRAM: usize = 1400;

/// Fragment payload capacity per datagram.
pub const MAX_PAYLOAD: usize = MAX_DATAGRAM - PacketHeader::SIZE;

/// Flag bit: this fragment belongs to a keyframe NAL (SPS/PPS/IDR).
pub const FLAG_KEYFRAME: u8 = 0b0000_0001;

/// Flag bit: first fragment of a NAL.
pub const FLAG_START: u8 = 0b0000_0010;

/// Flag bit: last fragment of a NAL.
pub const FLAG_END: u8 = 0b0000_0100;

// ── PacketHeader ─────────────────────────────────────────────────

/// The fixed per-datagram header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub sequence: u16,
    pub timestamp: u32,
    pub flags: u8,
    pub fragment_index: u16,
    pub fragment_count: u16,
}

impl PacketHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 12;

    /// Serialize to bytes (big-endian). The reserved byte is zero.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.sequence.to_be_bytes());
        buf[2..6].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[6] = self.flags;
        buf[7] = 0; // reserved
        buf[8..10].copy_from_slice(&self.fragment_index.to_be_bytes());
        buf[10..12].copy_from_slice(&self.fragment_count.to_be_bytes());
        buf
    }

    /// Deserialize from the front of a datagram. The reserved byte is
    /// ignored; trailing bytes are the fragment payload.
    pub fn decode(data: &[u8]) -> Result<Self, BeamError> {
        if data.len() < Self::SIZE {
            return Err(BeamError::TruncatedHeader {
                got: data.len(),
                need: Self::SIZE,
            });
        }
        Ok(Self {
            sequence: u16::from_be_bytes(data[0..2].try_into().unwrap()),
            timestamp: u32::from_be_bytes(data[2..6].try_into().unwrap()),
            flags: data[6],
            fragment_index: u16::from_be_bytes(data[8..10].try_into().unwrap()),
            fragment_count: u16::from_be_bytes(data[10..12].try_into().unwrap()),
        })
    }

    pub fn is_keyframe(&self) -> bool {
        self.flags & FLAG_KEYFRAME != 0
    }

    pub fn is_start(&self) -> bool {
        self.flags & FLAG_START != 0
    }

    pub fn is_end(&self) -> bool {
        self.flags & FLAG_END != 0
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_byte_layout() {
        let header = PacketHeader {
            sequence: 0xABCD,
            timestamp: 0x1234_5678,
            flags: 0x07,
            fragment_index: 0x0102,
            fragment_count: 0x0304,
        };
        assert_eq!(
            header.encode(),
            [0xAB, 0xCD, 0x12, 0x34, 0x56, 0x78, 0x07, 0x00, 0x01, 0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn roundtrip_full_range() {
        let cases = [
            PacketHeader {
                sequence: 0,
                timestamp: 0,
                flags: 0,
                fragment_index: 0,
                fragment_count: 1,
            },
            PacketHeader {
                sequence: u16::MAX,
                timestamp: u32::MAX,
                flags: FLAG_KEYFRAME | FLAG_START | FLAG_END,
                fragment_index: u16::MAX,
                fragment_count: u16::MAX,
            },
            PacketHeader {
                sequence: 1,
                timestamp: 90_000,
                flags: FLAG_START,
                fragment_index: 7,
                fragment_count: 9,
            },
        ];
        for h in cases {
            assert_eq!(PacketHeader::decode(&h.encode()).unwrap(), h);
        }
    }

    #[test]
    fn decode_ignores_trailing_payload() {
        let header = PacketHeader {
            sequence: 5,
            timestamp: 100,
            flags: FLAG_START | FLAG_END,
            fragment_index: 0,
            fragment_count: 1,
        };
        let mut datagram = header.encode().to_vec();
        datagram.extend_from_slice(b"payload bytes");
        assert_eq!(PacketHeader::decode(&datagram).unwrap(), header);
    }

    #[test]
    fn decode_ignores_reserved_byte() {
        let header = PacketHeader {
            sequence: 5,
            timestamp: 100,
            flags: 0,
            fragment_index: 0,
            fragment_count: 1,
        };
        let mut bytes = header.encode();
        bytes[7] = 0xFF;
        assert_eq!(PacketHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn truncated_header_fails() {
        for len in 0..PacketHeader::SIZE {
            let short = vec![0u8; len];
            assert!(matches!(
                PacketHeader::decode(&short),
                Err(BeamError::TruncatedHeader { got, need: 12 }) if got == len
            ));
        }
    }

    #[test]
    fn flag_accessors() {
        let h = PacketHeader {
            sequence: 0,
            timestamp: 0,
            flags: FLAG_KEYFRAME | FLAG_END,
            fragment_index: 0,
            fragment_count: 1,
        };
        assert!(h.is_keyframe());
        assert!(!h.is_start());
        assert!(h.is_end());
    }

    #[test]
    fn payload_capacity() {
        assert_eq!(MAX_PAYLOAD, 1388);
    }
}
