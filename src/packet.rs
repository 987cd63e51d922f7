//! Packet framing
//!
//! ```text
//! 55 55 | type | len | data[len] | checksum | AA AA
//! ```
//!
//! `checksum` is the XOR of `type`, `len` and every data byte.

use crate::error::PrinterError;

pub const HEADER: [u8; 2] = [0x55, 0x55];
pub const FOOTER: [u8; 2] = [0xAA, 0xAA];

/// Header, type, length, checksum and footer bytes
pub const FRAME_OVERHEAD: usize = 7;

/// Largest payload a single frame can carry
pub const MAX_DATA_LEN: usize = u8::MAX as usize;

/// One framed protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: u8,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(packet_type: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            packet_type,
            data: data.into(),
        }
    }

    /// Frame the packet for the wire.
    ///
    /// Payloads longer than [`MAX_DATA_LEN`] are rejected since the length field is one byte.
    pub fn encode(&self) -> Result<Vec<u8>, PrinterError> {
        if self.data.len() > MAX_DATA_LEN {
            return Err(PrinterError::InvalidParameter(format!(
                "Packet payload too long: {} bytes (maximum: {} bytes)",
                self.data.len(),
                MAX_DATA_LEN
            )));
        }

        let len = self.data.len() as u8;
        let mut frame = Vec::with_capacity(self.data.len() + FRAME_OVERHEAD);
        frame.extend_from_slice(&HEADER);
        frame.push(self.packet_type);
        frame.push(len);
        frame.extend_from_slice(&self.data);
        frame.push(checksum(self.packet_type, &self.data));
        frame.extend_from_slice(&FOOTER);
        Ok(frame)
    }

    /// Parse exactly one frame.
    ///
    /// The caller slices `frame` to the declared length beforehand; anything that fails
    /// header, footer or checksum validation is a [`PrinterError::MalformedPacket`].
    pub fn decode(frame: &[u8]) -> Result<Self, PrinterError> {
        if frame.len() < FRAME_OVERHEAD
            || frame[..2] != HEADER
            || frame[frame.len() - 2..] != FOOTER
        {
            return Err(PrinterError::MalformedPacket(frame.to_vec()));
        }

        let packet_type = frame[2];
        let len = frame[3] as usize;
        if frame.len() != len + FRAME_OVERHEAD {
            return Err(PrinterError::MalformedPacket(frame.to_vec()));
        }

        let data = &frame[4..4 + len];
        if checksum(packet_type, data) != frame[4 + len] {
            return Err(PrinterError::MalformedPacket(frame.to_vec()));
        }

        Ok(Self::new(packet_type, data))
    }
}

fn checksum(packet_type: u8, data: &[u8]) -> u8 {
    data.iter()
        .fold(packet_type ^ data.len() as u8, |acc, &b| acc ^ b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_heartbeat() {
        let frame = Packet::new(0xDC, [0x01]).encode().unwrap();
        assert_eq!(frame, [0x55, 0x55, 0xDC, 0x01, 0x01, 0xDC, 0xAA, 0xAA]);
    }

    #[test]
    fn test_encode_empty_payload() {
        let frame = Packet::new(0x13, []).encode().unwrap();
        assert_eq!(frame, [0x55, 0x55, 0x13, 0x00, 0x13, 0xAA, 0xAA]);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let packet = Packet::new(0x85, vec![0u8; 256]);
        assert!(matches!(packet.encode(), Err(PrinterError::InvalidParameter(_))));
    }

    #[test]
    fn test_round_trip_boundary_lengths() {
        for len in [0usize, 1, 7, 128, 255] {
            let data: Vec<u8> = (0..len).map(|i| (i * 31 % 256) as u8).collect();
            let packet = Packet::new(0x85, data);
            let decoded = Packet::decode(&packet.encode().unwrap()).unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn test_decode_bad_header() {
        let mut frame = Packet::new(0x40, [0x08]).encode().unwrap();
        frame[0] = 0x00;
        frame[1] = 0x00;
        assert!(matches!(Packet::decode(&frame), Err(PrinterError::MalformedPacket(_))));
    }

    #[test]
    fn test_decode_bad_footer() {
        let mut frame = Packet::new(0x40, [0x08]).encode().unwrap();
        let n = frame.len();
        frame[n - 2] = 0x00;
        frame[n - 1] = 0x00;
        assert!(matches!(Packet::decode(&frame), Err(PrinterError::MalformedPacket(_))));
    }

    #[test]
    fn test_decode_flipped_checksum_bit() {
        let frame = Packet::new(0x1B, [0x01, 0x02, 0x03]).encode().unwrap();
        let checksum_at = frame.len() - 3;
        for bit in 0..8 {
            let mut corrupted = frame.clone();
            corrupted[checksum_at] ^= 1 << bit;
            match Packet::decode(&corrupted) {
                Err(PrinterError::MalformedPacket(bytes)) => assert_eq!(bytes, corrupted),
                other => panic!("expected MalformedPacket, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_decode_too_short() {
        assert!(matches!(
            Packet::decode(&[0x55, 0x55, 0x01]),
            Err(PrinterError::MalformedPacket(_))
        ));
    }
}
