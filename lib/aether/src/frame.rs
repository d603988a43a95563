//! Wire frame codec: `uint32 totalLength` (network byte order) + `uint16
//! opcode` (network byte order) + payload.

use crate::error::{Error, ErrorKind, Result};
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Minimum frame size: 4 bytes of length prefix + 2 bytes of opcode.
pub const HEADER_LEN: usize = 6;

/// A decoded opcode + payload unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(opcode: u16, payload: Vec<u8>) -> Self {
        Frame { opcode, payload }
    }

    /// Whether this opcode falls in the reserved range handled by the
    /// gateway itself rather than forwarded downstream.
    pub fn is_reserved_opcode(&self) -> bool {
        self.opcode <= 0x00FF
    }

    /// Encode as `totalLength | opcode | payload`, all integers in network
    /// byte order.
    pub fn encode(&self) -> Vec<u8> {
        let total_length = (HEADER_LEN + self.payload.len()) as u32;
        let mut buf = Vec::with_capacity(total_length as usize);
        buf.write_u32::<NetworkEndian>(total_length)
            .expect("writing to a Vec never fails");
        buf.write_u16::<NetworkEndian>(self.opcode)
            .expect("writing to a Vec never fails");
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a frame from `buffer`. Rejects `totalLength < 6` or
    /// `totalLength > buffer.len()`; a buffer carrying trailing bytes beyond
    /// `totalLength` is accepted, with only the first `totalLength` bytes
    /// consumed. The transport is expected to frame-delimit the stream
    /// before calling this.
    pub fn decode(buffer: &[u8]) -> Result<Frame> {
        if buffer.len() < HEADER_LEN {
            return Err(Error::new(
                ErrorKind::InvalidMessage,
                "frame buffer shorter than the 6-byte header",
            ));
        }

        let mut cursor = Cursor::new(buffer);
        let total_length = cursor
            .read_u32::<NetworkEndian>()
            .map_err(|e| Error::new(ErrorKind::InvalidMessage, e.to_string()))?
            as usize;
        let opcode = cursor
            .read_u16::<NetworkEndian>()
            .map_err(|e| Error::new(ErrorKind::InvalidMessage, e.to_string()))?;

        if total_length < HEADER_LEN {
            return Err(Error::new(
                ErrorKind::InvalidMessage,
                format!("totalLength {total_length} is below the minimum of {HEADER_LEN}"),
            ));
        }
        if total_length > buffer.len() {
            return Err(Error::new(
                ErrorKind::InvalidMessage,
                format!("totalLength {total_length} exceeds buffer length {}", buffer.len()),
            ));
        }

        let payload = buffer[HEADER_LEN..total_length].to_vec();
        Ok(Frame { opcode, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let frame = Frame::new(0x1234, vec![1, 2, 3, 4]);
        let encoded = frame.encode();
        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn empty_payload_roundtrip() {
        let frame = Frame::new(0x0001, vec![]);
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded.opcode, 0x0001);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn rejects_buffer_shorter_than_header() {
        assert!(Frame::decode(&[0, 0, 0]).is_err());
    }

    #[test]
    fn rejects_total_length_below_minimum() {
        let mut buf = Vec::new();
        buf.write_u32::<NetworkEndian>(5).unwrap();
        buf.write_u16::<NetworkEndian>(0).unwrap();
        assert!(Frame::decode(&buf).is_err());
    }

    #[test]
    fn rejects_total_length_past_buffer() {
        let mut buf = Vec::new();
        buf.write_u32::<NetworkEndian>(100).unwrap();
        buf.write_u16::<NetworkEndian>(0).unwrap();
        assert!(Frame::decode(&buf).is_err());
    }

    #[test]
    fn accepts_trailing_bytes_past_total_length() {
        let frame = Frame::new(0x0010, vec![9, 9]);
        let mut encoded = frame.encode();
        encoded.extend_from_slice(&[0xff, 0xff, 0xff]);
        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn reserved_opcode_boundary() {
        assert!(Frame::new(0x00FF, vec![]).is_reserved_opcode());
        assert!(!Frame::new(0x0100, vec![]).is_reserved_opcode());
    }
}
