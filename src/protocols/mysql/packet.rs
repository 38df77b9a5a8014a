//! Packet framing.
//!
//! Pure encode/parse of the 4-byte header envelope. No I/O here; the
//! session feeds [`parse`] from its read buffer.

use crate::error::{ProtocolError, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// 3 bytes of length plus 1 byte of sequence.
pub const HEADER_LEN: usize = 4;

/// Largest payload the 3-byte length field can describe.
pub const MAX_PAYLOAD_LEN: usize = (1 << 24) - 1;

/// One framed protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence: u8,
    pub payload: Bytes,
}

impl Packet {
    /// First payload byte, if any.
    pub fn opcode(&self) -> Option<u8> {
        self.payload.first().copied()
    }
}

/// Frame `payload` with a length/sequence header.
///
/// Fails with [`ProtocolError::OversizedPayload`] before producing any bytes
/// when the payload does not fit in 24 bits.
pub fn encode(sequence: u8, payload: &[u8]) -> Result<BytesMut> {
    let len = payload.len();
    if len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::OversizedPayload {
            len,
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut buf = BytesMut::with_capacity(HEADER_LEN + len);
    buf.put_uint_le(len as u64, 3);
    buf.put_u8(sequence);
    buf.put_slice(payload);
    Ok(buf)
}

/// Parse result
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult {
    /// A whole packet and the number of bytes it occupied.
    Complete(Packet, usize),
    /// Need more data; holds the total bytes required once known.
    Incomplete(Option<usize>),
}

/// Parse one packet from the front of `input`.
///
/// `limit` caps the declared payload length; anything above it is rejected
/// as garbage instead of being buffered.
pub fn parse(input: &[u8], limit: usize) -> Result<ParseResult> {
    if input.len() < HEADER_LEN {
        return Ok(ParseResult::Incomplete(None));
    }

    let len = payload_len(input);
    if len > limit {
        return Err(ProtocolError::ProtocolGarbage {
            declared: len,
            limit,
        });
    }

    let total = HEADER_LEN + len;
    if input.len() < total {
        return Ok(ParseResult::Incomplete(Some(total)));
    }

    let packet = Packet {
        sequence: input[3],
        payload: Bytes::copy_from_slice(&input[HEADER_LEN..total]),
    };
    Ok(ParseResult::Complete(packet, total))
}

/// Error for a stream that ended with `buffered` bytes of a packet read.
pub fn truncated(buffered: &[u8]) -> ProtocolError {
    if buffered.is_empty() {
        return ProtocolError::ConnectionClosed;
    }
    let expected = if buffered.len() < HEADER_LEN {
        HEADER_LEN
    } else {
        HEADER_LEN + payload_len(buffered)
    };
    ProtocolError::TruncatedRead {
        expected,
        available: buffered.len(),
    }
}

fn payload_len(header: &[u8]) -> usize {
    u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize
}
