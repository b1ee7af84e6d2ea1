//! Downstream broker wire framing: a 4-byte little-endian message type
//! prefix followed by the payload, matching `struct.pack("I", 101/102)`.

use bytes::{BufMut, BytesMut};

/// Raw PCM audio bytes, forwarded as-is after the prefix.
pub const TYPE_AUDIO: u32 = 101;
/// JSON-encoded `{"segments": [...], "memory_id": ...}` batch.
pub const TYPE_TRANSCRIPT: u32 = 102;

pub fn frame(message_type: u32, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32_le(message_type);
    buf.put_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_prefixes_little_endian_type() {
        let framed = frame(TYPE_AUDIO, b"abc");
        assert_eq!(&framed[..4], &101u32.to_le_bytes());
        assert_eq!(&framed[4..], b"abc");
    }
}
