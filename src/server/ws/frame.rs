//! RFC 6455 frame codec
//!
//! Server-to-client frames are always unmasked, client-to-server frames
//! always masked. The decoder is incremental: it reports "need more data"
//! (`None`) rather than erroring when the buffer is short of the declared
//! frame, so a connection's receive buffer can accumulate across partial
//! reads.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha1::{Digest, Sha1};

pub const OPCODE_TEXT: u8 = 0x01;
pub const OPCODE_BINARY: u8 = 0x02;
pub const OPCODE_CLOSE: u8 = 0x08;
pub const OPCODE_PING: u8 = 0x09;
pub const OPCODE_PONG: u8 = 0x0A;

/// RFC 6455 magic GUID for Sec-WebSocket-Accept computation.
const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// One decoded frame: opcode plus unmasked payload.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub payload: Vec<u8>,
}

/// Encode an unmasked text frame.
pub fn encode_text_frame(text: &str) -> Vec<u8> {
    let payload = text.as_bytes();
    let len = payload.len();
    let mut frame = Vec::with_capacity(len + 10);

    // FIN + text opcode
    frame.push(0x81);

    if len < 126 {
        frame.push(len as u8);
    } else if len < 65536 {
        frame.push(126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }

    frame.extend_from_slice(payload);
    frame
}

/// Encode a pong echoing a ping's payload. Control-frame payloads are at
/// most 125 bytes; anything longer is truncated to keep the single-byte
/// length form valid.
pub fn encode_pong_frame(payload: &[u8]) -> Vec<u8> {
    let payload = &payload[..payload.len().min(125)];
    let mut frame = Vec::with_capacity(payload.len() + 2);
    frame.push(0x8A);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    frame
}

/// Encode a close frame carrying just the status code.
pub fn encode_close_frame(code: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4);
    frame.push(0x88);
    frame.push(0x02);
    frame.extend_from_slice(&code.to_be_bytes());
    frame
}

/// Decode one frame from the front of `data`.
///
/// Returns the frame and the number of bytes consumed, or `None` when more
/// data is needed for the declared frame size.
pub fn decode_frame(data: &[u8]) -> Option<(Frame, usize)> {
    if data.len() < 2 {
        return None;
    }

    let opcode = data[0] & 0x0F;
    let masked = data[1] & 0x80 != 0;
    let mut payload_len = (data[1] & 0x7F) as usize;
    let mut header_len = 2;

    if payload_len == 126 {
        if data.len() < 4 {
            return None;
        }
        payload_len = u16::from_be_bytes([data[2], data[3]]) as usize;
        header_len = 4;
    } else if payload_len == 127 {
        if data.len() < 10 {
            return None;
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&data[2..10]);
        payload_len = u64::from_be_bytes(len_bytes) as usize;
        header_len = 10;
    }

    let mut mask_key = [0u8; 4];
    if masked {
        if data.len() < header_len + 4 {
            return None;
        }
        mask_key.copy_from_slice(&data[header_len..header_len + 4]);
        header_len += 4;
    }

    let frame_len = header_len + payload_len;
    if data.len() < frame_len {
        return None;
    }

    let mut payload = data[header_len..frame_len].to_vec();
    if masked {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask_key[i % 4];
        }
    }

    Some((Frame { opcode, payload }, frame_len))
}

/// Compute the `Sec-WebSocket-Accept` value for a client key:
/// base64(SHA-1(key + magic GUID)).
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(ACCEPT_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Client-side encoder for tests: masked text frame.
    fn encode_masked_text(text: &str, mask_key: [u8; 4]) -> Vec<u8> {
        let payload = text.as_bytes();
        let len = payload.len();
        let mut frame = vec![0x81];
        if len < 126 {
            frame.push(0x80 | len as u8);
        } else {
            frame.push(0x80 | 126);
            frame.extend_from_slice(&(len as u16).to_be_bytes());
        }
        frame.extend_from_slice(&mask_key);
        for (i, byte) in payload.iter().enumerate() {
            frame.push(byte ^ mask_key[i % 4]);
        }
        frame
    }

    #[test]
    fn test_short_text_frame_layout() {
        let frame = encode_text_frame("hello");
        assert_eq!(frame[0], 0x81);
        assert_eq!(frame[1], 5, "unmasked single-byte length");
        assert_eq!(&frame[2..], b"hello");
    }

    #[test]
    fn test_medium_text_frame_uses_two_byte_length() {
        let text = "x".repeat(300);
        let frame = encode_text_frame(&text);
        assert_eq!(frame[0], 0x81);
        assert_eq!(frame[1], 126);
        assert_eq!(u16::from_be_bytes([frame[2], frame[3]]), 300);
        assert_eq!(frame.len(), 4 + 300);
    }

    #[test]
    fn test_large_text_frame_uses_eight_byte_length() {
        let text = "y".repeat(70_000);
        let frame = encode_text_frame(&text);
        assert_eq!(frame[1], 127);
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&frame[2..10]);
        assert_eq!(u64::from_be_bytes(len_bytes), 70_000);
        assert_eq!(frame.len(), 10 + 70_000);
    }

    #[test]
    fn test_server_frame_round_trips() {
        for text in ["", "hi", &"p".repeat(200), &"q".repeat(70_000)] {
            let encoded = encode_text_frame(text);
            let (frame, consumed) = decode_frame(&encoded).expect("complete frame decodes");
            assert_eq!(consumed, encoded.len());
            assert_eq!(frame.opcode, OPCODE_TEXT);
            assert_eq!(frame.payload, text.as_bytes());
        }
    }

    #[test]
    fn test_decodes_masked_client_frame() {
        let encoded = encode_masked_text("ping-test", [0x37, 0xfa, 0x21, 0x3d]);
        let (frame, consumed) = decode_frame(&encoded).expect("masked frame decodes");
        assert_eq!(consumed, encoded.len());
        assert_eq!(frame.opcode, OPCODE_TEXT);
        assert_eq!(frame.payload, b"ping-test", "payload is unmasked");
    }

    #[test]
    fn test_incomplete_frames_need_more_data() {
        let encoded = encode_masked_text("ping-test", [1, 2, 3, 4]);
        // Every strict prefix is insufficient.
        for cut in 0..encoded.len() {
            assert!(
                decode_frame(&encoded[..cut]).is_none(),
                "prefix of {cut} bytes must not decode"
            );
        }
    }

    #[test]
    fn test_decodes_frames_back_to_back() {
        let mut buffer = encode_text_frame("first");
        buffer.extend_from_slice(&encode_text_frame("second"));

        let (frame, consumed) = decode_frame(&buffer).unwrap();
        assert_eq!(frame.payload, b"first");
        let (frame, rest) = decode_frame(&buffer[consumed..]).unwrap();
        assert_eq!(frame.payload, b"second");
        assert_eq!(consumed + rest, buffer.len());
    }

    #[test]
    fn test_pong_echoes_payload() {
        let frame = encode_pong_frame(b"ping-test");
        assert_eq!(frame[0], 0x8A);
        assert_eq!(frame[1], 9);
        assert_eq!(&frame[2..], b"ping-test");
    }

    #[test]
    fn test_pong_truncates_oversized_payload() {
        let frame = encode_pong_frame(&[0u8; 200]);
        assert_eq!(frame[1], 125);
        assert_eq!(frame.len(), 2 + 125);
    }

    #[test]
    fn test_close_frame_carries_code() {
        let frame = encode_close_frame(1001);
        assert_eq!(frame, vec![0x88, 0x02, 0x03, 0xE9]);
        let (decoded, _) = decode_frame(&frame).unwrap();
        assert_eq!(decoded.opcode, OPCODE_CLOSE);
        assert_eq!(decoded.payload, vec![0x03, 0xE9]);
    }

    #[test]
    fn test_accept_key_matches_rfc_example() {
        // RFC 6455 §1.3 worked example.
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }
}
