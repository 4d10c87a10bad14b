//! Binary codec for request and reply frames on the device channel.
//!
//! Request wire format:
//! ```text
//! [version:1][api:1][reserved:2][payload_len:4][process:8][request_id:8][payload:N]
//! ```
//! Reply wire format:
//! ```text
//! [status:4][payload_len:4][request_id:8][payload:N]
//! ```
//! All multi-byte integers are little-endian.

use crate::protocol::messages::{
    ApiKind, ApiReply, ApiRequest, ProcessHandle, StatusCode, MAX_PAYLOAD_SIZE,
    PROTOCOL_VERSION, REPLY_HEADER_SIZE, REQUEST_HEADER_SIZE,
};
use thiserror::Error;

/// Errors that can occur while decoding a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The api byte in the header is not a recognized value.
    #[error("unknown api number: 0x{0:02X}")]
    UnknownApi(u8),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The status field of a reply is not a recognized value.
    #[error("unknown status code: 0x{0:08X}")]
    UnknownStatus(u32),

    /// The declared payload length does not match the bytes in the frame.
    #[error("payload length mismatch: header says {declared}, frame carries {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// The declared payload length exceeds [`MAX_PAYLOAD_SIZE`].
    #[error("payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),
}

// ── Requests ──────────────────────────────────────────────────────────────────

/// Encodes a request frame.
///
/// # Examples
///
/// ```rust
/// use conhost_core::protocol::{decode_request, encode_request, ApiKind, ApiRequest, ProcessHandle};
///
/// let request = ApiRequest {
///     api: ApiKind::GetLangId,
///     process: ProcessHandle(7),
///     request_id: 1,
///     payload: Vec::new(),
/// };
/// let bytes = encode_request(&request);
/// assert_eq!(decode_request(&bytes).unwrap(), request);
/// ```
pub fn encode_request(request: &ApiRequest) -> Vec<u8> {
    let mut buf = Vec::with_capacity(REQUEST_HEADER_SIZE + request.payload.len());
    buf.push(PROTOCOL_VERSION);
    buf.push(request.api as u8);
    buf.extend_from_slice(&[0x00, 0x00]); // reserved
    buf.extend_from_slice(&(request.payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&request.process.0.to_le_bytes());
    buf.extend_from_slice(&request.request_id.to_le_bytes());
    buf.extend_from_slice(&request.payload);
    buf
}

/// Decodes one complete request frame.
///
/// The frame must contain exactly the header plus the declared payload; a
/// device-channel read always delivers whole frames.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the frame is malformed.
pub fn decode_request(bytes: &[u8]) -> Result<ApiRequest, ProtocolError> {
    require_len(bytes, REQUEST_HEADER_SIZE)?;

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let api = ApiKind::try_from(bytes[1]).map_err(|_| ProtocolError::UnknownApi(bytes[1]))?;

    // bytes[2..4] are reserved – ignored on decode

    let payload_len = read_u32(bytes, 4)? as usize;
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge(payload_len));
    }
    let available = bytes.len() - REQUEST_HEADER_SIZE;
    if available != payload_len {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: payload_len,
            available,
        });
    }

    Ok(ApiRequest {
        api,
        process: ProcessHandle(read_u64(bytes, 8)?),
        request_id: read_u64(bytes, 16)?,
        payload: bytes[REQUEST_HEADER_SIZE..].to_vec(),
    })
}

// ── Replies ───────────────────────────────────────────────────────────────────

/// Encodes a reply frame.
pub fn encode_reply(reply: &ApiReply) -> Vec<u8> {
    let mut buf = Vec::with_capacity(REPLY_HEADER_SIZE + reply.payload.len());
    buf.extend_from_slice(&reply.status.as_u32().to_le_bytes());
    buf.extend_from_slice(&(reply.payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&reply.request_id.to_le_bytes());
    buf.extend_from_slice(&reply.payload);
    buf
}

/// Decodes one complete reply frame.  Used by clients and tests.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the frame is malformed.
pub fn decode_reply(bytes: &[u8]) -> Result<ApiReply, ProtocolError> {
    require_len(bytes, REPLY_HEADER_SIZE)?;

    let raw_status = read_u32(bytes, 0)?;
    let status =
        StatusCode::try_from(raw_status).map_err(|_| ProtocolError::UnknownStatus(raw_status))?;
    let payload_len = read_u32(bytes, 4)? as usize;
    let available = bytes.len() - REPLY_HEADER_SIZE;
    if available != payload_len {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: payload_len,
            available,
        });
    }

    Ok(ApiReply {
        status,
        request_id: read_u64(bytes, 8)?,
        payload: bytes[REPLY_HEADER_SIZE..].to_vec(),
    })
}

// ── Primitive helpers ─────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::InsufficientData {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

pub(crate) fn read_u16(buf: &[u8], offset: usize) -> Result<u16, ProtocolError> {
    require_len(buf, offset + 2)?;
    Ok(u16::from_le_bytes([buf[offset], buf[offset + 1]]))
}

pub(crate) fn read_i16(buf: &[u8], offset: usize) -> Result<i16, ProtocolError> {
    read_u16(buf, offset).map(|v| v as i16)
}

pub(crate) fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    require_len(buf, offset + 4)?;
    Ok(u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ]))
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, ProtocolError> {
    require_len(buf, offset + 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    Ok(u64::from_le_bytes(raw))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(payload: Vec<u8>) -> ApiRequest {
        ApiRequest {
            api: ApiKind::Disconnect,
            process: ProcessHandle(0xABCD),
            request_id: 42,
            payload,
        }
    }

    #[test]
    fn test_request_header_layout_is_little_endian() {
        let bytes = encode_request(&make_request(vec![1, 2, 3]));

        assert_eq!(bytes.len(), REQUEST_HEADER_SIZE + 3);
        assert_eq!(bytes[0], PROTOCOL_VERSION);
        assert_eq!(bytes[1], ApiKind::Disconnect as u8);
        assert_eq!(&bytes[4..8], &3u32.to_le_bytes());
        assert_eq!(&bytes[8..16], &0xABCDu64.to_le_bytes());
        assert_eq!(&bytes[16..24], &42u64.to_le_bytes());
    }

    #[test]
    fn test_decode_request_recovers_payload() {
        let original = make_request(vec![9; 100]);
        let decoded = decode_request(&encode_request(&original)).expect("decode");
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_request_rejects_short_header() {
        let result = decode_request(&[PROTOCOL_VERSION, 0x01, 0, 0]);
        assert_eq!(
            result,
            Err(ProtocolError::InsufficientData {
                needed: REQUEST_HEADER_SIZE,
                available: 4
            })
        );
    }

    #[test]
    fn test_decode_request_rejects_wrong_version() {
        let mut bytes = encode_request(&make_request(Vec::new()));
        bytes[0] = 0x09;
        assert_eq!(decode_request(&bytes), Err(ProtocolError::UnsupportedVersion(0x09)));
    }

    #[test]
    fn test_decode_request_rejects_unknown_api() {
        let mut bytes = encode_request(&make_request(Vec::new()));
        bytes[1] = 0x55;
        assert_eq!(decode_request(&bytes), Err(ProtocolError::UnknownApi(0x55)));
    }

    #[test]
    fn test_decode_request_rejects_truncated_payload() {
        let mut bytes = encode_request(&make_request(vec![0; 10]));
        bytes.truncate(bytes.len() - 4);
        assert_eq!(
            decode_request(&bytes),
            Err(ProtocolError::PayloadLengthMismatch {
                declared: 10,
                available: 6
            })
        );
    }

    #[test]
    fn test_decode_request_rejects_trailing_bytes() {
        let mut bytes = encode_request(&make_request(vec![0; 2]));
        bytes.push(0xFF);
        assert!(matches!(
            decode_request(&bytes),
            Err(ProtocolError::PayloadLengthMismatch { declared: 2, available: 3 })
        ));
    }

    #[test]
    fn test_decode_request_rejects_oversized_declaration() {
        let mut bytes = encode_request(&make_request(Vec::new()));
        bytes[4..8].copy_from_slice(&((MAX_PAYLOAD_SIZE + 1) as u32).to_le_bytes());
        assert_eq!(
            decode_request(&bytes),
            Err(ProtocolError::PayloadTooLarge(MAX_PAYLOAD_SIZE + 1))
        );
    }

    #[test]
    fn test_reply_carries_status_and_request_id() {
        let reply = ApiReply {
            status: StatusCode::InvalidBufferSize,
            request_id: 77,
            payload: vec![0x09, 0x04],
        };
        let bytes = encode_reply(&reply);

        assert_eq!(&bytes[0..4], &0xC000_0206u32.to_le_bytes());
        assert_eq!(decode_reply(&bytes).expect("decode"), reply);
    }

    #[test]
    fn test_decode_reply_rejects_unknown_status() {
        let mut bytes = encode_reply(&ApiReply::status(1, StatusCode::Success));
        bytes[0..4].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        assert_eq!(decode_reply(&bytes), Err(ProtocolError::UnknownStatus(0x1234_5678)));
    }
}
