//! Frame types and constants for the device-channel protocol.
//!
//! All multi-byte integers on the device channel are little-endian: the
//! channel never leaves the host, so the host byte order is the wire order.

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Size of a request frame header in bytes.
pub const REQUEST_HEADER_SIZE: usize = 24;

/// Size of a reply frame header in bytes.
pub const REPLY_HEADER_SIZE: usize = 16;

/// Upper bound for a single frame payload.  The largest legitimate payload is
/// the connection-request record.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Capacity of the title field in UTF-16 code units (`MAX_PATH + 1`).
pub const TITLE_CAPACITY: usize = 261;

/// Capacity of the application-name field in UTF-16 code units.
pub const APP_NAME_CAPACITY: usize = 128;

/// Capacity of the current-directory field in UTF-16 code units (`MAX_PATH + 1`).
pub const CURRENT_DIRECTORY_CAPACITY: usize = 261;

/// Size in bytes of the terminator that must follow every text field.
pub const TERMINATOR_SIZE: usize = 2;

/// Size in bytes of the fixed-width configuration block that precedes the
/// text fields of a connection request.
pub const CONNECT_FIXED_SIZE: usize = 40;

/// Total size in bytes of a connection-request record.
pub const CONNECT_RECORD_SIZE: usize = CONNECT_FIXED_SIZE
    + 4
    + TITLE_CAPACITY * 2
    + 4
    + APP_NAME_CAPACITY * 2
    + 4
    + CURRENT_DIRECTORY_CAPACITY * 2;

// ── API numbers ───────────────────────────────────────────────────────────────

/// API numbers carried in the request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ApiKind {
    /// Attach a client process; payload is a connection-request record.
    Connect = 0x01,
    /// Detach a client process.
    Disconnect = 0x02,
    /// Query the language id matching the session's output code page.
    GetLangId = 0x10,
    /// Any retired API kept only for binary compatibility.
    Deprecated = 0x7F,
}

impl TryFrom<u8> for ApiKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(ApiKind::Connect),
            0x02 => Ok(ApiKind::Disconnect),
            0x10 => Ok(ApiKind::GetLangId),
            0x7F => Ok(ApiKind::Deprecated),
            _ => Err(()),
        }
    }
}

// ── Status codes ──────────────────────────────────────────────────────────────

/// NTSTATUS-style completion status written into every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StatusCode {
    Success = 0x0000_0000,
    Timeout = 0x0000_0102,
    Unsuccessful = 0xC000_0001,
    InvalidHandle = 0xC000_0008,
    InvalidParameter = 0xC000_000D,
    NoMemory = 0xC000_0017,
    NotSupported = 0xC000_00BB,
    InvalidBufferSize = 0xC000_0206,
}

impl StatusCode {
    /// Returns the raw status value.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// `true` for `Success`.
    ///
    /// `Timeout` is an informational NTSTATUS but is never a successful
    /// allocation outcome here, so it is not treated as success.
    pub fn is_success(self) -> bool {
        self == StatusCode::Success
    }
}

impl TryFrom<u32> for StatusCode {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            0x0000_0000 => Ok(StatusCode::Success),
            0x0000_0102 => Ok(StatusCode::Timeout),
            0xC000_0001 => Ok(StatusCode::Unsuccessful),
            0xC000_0008 => Ok(StatusCode::InvalidHandle),
            0xC000_000D => Ok(StatusCode::InvalidParameter),
            0xC000_0017 => Ok(StatusCode::NoMemory),
            0xC000_00BB => Ok(StatusCode::NotSupported),
            0xC000_0206 => Ok(StatusCode::InvalidBufferSize),
            _ => Err(()),
        }
    }
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// Opaque identifier the device channel assigns to a client process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessHandle(pub u64);

impl std::fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "process#{}", self.0)
    }
}

/// A decoded request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub api: ApiKind,
    pub process: ProcessHandle,
    pub request_id: u64,
    pub payload: Vec<u8>,
}

/// A reply frame before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiReply {
    pub status: StatusCode,
    pub request_id: u64,
    pub payload: Vec<u8>,
}

impl ApiReply {
    /// A reply that carries only a status.
    pub fn status(request_id: u64, status: StatusCode) -> Self {
        Self {
            status,
            request_id,
            payload: Vec::new(),
        }
    }

    /// A successful reply carrying `payload`.
    pub fn success(request_id: u64, payload: Vec<u8>) -> Self {
        Self {
            status: StatusCode::Success,
            request_id,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_record_size_matches_layout() {
        // 40 fixed + (4 + 522) + (4 + 256) + (4 + 522)
        assert_eq!(CONNECT_RECORD_SIZE, 1352);
    }

    #[test]
    fn test_api_kind_rejects_unknown_byte() {
        assert_eq!(ApiKind::try_from(0x01), Ok(ApiKind::Connect));
        assert!(ApiKind::try_from(0x55).is_err());
    }

    #[test]
    fn test_status_code_raw_values_match_ntstatus() {
        assert_eq!(StatusCode::InvalidBufferSize.as_u32(), 0xC000_0206);
        assert_eq!(StatusCode::NoMemory.as_u32(), 0xC000_0017);
        assert_eq!(StatusCode::try_from(0xC000_0008), Ok(StatusCode::InvalidHandle));
        assert!(StatusCode::try_from(0xDEAD_BEEF).is_err());
    }

    #[test]
    fn test_only_success_is_success() {
        assert!(StatusCode::Success.is_success());
        assert!(!StatusCode::Timeout.is_success());
        assert!(!StatusCode::Unsuccessful.is_success());
    }
}
