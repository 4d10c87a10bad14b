//! The connection-request record and its validator.
//!
//! A client attaches by sending one fixed-size record.  The record comes from
//! an untrusted process, so [`decode_connect_info`] checks every declared text
//! length against its field capacity and confirms the terminator sits right
//! after the declared length before a single field is copied out.  A record
//! that fails any check is rejected as a whole; it is never repaired.
//!
//! Record layout (little-endian, [`CONNECT_RECORD_SIZE`] bytes):
//! ```text
//! off  size  field
//!   0     4  icon_id (ignored)
//!   4     4  hotkey
//!   8     4  startup_flags
//!  12     2  fill_attribute
//!  14     2  show_window
//!  16     4  screen_buffer_size (x:i16, y:i16)
//!  20     4  window_size        (x:i16, y:i16)
//!  24     4  window_origin      (x:i16, y:i16)
//!  28     4  process_group_id
//!  32     1  console_app
//!  33     1  window_visible
//!  34     6  reserved
//!  40     4  title_length (bytes)
//!  44   522  title             [u16; 261]
//! 566     4  app_name_length (bytes)
//! 570   256  app_name          [u16; 128]
//! 826     4  current_directory_length (bytes)
//! 830   522  current_directory [u16; 261]
//! ```

use std::fmt;

use thiserror::Error;

use crate::domain::config::{Coord, SessionConfig, StartupFlags};
use crate::domain::title::bound_to_utf16_units;
use crate::protocol::codec::{read_i16, read_u16, read_u32};
use crate::protocol::messages::{
    APP_NAME_CAPACITY, CONNECT_FIXED_SIZE, CONNECT_RECORD_SIZE, CURRENT_DIRECTORY_CAPACITY, TERMINATOR_SIZE,
    TITLE_CAPACITY,
};

pub const TITLE_LENGTH_OFFSET: usize = CONNECT_FIXED_SIZE;
pub const TITLE_OFFSET: usize = TITLE_LENGTH_OFFSET + 4;
pub const APP_NAME_LENGTH_OFFSET: usize = TITLE_OFFSET + TITLE_CAPACITY * 2;
pub const APP_NAME_OFFSET: usize = APP_NAME_LENGTH_OFFSET + 4;
pub const CURRENT_DIRECTORY_LENGTH_OFFSET: usize = APP_NAME_OFFSET + APP_NAME_CAPACITY * 2;
pub const CURRENT_DIRECTORY_OFFSET: usize = CURRENT_DIRECTORY_LENGTH_OFFSET + 4;

/// The three bounded text fields of a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Title,
    ApplicationName,
    CurrentDirectory,
}

impl TextField {
    const ALL: [TextField; 3] = [
        TextField::Title,
        TextField::ApplicationName,
        TextField::CurrentDirectory,
    ];

    /// Capacity of the field in UTF-16 code units.
    pub fn capacity(self) -> usize {
        match self {
            TextField::Title => TITLE_CAPACITY,
            TextField::ApplicationName => APP_NAME_CAPACITY,
            TextField::CurrentDirectory => CURRENT_DIRECTORY_CAPACITY,
        }
    }

    /// Largest declared byte length that still leaves room for the terminator.
    pub fn max_byte_len(self) -> usize {
        self.capacity() * 2 - TERMINATOR_SIZE
    }

    fn length_offset(self) -> usize {
        match self {
            TextField::Title => TITLE_LENGTH_OFFSET,
            TextField::ApplicationName => APP_NAME_LENGTH_OFFSET,
            TextField::CurrentDirectory => CURRENT_DIRECTORY_LENGTH_OFFSET,
        }
    }

    fn buffer_offset(self) -> usize {
        match self {
            TextField::Title => TITLE_OFFSET,
            TextField::ApplicationName => APP_NAME_OFFSET,
            TextField::CurrentDirectory => CURRENT_DIRECTORY_OFFSET,
        }
    }
}

impl fmt::Display for TextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextField::Title => "title",
            TextField::ApplicationName => "application name",
            TextField::CurrentDirectory => "current directory",
        };
        f.write_str(name)
    }
}

/// Why a connection request was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedRequest {
    #[error("connection request is {actual} bytes, expected {expected}")]
    WrongSize { expected: usize, actual: usize },

    #[error("{field} length {declared} exceeds the {limit}-byte limit")]
    LengthOutOfBounds {
        field: TextField,
        declared: u32,
        limit: usize,
    },

    #[error("{field} length {declared} is not a whole number of UTF-16 code units")]
    OddLength { field: TextField, declared: u32 },

    #[error("{field} is not terminated at its declared length {declared}")]
    MissingTerminator { field: TextField, declared: u32 },
}

// ── Validated form ────────────────────────────────────────────────────────────

/// A fixed-capacity UTF-16 text field copied verbatim from the wire.
///
/// The whole backing buffer is kept, but only the declared prefix is ever
/// exposed; anything after the terminator may be stale client memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedText<const N: usize> {
    units: [u16; N],
    byte_len: u32,
}

impl<const N: usize> BoundedText<N> {
    /// The declared text, without the terminator.
    pub fn units(&self) -> &[u16] {
        &self.units[..self.byte_len as usize / 2]
    }

    /// Declared length in bytes.
    pub fn byte_len(&self) -> u32 {
        self.byte_len
    }

    /// Capacity in UTF-16 code units, terminator included.
    pub fn capacity(&self) -> usize {
        N
    }

    /// Lossy UTF-8 rendering of the declared text.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(self.units())
    }
}

/// The validated, internal form of a connection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInfo {
    /// Startup info of the launching process: hardcoded defaults with every
    /// field the record carries filled in, including the startup flags.
    pub settings: SessionConfig,
    pub console_app: bool,
    pub window_visible: bool,
    pub process_group_id: u32,
    pub title: BoundedText<TITLE_CAPACITY>,
    pub app_name: BoundedText<APP_NAME_CAPACITY>,
    pub current_directory: BoundedText<CURRENT_DIRECTORY_CAPACITY>,
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Validates a raw connection-request record and converts it into a
/// [`ConnectInfo`].
///
/// # Errors
///
/// Returns [`MalformedRequest`] if the record has the wrong size, if any
/// declared text length leaves no room for the terminator or is odd, or if
/// the code unit at any declared length is not the terminator.  Nothing is
/// copied out of a record that fails.
pub fn decode_connect_info(bytes: &[u8]) -> Result<ConnectInfo, MalformedRequest> {
    if bytes.len() != CONNECT_RECORD_SIZE {
        return Err(MalformedRequest::WrongSize {
            expected: CONNECT_RECORD_SIZE,
            actual: bytes.len(),
        });
    }

    // Every length is bounded before any terminator is looked at, so the
    // terminator reads below always land inside the field's buffer.
    let mut lengths = [0u32; 3];
    for (slot, field) in lengths.iter_mut().zip(TextField::ALL) {
        let declared = fixed_u32(bytes, field.length_offset());
        if declared as usize > field.max_byte_len() {
            return Err(MalformedRequest::LengthOutOfBounds {
                field,
                declared,
                limit: field.max_byte_len(),
            });
        }
        if declared % 2 != 0 {
            return Err(MalformedRequest::OddLength { field, declared });
        }
        *slot = declared;
    }

    for (declared, field) in lengths.iter().copied().zip(TextField::ALL) {
        let at = field.buffer_offset() + declared as usize;
        if fixed_u16(bytes, at) != 0 {
            return Err(MalformedRequest::MissingTerminator { field, declared });
        }
    }

    let settings = SessionConfig {
        hotkey: fixed_u32(bytes, 4),
        startup_flags: StartupFlags(fixed_u32(bytes, 8)),
        fill_attribute: fixed_u16(bytes, 12),
        show_window: fixed_u16(bytes, 14),
        screen_buffer_size: fixed_coord(bytes, 16),
        window_size: fixed_coord(bytes, 20),
        window_origin: fixed_coord(bytes, 24),
        ..SessionConfig::default()
    };

    Ok(ConnectInfo {
        settings,
        process_group_id: fixed_u32(bytes, 28),
        console_app: bytes[32] != 0,
        window_visible: bytes[33] != 0,
        title: copy_text(bytes, TextField::Title, lengths[0]),
        app_name: copy_text(bytes, TextField::ApplicationName, lengths[1]),
        current_directory: copy_text(bytes, TextField::CurrentDirectory, lengths[2]),
    })
}

fn copy_text<const N: usize>(bytes: &[u8], field: TextField, byte_len: u32) -> BoundedText<N> {
    let base = field.buffer_offset();
    let mut units = [0u16; N];
    for (i, unit) in units.iter_mut().enumerate() {
        *unit = fixed_u16(bytes, base + i * 2);
    }
    BoundedText { units, byte_len }
}

// The record size was checked up front, so fixed offsets cannot be out of
// range; the fallback values are unreachable.
fn fixed_u16(bytes: &[u8], offset: usize) -> u16 {
    read_u16(bytes, offset).unwrap_or(u16::MAX)
}

fn fixed_u32(bytes: &[u8], offset: usize) -> u32 {
    read_u32(bytes, offset).unwrap_or(u32::MAX)
}

fn fixed_coord(bytes: &[u8], offset: usize) -> Coord {
    Coord::new(
        read_i16(bytes, offset).unwrap_or_default(),
        read_i16(bytes, offset + 2).unwrap_or_default(),
    )
}

// ── Encoding (client side) ────────────────────────────────────────────────────

/// Client-side description of a connection request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectRequest {
    pub hotkey: u32,
    pub startup_flags: StartupFlags,
    pub fill_attribute: u16,
    pub show_window: u16,
    pub screen_buffer_size: Coord,
    pub window_size: Coord,
    pub window_origin: Coord,
    pub process_group_id: u32,
    pub console_app: bool,
    pub window_visible: bool,
    pub title: String,
    pub app_name: String,
    pub current_directory: String,
}

/// Encodes a well-formed connection-request record.
///
/// Text longer than a field allows is truncated so the terminator always
/// fits.
pub fn encode_connect_request(request: &ConnectRequest) -> Vec<u8> {
    let mut buf = Vec::with_capacity(CONNECT_RECORD_SIZE);
    buf.extend_from_slice(&0u32.to_le_bytes()); // icon_id
    buf.extend_from_slice(&request.hotkey.to_le_bytes());
    buf.extend_from_slice(&request.startup_flags.0.to_le_bytes());
    buf.extend_from_slice(&request.fill_attribute.to_le_bytes());
    buf.extend_from_slice(&request.show_window.to_le_bytes());
    for coord in [request.screen_buffer_size, request.window_size, request.window_origin] {
        buf.extend_from_slice(&coord.x.to_le_bytes());
        buf.extend_from_slice(&coord.y.to_le_bytes());
    }
    buf.extend_from_slice(&request.process_group_id.to_le_bytes());
    buf.push(u8::from(request.console_app));
    buf.push(u8::from(request.window_visible));
    buf.extend_from_slice(&[0u8; 6]);

    write_text(&mut buf, &request.title, TextField::Title);
    write_text(&mut buf, &request.app_name, TextField::ApplicationName);
    write_text(&mut buf, &request.current_directory, TextField::CurrentDirectory);
    buf
}

fn write_text(buf: &mut Vec<u8>, text: &str, field: TextField) {
    let bounded = bound_to_utf16_units(text, field.capacity() - 1);
    let units: Vec<u16> = bounded.encode_utf16().collect();
    buf.extend_from_slice(&((units.len() * 2) as u32).to_le_bytes());
    for i in 0..field.capacity() {
        let unit = units.get(i).copied().unwrap_or(0);
        buf.extend_from_slice(&unit.to_le_bytes());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
