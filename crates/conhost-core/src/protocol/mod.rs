//! Protocol module containing frame types, the frame codec, and the
//! connection-request record.

pub mod codec;
pub mod connect;
pub mod messages;

pub use codec::{decode_reply, decode_request, encode_reply, encode_request, ProtocolError};
pub use connect::{
    decode_connect_info, encode_connect_request, BoundedText, ConnectInfo, ConnectRequest,
    MalformedRequest, TextField,
};
pub use messages::*;
