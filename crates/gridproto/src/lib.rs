//! `gridproto`: the binary wire protocol shared by the gridlock services.
//!
//! Every client payload carries a fixed transport header (session id + sequence
//! number) followed by a two-byte payload header `{data_type, sub_type}`; the
//! remaining bytes are type-specific. Decoders are "zero-copy" where it
//! matters: frame payloads travel as `bytes::Bytes` slices.

pub mod frame;
pub mod position;
pub mod room;
pub mod session;

#[derive(Debug, Clone)]
pub enum ProtoError {
    TooShort { need: usize, got: usize },
    UnknownType(u8),
    Malformed(&'static str),
}

impl std::fmt::Display for ProtoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtoError::TooShort { need, got } => {
                write!(f, "message too short: need {need}, got {got}")
            }
            ProtoError::UnknownType(t) => write!(f, "unknown message type: 0x{t:02x}"),
            ProtoError::Malformed(s) => write!(f, "malformed message: {s}"),
        }
    }
}

impl std::error::Error for ProtoError {}
