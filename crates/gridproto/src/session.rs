use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::ProtoError;

/// Opaque 16-byte session identifier.
///
/// Rendered as URL-safe base64 (no padding) in logs and topics; carried as the
/// raw 16 bytes on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId([u8; 16]);

impl SessionId {
    pub const LEN: usize = 16;

    /// The all-zero id, used as the origin of server-generated frames.
    pub const NIL: SessionId = SessionId([0u8; 16]);

    pub fn generate() -> Self {
        let mut b = [0u8; 16];
        getrandom::getrandom(&mut b).expect("getrandom");
        Self(b)
    }

    pub fn to_bytes(self) -> [u8; 16] {
        self.0
    }

    pub fn from_bytes(b: [u8; 16]) -> Self {
        Self(b)
    }

    pub fn parse(s: &str) -> Result<Self, ProtoError> {
        let decoded = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| ProtoError::Malformed("session id is not url-safe base64"))?;
        let b: [u8; 16] = decoded
            .try_into()
            .map_err(|_| ProtoError::Malformed("session id must decode to 16 bytes"))?;
        Ok(Self(b))
    }

    /// Good enough for compact logs/UI: XOR high/low halves.
    pub fn short(self) -> u64 {
        let hi = u64::from_be_bytes(self.0[..8].try_into().expect("8 bytes"));
        let lo = u64::from_be_bytes(self.0[8..].try_into().expect("8 bytes"));
        hi ^ lo
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl std::fmt::Debug for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionId({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::SessionId;

    #[test]
    fn bytes_round_trip() {
        let id = SessionId::generate();
        assert_eq!(SessionId::from_bytes(id.to_bytes()), id);
    }

    #[test]
    fn display_parse_round_trip() {
        let id = SessionId::generate();
        let s = id.to_string();
        assert_eq!(s.len(), 22); // 16 bytes, base64 no pad
        assert_eq!(SessionId::parse(&s).unwrap(), id);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(SessionId::parse("not base64 !!").is_err());
        assert!(SessionId::parse("AAAA").is_err()); // wrong length
    }
}
