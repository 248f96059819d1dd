use crate::ProtoError;

/// 16-byte room identifier, rendered as lowercase hex.
///
/// The all-zero value is the "unassigned" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RoomId([u8; 16]);

impl RoomId {
    pub const LEN: usize = 16;

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

    pub fn is_empty(self) -> bool {
        self.0 == [0u8; 16]
    }

    /// Parses the lowercase-hex form produced by `Display` (32 hex digits).
    pub fn parse_hex(s: &str) -> Result<Self, ProtoError> {
        let s = s.trim();
        if s.len() != 32 || !s.is_ascii() {
            return Err(ProtoError::Malformed("room id must be 32 hex digits"));
        }
        let mut b = [0u8; 16];
        for (i, out) in b.iter_mut().enumerate() {
            let pair = &s[i * 2..i * 2 + 2];
            *out = u8::from_str_radix(pair, 16)
                .map_err(|_| ProtoError::Malformed("room id must be hex"))?;
        }
        Ok(Self(b))
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for x in self.0 {
            write!(f, "{x:02x}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RoomId({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::RoomId;

    #[test]
    fn default_is_empty_sentinel() {
        assert!(RoomId::default().is_empty());
        assert!(!RoomId::generate().is_empty());
    }

    #[test]
    fn hex_round_trip() {
        let id = RoomId::generate();
        let s = id.to_string();
        assert_eq!(s.len(), 32);
        assert_eq!(RoomId::parse_hex(&s).unwrap(), id);
    }

    #[test]
    fn parse_hex_rejects_bad_input() {
        assert!(RoomId::parse_hex("zz").is_err());
        assert!(RoomId::parse_hex(&"g".repeat(32)).is_err());
    }
}
