use std::fmt;
use std::str::FromStr;

const PREFIX: &str = "blake3:";

/// A 32-byte Blake3 hash of a canonical item payload.
///
/// Rendered as `blake3:<hex>` in exchange files and store commands.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Computes the digest of the given data.
    pub fn of(data: &[u8]) -> Self {
        Digest(*blake3::hash(data).as_bytes())
    }

    /// The digest of the empty string, used as the root anchor of every log.
    pub fn empty() -> Self {
        Self::of(b"")
    }

    /// Creates a digest from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Digest(bytes)
    }

    /// Returns the digest as a byte slice.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(PREFIX)?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid digest: {0:?}")]
pub struct ParseDigestError(String);

impl FromStr for Digest {
    type Err = ParseDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDigestError(s.to_string());
        let hex = s.strip_prefix(PREFIX).ok_or_else(err)?;
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(err());
        }

        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
        }
        Ok(Digest(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_deterministic() {
        let d1 = Digest::of(b"hello world");
        let d2 = Digest::of(b"hello world");
        assert_eq!(d1, d2);
    }

    #[test]
    fn digest_different_data() {
        assert_ne!(Digest::of(b"hello"), Digest::of(b"world"));
    }

    #[test]
    fn empty_digest_is_hash_of_empty_string() {
        assert_eq!(Digest::empty(), Digest::from_bytes(*blake3::hash(b"").as_bytes()));
    }

    #[test]
    fn digest_display() {
        let s = Digest::of(b"test").to_string();
        assert!(s.starts_with("blake3:"));
        assert_eq!(s.len(), 7 + 64);
    }

    #[test]
    fn digest_parse() {
        let d = Digest::of(b"test");
        assert_eq!(d.to_string().parse::<Digest>().unwrap(), d);
        assert!("sha-256:abcd".parse::<Digest>().is_err());
        assert!("blake3:zz".parse::<Digest>().is_err());
        assert!(format!("blake3:{}", "+f".repeat(32)).parse::<Digest>().is_err());
    }
}
