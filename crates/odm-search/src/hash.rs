//! Channel identity hashing

use crate::query::QueryMask;
use std::fmt::{self, Display, Formatter};

/// Stable 32-byte identity of a search channel (Blake3)
///
/// Derived from the connection identity, query mask and row limit only, so
/// logically identical channels built independently hash equal. Used as the
/// cache and row-group key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelHash([u8; 32]);

impl ChannelHash {
    /// Compute the hash of a channel's defining triple
    #[must_use]
    pub fn compute(connection: &str, mask: QueryMask, limit: usize) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(connection.as_bytes());
        hasher.update(&[0]);
        hasher.update(mask.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(&(limit as u64).to_le_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for ChannelHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_triples_hash_equal() {
        let a = ChannelHash::compute("abc", QueryMask::Label, 10);
        let b = ChannelHash::compute("abc", QueryMask::Label, 10);
        assert_eq!(a, b);
    }

    #[test]
    fn each_component_changes_the_hash() {
        let base = ChannelHash::compute("abc", QueryMask::Label, 10);
        assert_ne!(base, ChannelHash::compute("abd", QueryMask::Label, 10));
        assert_ne!(base, ChannelHash::compute("abc", QueryMask::Alias, 10));
        assert_ne!(base, ChannelHash::compute("abc", QueryMask::Label, 11));
    }

    #[test]
    fn short_is_sixteen_hex_chars() {
        let hash = ChannelHash::compute("abc", QueryMask::Recent, 5);
        assert_eq!(hash.short().len(), 16);
        assert!(hash.to_string().starts_with(&hash.short()));
    }
}
