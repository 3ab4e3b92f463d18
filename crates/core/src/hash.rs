//! Content hashing of zone definitions using BLAKE3

use std::fmt;

use serde::{Deserialize, Serialize};

/// A BLAKE3 hash of a zone's raw definition text.
///
/// Snapshots compare definitions by hash so the diff walk never has to
/// compare full VTIMEZONE blocks.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DefinitionHash([u8; 32]);

impl DefinitionHash {
    /// Hash arbitrary bytes
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash a definition, ignoring line-ending style
    #[must_use]
    pub fn of_definition(text: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        for line in text.lines() {
            hasher.update(line.trim_end_matches('\r').as_bytes());
            hasher.update(b"\n");
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Get raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for DefinitionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "DefinitionHash({})", hex.get(..16).unwrap_or(&hex))
    }
}

impl fmt::Display for DefinitionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "{}", hex.get(..16).unwrap_or(&hex))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let h1 = DefinitionHash::from_bytes(b"BEGIN:VTIMEZONE");
        let h2 = DefinitionHash::from_bytes(b"BEGIN:VTIMEZONE");
        assert_eq!(h1, h2);
        assert_ne!(h1, DefinitionHash::from_bytes(b"END:VTIMEZONE"));
    }

    #[test]
    fn test_definition_hash_ignores_crlf() {
        let unix = "BEGIN:VTIMEZONE\nTZID:Europe/Paris\nEND:VTIMEZONE\n";
        let dos = "BEGIN:VTIMEZONE\r\nTZID:Europe/Paris\r\nEND:VTIMEZONE\r\n";
        assert_eq!(
            DefinitionHash::of_definition(unix),
            DefinitionHash::of_definition(dos)
        );
    }

    #[test]
    fn test_display_is_short_hex() {
        let h = DefinitionHash::from_bytes(b"x");
        assert_eq!(h.to_string().len(), 16);
        assert_eq!(h.to_hex().len(), 64);
    }
}
