use hex::FromHex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of a block hash in bytes.
pub const HASH_LEN: usize = 32;

/// Fixed-length block identifier.
///
/// Kept in the byte order the node reports it in, so `Display` reproduces the
/// provider's hex string exactly. Archive file names embed this rendering.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlockHash(pub [u8; HASH_LEN]);

impl BlockHash {
    /// A hash whose every byte is `byte`. Handy for fixtures.
    pub const fn repeat_byte(byte: u8) -> Self {
        BlockHash([byte; HASH_LEN])
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

impl FromStr for BlockHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; HASH_LEN] = <[u8; HASH_LEN]>::from_hex(s)?;
        Ok(BlockHash(bytes))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({self})")
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const GENESIS: &str = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";

    #[test]
    fn test_parse_and_display_preserve_order() {
        let hash: BlockHash = GENESIS.parse().unwrap();
        assert_eq!(hash.as_bytes()[0], 0x00);
        assert_eq!(hash.as_bytes()[31], 0x6f);
        assert_eq!(hash.to_string(), GENESIS);
    }

    #[test]
    fn test_uppercase_input_renders_lowercase() {
        let hash: BlockHash = GENESIS.to_uppercase().parse().unwrap();
        assert_eq!(hash.to_string(), GENESIS);
    }

    #[rstest]
    #[case("")]
    #[case("abcd")]
    #[case(&GENESIS[..62])]
    #[case("zz0000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f")]
    fn test_rejects_invalid(#[case] input: &str) {
        assert!(input.parse::<BlockHash>().is_err());
    }

    #[test]
    fn test_serde_uses_hex_string() {
        let hash = BlockHash::repeat_byte(0xab);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        let back: BlockHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
