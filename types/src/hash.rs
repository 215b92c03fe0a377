//! Chain transaction hash type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// A 32-byte EVM transaction hash.
///
/// Parsing accepts upper- or lower-case hex with or without a `0x` prefix, so
/// two spellings of the same hash always compare equal. This is what makes the
/// one-claim-per-transaction index work.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a hex-encoded transaction hash.
    pub fn parse(s: &str) -> Result<Self, TypesError> {
        decode_fixed::<32>(s).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Lower-case `0x`-prefixed form, as sent to the JSON-RPC node.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash(0x{})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for TxHash {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Decode a `0x`-optional hex string into exactly `N` bytes.
pub(crate) fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], TypesError> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(digits).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| TypesError::InvalidLength { expected: N, actual })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060";

    #[test]
    fn parse_is_case_and_prefix_insensitive() {
        let lower = TxHash::parse(HASH).unwrap();
        let upper = TxHash::parse(&HASH[2..].to_uppercase()).unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.to_string(), HASH);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = TxHash::parse("0xabc").unwrap_err();
        assert!(matches!(err, TypesError::InvalidHex(_)));
        let err = TxHash::parse("0xabcd").unwrap_err();
        assert_eq!(err, TypesError::InvalidLength { expected: 32, actual: 2 });
    }

    #[test]
    fn non_hex_is_rejected() {
        assert!(TxHash::parse("0xzz").is_err());
    }
}
