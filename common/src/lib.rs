//! Constants and serialization helpers shared by the witness engine and the
//! `zk-pig` binary.

use std::{fmt, ops::Deref};

use ethereum_types::{H256, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The hash value of an account empty EVM code.
/// 0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470
pub const EMPTY_CODE_HASH: H256 = H256([
    197, 210, 70, 1, 134, 247, 35, 60, 146, 126, 125, 178, 220, 199, 3, 192, 229, 0, 182, 83, 202,
    130, 39, 59, 123, 250, 216, 4, 93, 133, 164, 112,
]);

/// The hash of an empty Merkle Patricia trie.
/// 0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421
pub const EMPTY_TRIE_HASH: H256 = H256([
    86, 232, 31, 23, 27, 204, 85, 166, 255, 131, 69, 230, 146, 192, 248, 110, 91, 72, 224, 27, 153,
    108, 173, 192, 1, 98, 47, 181, 227, 99, 180, 33,
]);

/// Converts an amount in `gwei` to `wei` units.
pub fn gwei_to_wei(gwei: U256) -> U256 {
    gwei * U256::from(10).pow(9.into())
}

/// Arbitrary byte string, serialized as `0x`-prefixed hex.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Bytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for Bytes {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl From<Bytes> for Vec<u8> {
    fn from(value: Bytes) -> Self {
        value.0
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl Serialize for Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        hex_bytes::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        hex_bytes::deserialize(deserializer).map(Self)
    }
}

/// `#[serde(with = "hex_bytes")]` for `Vec<u8>` fields.
pub mod hex_bytes {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        if digits.len() % 2 == 1 {
            // odd-length strings show up for some zero-valued fields
            return hex::decode(format!("0{digits}")).map_err(D::Error::custom);
        }
        hex::decode(digits).map_err(D::Error::custom)
    }
}

/// `#[serde(with = "quantity")]` for `u64` fields encoded as JSON-RPC
/// quantities (`0x` minimal hex).
pub mod quantity {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| D::Error::custom(format!("quantity `{s}` is missing the 0x prefix")))?;
        u64::from_str_radix(digits, 16).map_err(D::Error::custom)
    }

    /// Same as the parent module, for optional fields.
    pub mod opt {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<u64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u64>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(with = "super")] u64);

            Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(v)| v))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_code_hash() {
        assert_eq!(EMPTY_CODE_HASH, keccak_hash::keccak([]));
    }

    #[test]
    fn test_empty_trie_hash() {
        assert_eq!(EMPTY_TRIE_HASH, keccak_hash::keccak(rlp::NULL_RLP));
    }

    #[test]
    fn bytes_are_0x_hex() {
        let bytes = Bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        let json = serde_json::to_string(&bytes).unwrap();
        assert_eq!(json, "\"0xdeadbeef\"");
        assert_eq!(serde_json::from_str::<Bytes>(&json).unwrap(), bytes);
        assert_eq!(serde_json::from_str::<Bytes>("\"0x\"").unwrap(), Bytes::default());
    }

    #[test]
    fn quantities_are_minimal_hex() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Q {
            #[serde(with = "quantity")]
            n: u64,
            #[serde(with = "quantity::opt", default)]
            m: Option<u64>,
        }

        let q = Q { n: 0, m: Some(4096) };
        let json = serde_json::to_string(&q).unwrap();
        assert_eq!(json, r#"{"n":"0x0","m":"0x1000"}"#);
        assert_eq!(serde_json::from_str::<Q>(&json).unwrap(), q);
        assert_eq!(
            serde_json::from_str::<Q>(r#"{"n":"0x1b4"}"#).unwrap(),
            Q { n: 436, m: None }
        );
        assert!(serde_json::from_str::<Q>(r#"{"n":"12"}"#).is_err());
    }
}
