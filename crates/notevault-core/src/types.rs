//! Strong identifier types.
//!
//! Both identifiers are 128-bit values rendered as 32 lowercase hex
//! characters on the wire and in storage.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::CoreError;

macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; 16]);

        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex string.
            pub fn from_hex(s: &str) -> Result<Self, CoreError> {
                let bytes = hex::decode(s).map_err(|e| CoreError::InvalidId(e.to_string()))?;
                let arr: [u8; 16] = bytes.as_slice().try_into().map_err(|_| {
                    CoreError::InvalidId(format!("expected 16 bytes, got {}", bytes.len()))
                })?;
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.to_hex()[..12])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl From<[u8; 16]> for $name {
            fn from(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }
        }

        impl std::str::FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_id!(
    /// Random identifier assigned once when a record is created. Never reused.
    RecordId
);

hex_id!(
    /// Stable owner partition key derived from the recovery phrase.
    IdentityId
);

impl RecordId {
    /// Generate a fresh random record id.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_hex_roundtrip() {
        let id = RecordId::from_bytes([0x42; 16]);
        let recovered = RecordId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, recovered);
        assert_eq!(id.to_hex().len(), 32);
    }

    #[test]
    fn test_record_id_rejects_wrong_length() {
        assert!(RecordId::from_hex("abcd").is_err());
        assert!(IdentityId::from_hex("zz").is_err());
    }

    #[test]
    fn test_random_ids_differ() {
        assert_ne!(RecordId::random(), RecordId::random());
    }

    #[test]
    fn test_identity_id_serde_as_hex_string() {
        let id = IdentityId::from_bytes([0xab; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(16)));
        let back: IdentityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_debug_is_truncated() {
        let id = RecordId::from_bytes([0xcd; 16]);
        assert_eq!(format!("{:?}", id), "RecordId(cdcdcdcdcdcd)");
    }
}
