//! Opaque identifiers for sessions and requests.
//!
//! Both identifiers carry 64 random bits and travel over the wire as
//! 16 lowercase hex characters. Uniqueness is probabilistic; no registry of
//! issued identifiers is consulted.

use alloc::string::String;
use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Number of random bytes behind every identifier.
pub const ID_BYTES: usize = 8;

/// Length of the hex encoding of an identifier.
pub const ID_HEX_LEN: usize = ID_BYTES * 2;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; ID_BYTES]);

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn random() -> Self {
                Self(rand::random())
            }

            /// Create an identifier from raw bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; ID_BYTES]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes of the identifier.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; ID_BYTES] {
                &self.0
            }

            /// Encode as a lowercase hex string.
            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Decode from a hex string.
            ///
            /// Returns `None` unless the input is exactly 16 hex characters.
            #[must_use]
            pub fn from_hex(s: &str) -> Option<Self> {
                if s.len() != ID_HEX_LEN {
                    return None;
                }

                let mut bytes = [0u8; ID_BYTES];
                hex::decode_to_slice(s, &mut bytes).ok()?;
                Some(Self(bytes))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
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
                Self::from_hex(&s).ok_or_else(|| {
                    de::Error::custom(concat!("invalid ", stringify!($name)))
                })
            }
        }
    };
}

opaque_id! {
    /// Identifier of a worker's session with the relay.
    ///
    /// Assigned by the relay at registration and sent by the worker on every
    /// subsequent poll and response delivery.
    SessionId
}

opaque_id! {
    /// Identifier correlating a submitted call with the worker's response.
    RequestId
}
