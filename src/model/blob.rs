use std::fmt::{Debug, Formatter};

use data_encoding::BASE64;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Opaque biometric bytes: an enrolled descriptor or a captured assertion.
/// Travels as standard base64, both on the wire and at rest.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Blob(Vec<u8>);

impl Blob {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compare without short-circuiting on the first differing byte.
    /// Lengths are not secret.
    pub fn ct_eq(&self, other: &Blob) -> bool {
        self.0.as_slice().ct_eq(other.0.as_slice()).into()
    }
}

// Template material never ends up in logs.
impl Debug for Blob {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Blob({} bytes)", self.0.len())
    }
}

impl TryFrom<String> for Blob {
    type Error = data_encoding::DecodeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        BASE64.decode(s.as_bytes()).map(Self)
    }
}

impl From<Blob> for String {
    fn from(blob: Blob) -> Self {
        BASE64.encode(&blob.0)
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Blob {
        pub fn example_fingerprint() -> Self {
            Self::new(b"minutiae:0412:1187:2290:3301".to_vec())
        }

        pub fn example_face() -> Self {
            Self::new(b"landmarks:17:44:62:90:131".to_vec())
        }
    }
}
