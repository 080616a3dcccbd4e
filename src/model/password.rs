use std::sync::OnceLock;

use argon2::Config;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A salted argon2 password hash in PHC encoded form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Hash a plaintext password with a fresh random salt.
    pub fn new(password: &str) -> Result<Self> {
        // 16 bytes is the recommended salt length for argon2.
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        let encoded = argon2::hash_encoded(password.as_bytes(), &salt, &Config::default())?;
        Ok(Self(encoded))
    }

    /// Check a candidate password. The final comparison is constant-time.
    /// A malformed stored hash verifies nothing.
    pub fn verify(&self, candidate: &str) -> bool {
        argon2::verify_encoded(&self.0, candidate.as_bytes()).unwrap_or(false)
    }

    /// A hash of no real password, verified against when the claimed voter
    /// does not exist so that the response takes the same time.
    pub fn decoy() -> Option<&'static PasswordHash> {
        static DECOY: OnceLock<Option<PasswordHash>> = OnceLock::new();
        DECOY
            .get_or_init(|| {
                let mut filler = [0_u8; 24];
                rand::thread_rng().fill(&mut filler);
                PasswordHash::new(&data_encoding::BASE64.encode(&filler)).ok()
            })
            .as_ref()
    }
}
