//! Hashing capability
//!
//! `HmacHasher` keys OTP codes with a server secret so a leaked table cannot
//! be brute-forced offline over the small code space. `Argon2Hasher` is for
//! passwords.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hashing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    #[error("Cannot hash empty input")]
    EmptyInput,

    #[error("Hashing backend failed: {0}")]
    Backend(String),
}

/// One-way hashing.
///
/// `verify` returns `Ok(false)` for a digest it does not recognise.
pub trait HashService: Send + Sync {
    fn hash(&self, text: &str) -> Result<String, HashError>;

    fn verify(&self, text: &str, digest: &str) -> Result<bool, HashError>;
}

// =============================================================================
// HMAC-SHA256
// =============================================================================

/// Keyed SHA-256, hex encoded
pub struct HmacHasher {
    key: Vec<u8>,
}

impl HmacHasher {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn mac(&self, text: &str) -> Result<HmacSha256, HashError> {
        if text.is_empty() {
            return Err(HashError::EmptyInput);
        }
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|e| HashError::Backend(e.to_string()))?;
        mac.update(text.as_bytes());
        Ok(mac)
    }
}

impl HashService for HmacHasher {
    fn hash(&self, text: &str) -> Result<String, HashError> {
        let mac = self.mac(text)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn verify(&self, text: &str, digest: &str) -> Result<bool, HashError> {
        let mac = self.mac(text)?;

        let expected = match hex::decode(digest) {
            Ok(bytes) if bytes.len() == 32 => bytes,
            _ => return Ok(false),
        };

        // Constant-time comparison
        Ok(mac.verify_slice(&expected).is_ok())
    }
}

impl std::fmt::Debug for HmacHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacHasher").finish_non_exhaustive()
    }
}

// =============================================================================
// Argon2
// =============================================================================

/// Argon2id with a random salt, PHC string format
#[derive(Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HashService for Argon2Hasher {
    fn hash(&self, text: &str) -> Result<String, HashError> {
        if text.is_empty() {
            return Err(HashError::EmptyInput);
        }

        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt).map_err(|e| HashError::Backend(e.to_string()))?;

        self.argon2
            .hash_password(text.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| HashError::Backend(e.to_string()))
    }

    fn verify(&self, text: &str, digest: &str) -> Result<bool, HashError> {
        if text.is_empty() {
            return Err(HashError::EmptyInput);
        }

        let Ok(parsed) = PasswordHash::new(digest) else {
            return Ok(false);
        };

        Ok(self.argon2.verify_password(text.as_bytes(), &parsed).is_ok())
    }
}
