/*
 * Responsibility
 * - password -> SHA-256 -> lowercase hex (64 chars)
 * - produce the same format stored in users.password
 * - no salt, single round (stored rows depend on this exact format)
 */
use std::fmt;

use sha2::{Digest, Sha256};

/// Length of a rendered digest in hex characters.
pub const DIGEST_HEX_LEN: usize = 64;

/// Hex rendering of `sha256(password)`.
///
/// Always exactly [`DIGEST_HEX_LEN`] lowercase hex characters.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PasswordDigest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Digest values stay out of debug logs.
impl fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordDigest(..)")
    }
}

pub fn digest(password: &str) -> PasswordDigest {
    let hash = Sha256::digest(password.as_bytes());
    PasswordDigest(hex::encode(hash))
}
