//! Single-use link token generation and hashing.
//!
//! The plaintext is handed to the account owner exactly once; only the
//! SHA-256 digest is ever persisted.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Link token entropy in bytes.
const LINK_TOKEN_BYTES: usize = 32;

/// A freshly generated link token and its storage digest.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct LinkSecret {
    plain: String,
    #[zeroize(skip)]
    hash: String,
}

impl LinkSecret {
    /// The plaintext token to show to the user.
    pub fn plain(&self) -> &str {
        &self.plain
    }

    /// The hex SHA-256 digest to persist.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Generate a new random link token.
pub fn generate_link_secret() -> LinkSecret {
    let mut bytes = [0u8; LINK_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let plain = hex::encode(bytes);
    bytes.zeroize();
    let hash = hash_token(&plain);
    LinkSecret { plain, hash }
}

/// Hash a token for storage (raw tokens are never stored).
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
