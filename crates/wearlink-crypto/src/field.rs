//! Field-level encryption for secrets at rest.
//!
//! Every sealed value is `hex(nonce || ciphertext || tag)` with a fresh
//! random 12-byte nonce, so equal plaintexts never produce equal columns.

use std::fmt;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// HKDF info string for the field key.
const HKDF_INFO: &[u8] = b"wearlink-field-encryption-v1";

/// HKDF salt for domain separation (recommended by RFC 5869).
const HKDF_SALT: &[u8] = b"wearlink-field-hkdf-salt-v1";

/// Size of the relay master key.
pub const MASTER_KEY_SIZE: usize = 32;

/// Nonce size for ChaCha20-Poly1305.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size.
const TAG_SIZE: usize = 16;

/// Seals and opens individual database fields.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: ChaCha20Poly1305,
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

fn hkdf_derive(master_key: &[u8; MASTER_KEY_SIZE]) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), master_key);
    let mut key = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key)
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
    Ok(key)
}

impl FieldCipher {
    /// Create a cipher from the raw 32-byte master key.
    pub fn new(master_key: &[u8; MASTER_KEY_SIZE]) -> Result<Self, CryptoError> {
        let mut key_bytes = hkdf_derive(master_key)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key_bytes));
        key_bytes.zeroize();
        Ok(Self { cipher })
    }

    /// Create a cipher from a hex-encoded master key (64 hex chars).
    pub fn from_hex(master_key_hex: &str) -> Result<Self, CryptoError> {
        let mut raw = hex::decode(master_key_hex.trim())
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        let result = <[u8; MASTER_KEY_SIZE]>::try_from(raw.as_slice())
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: MASTER_KEY_SIZE,
                actual: raw.len(),
            })
            .and_then(|mut key| {
                let cipher = Self::new(&key);
                key.zeroize();
                cipher
            });
        raw.zeroize();
        result
    }

    /// Encrypt a plaintext string into its hex column form.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(hex::encode(sealed))
    }

    /// Decrypt a value produced by [`FieldCipher::encrypt`].
    pub fn decrypt(&self, sealed_hex: &str) -> Result<String, CryptoError> {
        let sealed =
            hex::decode(sealed_hex).map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::DecryptionFailed("ciphertext too short".into()));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| {
                CryptoError::DecryptionFailed("wrong key or corrupted data".into())
            })?;

        String::from_utf8(plaintext).map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }
}
