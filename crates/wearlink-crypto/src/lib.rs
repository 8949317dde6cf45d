//! `WearLink` Crypto Library
//!
//! ## Crypto primitives
//!
//! - **Field encryption**: OAuth tokens and third-party API keys are sealed
//!   with ChaCha20-Poly1305 before they reach the database. The field key is
//!   derived from the relay master key via HKDF-SHA256.
//! - **Link tokens**: 256-bit random pairing secrets, stored only as their
//!   SHA-256 digest.

pub mod error;
pub mod field;
pub mod token;

pub use error::CryptoError;
pub use field::{FieldCipher, MASTER_KEY_SIZE, NONCE_SIZE};
pub use token::{LinkSecret, generate_link_secret, hash_token};
