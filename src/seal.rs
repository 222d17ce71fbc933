//! Anonymous public-key sealing
//!
//! Secrets are sealed for a recipient's X25519 public key in the libsodium
//! `crypto_box_seal` format: a fresh ephemeral key pair per call, the ephemeral
//! public key prepended, XSalsa20-Poly1305 over the plaintext. Only the holder of
//! the recipient's secret key can open the result.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use crypto_box::PublicKey;
use rand::rngs::OsRng;

use crate::error::SealError;

/// Length of a recipient public key
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Bytes added to the plaintext: ephemeral public key plus authentication tag
pub const SEAL_OVERHEAD: usize = PUBLIC_KEY_LENGTH + 16;

/// Seal `plaintext` for `recipient`
pub fn seal(plaintext: &[u8], recipient: &[u8]) -> Result<Vec<u8>, SealError> {
    let bytes: [u8; PUBLIC_KEY_LENGTH] =
        recipient.try_into().map_err(|_| SealError::InvalidKey {
            expected: PUBLIC_KEY_LENGTH,
            actual: recipient.len(),
        })?;

    PublicKey::from(bytes)
        .seal(&mut OsRng, plaintext)
        .map_err(|_| SealError::Encryption)
}

/// Decode a base64 public key and check its length
pub fn decode_public_key(encoded: &str) -> Result<[u8; PUBLIC_KEY_LENGTH], SealError> {
    let decoded = STANDARD.decode(encoded.trim())?;
    let actual = decoded.len();
    decoded.try_into().map_err(|_| SealError::InvalidKey {
        expected: PUBLIC_KEY_LENGTH,
        actual,
    })
}
