//! AES-256-GCM authenticated encryption
//!
//! Sealed layout is `nonce || ciphertext || tag`. The nonce is prepended so
//! the payload decrypts without external state, and the 16-byte tag trails
//! the ciphertext exactly as the memory service has always stored it.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::{CryptoError, Result};

/// 256-bit key (32 bytes)
pub const KEY_SIZE: usize = 32;
/// 96-bit nonce (12 bytes)
pub const NONCE_SIZE: usize = 12;
/// 128-bit GCM tag (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Generate a fresh one-time key. Never reuse it across envelopes.
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng.fill_bytes(&mut key[..]);
    key
}

/// Generate a cryptographically secure random nonce
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt plaintext with AES-256-GCM under a fresh nonce.
///
/// Returns: nonce || ciphertext || tag
pub fn seal(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
        CryptoError::Encryption(format!("key must be {KEY_SIZE} bytes, got {}", key.len()))
    })?;

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from_slice(&nonce_bytes);

    // aes-gcm appends the tag to the ciphertext
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::Encryption("AES-GCM encryption failed".to_string()))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypt a payload produced by [`seal`].
///
/// Expects: nonce || ciphertext || tag
pub fn open(key: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::EnvelopeFormat(format!(
            "sealed payload is {} bytes, shorter than nonce and tag",
            sealed.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
        CryptoError::EnvelopeFormat(format!(
            "symmetric key must be {KEY_SIZE} bytes, got {}",
            key.len()
        ))
    })?;

    let (nonce_bytes, encrypted) = sealed.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, encrypted)
        .map_err(|_| CryptoError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = generate_key();
        let plaintext = b"user prefers tabs over spaces";

        let sealed = seal(&key[..], plaintext).unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
        assert_ne!(&sealed[NONCE_SIZE..NONCE_SIZE + plaintext.len()], plaintext);

        let opened = open(&key[..], &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_empty_plaintext() {
        let key = generate_key();
        let sealed = seal(&key[..], b"").unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + TAG_SIZE);
        assert!(open(&key[..], &sealed).unwrap().is_empty());
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = generate_key();
        let mut sealed = seal(&key[..], b"secret data").unwrap();

        if let Some(byte) = sealed.last_mut() {
            *byte ^= 0x01;
        }

        assert!(matches!(
            open(&key[..], &sealed),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = generate_key();
        let key2 = generate_key();

        let sealed = seal(&key1[..], b"secret data").unwrap();

        assert!(matches!(
            open(&key2[..], &sealed),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn test_short_payload_is_format_error() {
        let key = generate_key();
        assert!(matches!(
            open(&key[..], &[0u8; NONCE_SIZE + TAG_SIZE - 1]),
            Err(CryptoError::EnvelopeFormat(_))
        ));
    }

    #[test]
    fn test_bad_key_length() {
        assert!(matches!(
            seal(&[0u8; 16], b"data"),
            Err(CryptoError::Encryption(_))
        ));
        assert!(matches!(
            open(&[0u8; 16], &[0u8; 40]),
            Err(CryptoError::EnvelopeFormat(_))
        ));
    }

    #[test]
    fn test_nonces_are_fresh() {
        let key = generate_key();
        let a = seal(&key[..], b"same").unwrap();
        let b = seal(&key[..], b"same").unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
    }
}
