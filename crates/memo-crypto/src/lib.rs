//! Memo Crypto - hybrid envelope encryption for stored memories
//!
//! This crate provides:
//! - RSA private key loading from PEM text (armoured or bare base64)
//! - AES-256-GCM authenticated encryption
//! - The envelope codec: one-time AES key, RSA-OAEP key wrap, RSA signature
//!
//! Memory content never leaves the process unencrypted. The service only
//! ever sees the base64 envelope produced by [`EnvelopeCodec::pack`].

pub mod cipher;
pub mod envelope;
pub mod keys;

pub use envelope::{Envelope, EnvelopeCodec, SignaturePolicy};
pub use keys::MemoKeyPair;

/// Errors that can occur in cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Key load failed: {0}")]
    KeyLoad(String),

    #[error("Malformed envelope: {0}")]
    EnvelopeFormat(String),

    #[error("Authentication failed - data was tampered with or sealed for another key")]
    Authentication,

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Encryption failed: {0}")]
    Encryption(String),
}

impl CryptoError {
    /// True for failures that concern a single envelope rather than the
    /// key material itself. A page of memories can skip past these.
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            CryptoError::EnvelopeFormat(_) | CryptoError::Authentication | CryptoError::SignatureInvalid
        )
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;
