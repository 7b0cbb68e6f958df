//! Encrypted envelope format for memory content
//!
//! Wire form: `base64(JSON { data, key, signature })` where
//! - `data` is `base64(nonce || ciphertext || tag)` under a one-time AES-256 key
//! - `key` is that AES key wrapped with RSA-OAEP (SHA-256 digest and MGF1)
//! - `signature` is RSASSA-PKCS1-v1_5/SHA-256 over the base64 text of `data`
//!
//! Envelopes without a `key` are the legacy format, where `data` is the
//! plaintext wrapped directly with RSA-OAEP. The two generations are told
//! apart only by whether `key` is present and non-empty.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rsa::{Oaep, Pkcs1v15Sign};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use zeroize::Zeroizing;

use crate::cipher;
use crate::keys::MemoKeyPair;
use crate::{CryptoError, Result};

/// The three-field container carried in a memory's `ciphertext`/`content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Envelope {
    /// Legacy envelopes carry no wrapped symmetric key.
    pub fn is_legacy(&self) -> bool {
        self.key.as_deref().map_or(true, str::is_empty)
    }

    /// Serialize to the transmitted string form
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| CryptoError::Encryption(format!("envelope serialization: {e}")))?;
        Ok(STANDARD.encode(json))
    }

    /// Parse the transmitted string form
    pub fn decode(encoded: &str) -> Result<Self> {
        let json = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::EnvelopeFormat(format!("outer base64: {e}")))?;
        serde_json::from_slice(&json)
            .map_err(|e| CryptoError::EnvelopeFormat(format!("envelope json: {e}")))
    }
}

/// What `unpack` does with the `signature` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignaturePolicy {
    /// Modern envelopes must carry a valid signature from our own key.
    #[default]
    Verify,
    /// Carry the signature but never check it.
    Skip,
}

/// Packs and unpacks envelopes with a single key pair.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    keys: MemoKeyPair,
    signature_policy: SignaturePolicy,
}

impl EnvelopeCodec {
    pub fn new(keys: MemoKeyPair) -> Self {
        Self {
            keys,
            signature_policy: SignaturePolicy::default(),
        }
    }

    pub fn with_signature_policy(mut self, policy: SignaturePolicy) -> Self {
        self.signature_policy = policy;
        self
    }

    pub fn keys(&self) -> &MemoKeyPair {
        &self.keys
    }

    pub fn signature_policy(&self) -> SignaturePolicy {
        self.signature_policy
    }

    /// Encrypt and sign `plaintext`, returning the transmitted string form.
    pub fn pack(&self, plaintext: &[u8]) -> Result<String> {
        let packed = self.seal(plaintext)?.encode()?;
        debug!(
            plaintext_len = plaintext.len(),
            packed_len = packed.len(),
            "packed envelope"
        );
        Ok(packed)
    }

    /// Build a modern envelope around `plaintext`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Envelope> {
        let aes_key = cipher::generate_key();
        let sealed = cipher::seal(&aes_key[..], plaintext)?;
        let data = STANDARD.encode(sealed);

        let wrapped_key = self
            .keys
            .public_key()
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &aes_key[..])
            .map_err(|e| CryptoError::Encryption(format!("key wrap: {e}")))?;

        let signature = self.sign(&data)?;

        Ok(Envelope {
            data,
            key: Some(STANDARD.encode(wrapped_key)),
            signature: Some(STANDARD.encode(signature)),
        })
    }

    /// Decode the transmitted string form and recover the plaintext.
    pub fn unpack(&self, encoded: &str) -> Result<Vec<u8>> {
        let envelope = Envelope::decode(encoded)?;
        self.open(&envelope)
    }

    /// Recover the plaintext from a parsed envelope of either generation.
    pub fn open(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        if envelope.is_legacy() {
            return self.open_legacy(envelope);
        }

        let wrapped_key = decode_field("key", envelope.key.as_deref().unwrap_or_default())?;
        let aes_key = Zeroizing::new(
            self.keys
                .private_key()
                .decrypt_blinded(&mut OsRng, Oaep::new::<Sha256>(), &wrapped_key)
                .map_err(|_| CryptoError::Authentication)?,
        );

        let sealed = decode_field("data", &envelope.data)?;
        // The tag is checked before the signature so that a corrupted payload
        // always reports as an authentication failure.
        let plaintext = cipher::open(&aes_key[..], &sealed)?;

        if self.signature_policy == SignaturePolicy::Verify {
            self.verify(&envelope.data, envelope.signature.as_deref())?;
        }

        Ok(plaintext)
    }

    fn open_legacy(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        debug!("opening legacy envelope");
        let wrapped = decode_field("data", &envelope.data)?;
        self.keys
            .private_key()
            .decrypt_blinded(&mut OsRng, Oaep::new::<Sha256>(), &wrapped)
            .map_err(|_| CryptoError::Authentication)
    }

    fn sign(&self, data: &str) -> Result<Vec<u8>> {
        let digest = Sha256::digest(data.as_bytes());
        self.keys
            .private_key()
            .sign_with_rng(&mut OsRng, Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| CryptoError::Encryption(format!("signing: {e}")))
    }

    fn verify(&self, data: &str, signature: Option<&str>) -> Result<()> {
        let signature = match signature {
            Some(s) if !s.is_empty() => s,
            _ => return Err(CryptoError::SignatureInvalid),
        };
        let signature = decode_field("signature", signature)?;
        let digest = Sha256::digest(data.as_bytes());

        self.keys
            .public_key()
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
            .map_err(|_| CryptoError::SignatureInvalid)
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| CryptoError::EnvelopeFormat(format!("{name} base64: {e}")))
}
