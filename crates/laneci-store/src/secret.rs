//! Sealing of provider tokens stored in `users.json`.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use crate::{PersistenceError, StoreResult};

const ENVELOPE_PREFIX: &str = "enc:v1:";
const NONCE_LEN: usize = 12;

/// ChaCha20-Poly1305 keyed by the SHA-256 of a passphrase.
///
/// Sealed values look like `enc:v1:<nonce>:<ciphertext>`, both base64url.
#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; 32],
}

impl SecretCipher {
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self {
            key: Sha256::digest(passphrase.as_bytes()).into(),
        }
    }

    pub fn is_sealed(value: &str) -> bool {
        value.starts_with(ENVELOPE_PREFIX)
    }

    /// Seal `plaintext`. Already sealed values are returned unchanged.
    pub fn encrypt(&self, plaintext: &str) -> StoreResult<String> {
        if Self::is_sealed(plaintext) {
            return Ok(plaintext.to_string());
        }

        let nonce_source = *Uuid::new_v4().as_bytes();
        let nonce = Nonce::from_slice(&nonce_source[..NONCE_LEN]);
        let ciphertext = self
            .aead()?
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| crypto(format!("failed to encrypt secret: {}", e)))?;

        Ok(format!(
            "{}{}:{}",
            ENVELOPE_PREFIX,
            URL_SAFE_NO_PAD.encode(&nonce_source[..NONCE_LEN]),
            URL_SAFE_NO_PAD.encode(ciphertext)
        ))
    }

    /// Open a sealed value. Values written before sealing was enabled pass through.
    pub fn decrypt(&self, stored: &str) -> StoreResult<String> {
        let Some(envelope) = stored.strip_prefix(ENVELOPE_PREFIX) else {
            return Ok(stored.to_string());
        };
        let Some((nonce_b64, ciphertext_b64)) = envelope.split_once(':') else {
            return Err(crypto("secret envelope is invalid"));
        };

        let nonce = URL_SAFE_NO_PAD
            .decode(nonce_b64.as_bytes())
            .map_err(|e| crypto(format!("failed to decode secret nonce: {}", e)))?;
        if nonce.len() != NONCE_LEN {
            return Err(crypto("secret nonce length is invalid"));
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext_b64.as_bytes())
            .map_err(|e| crypto(format!("failed to decode secret payload: {}", e)))?;

        let plaintext = self
            .aead()?
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| crypto("failed to decrypt secret, is the encryption key correct?"))?;
        String::from_utf8(plaintext).map_err(|e| crypto(format!("secret is not UTF-8: {}", e)))
    }

    fn aead(&self) -> StoreResult<ChaCha20Poly1305> {
        ChaCha20Poly1305::new_from_slice(&self.key)
            .map_err(|e| crypto(format!("failed to initialize cipher: {}", e)))
    }
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

fn crypto(message: impl Into<String>) -> crate::StoreError {
    PersistenceError::Crypto(message.into()).into()
}
