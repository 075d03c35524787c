//! Capability token cipher
//! -----------------------
//! Seals small binary payloads into opaque, URL-safe tokens using AES-256-GCM
//! and verifies them on the way back in. Tokens are `base64url(nonce || ciphertext)`
//! with a fresh random 96-bit nonce per seal. Minting and opening are pure and
//! stateless; the cipher can be shared freely across request tasks.
//!
//! `open` fails closed: callers receive a `CipherError` they are expected to
//! collapse into the single user-facing `invalid_token` condition, never
//! exposing which stage rejected the token.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("token is not valid base64url")]
    Encoding,
    #[error("token is shorter than a nonce")]
    Truncated,
    #[error("token failed authentication")]
    Rejected,
    #[error("payload could not be sealed")]
    Sealing,
}

#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        Self { cipher }
    }

    /// Build a cipher from a base64 (standard or URL-safe, unpadded) encoded
    /// 32-byte key, as carried in `FILEGATE_TOKEN_KEY`.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let raw = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(encoded.trim()))
            .context("token key is not valid base64")?;
        let key: [u8; KEY_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("token key must be exactly {} bytes", KEY_LEN))?;
        Ok(Self::new(&key))
    }

    /// Generate a fresh random key, for first-run setups without a configured one.
    pub fn generate_key() -> Result<[u8; KEY_LEN]> {
        let mut key = [0u8; KEY_LEN];
        getrandom::getrandom(&mut key).map_err(|e| anyhow!("key generation failed: {e}"))?;
        Ok(key)
    }

    pub fn seal(&self, payload: &[u8]) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        getrandom::getrandom(&mut nonce_bytes).map_err(|_| CipherError::Sealing)?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, payload)
            .map_err(|_| CipherError::Sealing)?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    pub fn open(&self, token: &str) -> Result<Vec<u8>, CipherError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| CipherError::Encoding)?;
        if raw.len() <= NONCE_LEN {
            return Err(CipherError::Truncated);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CipherError::Rejected)
    }
}
