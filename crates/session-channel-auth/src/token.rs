//! Provider tokens carried in the login redirect.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const KEY_LABEL: &[u8] = b"session-channel-provider-token-v1";
const KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;
const TAG_BYTES: usize = 16;

/// Provider token error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token is not valid base64")]
    Encoding,
    #[error("Token is too short")]
    Truncated,
    #[error("Token failed authentication")]
    Tampered,
    #[error("Token payload is invalid: {0}")]
    Payload(String),
    #[error("Token encryption failed")]
    Encrypt,
}

/// Reversible, tamper-evident encoding of a provider name.
///
/// Only the holder of the codec's secret can produce or read tokens;
/// the login endpoint decodes what `login` encoded.
pub trait ProviderTokenCodec: Send + Sync {
    /// Encode `provider` into an opaque, URL-safe token.
    ///
    /// # Errors
    /// Returns error if encryption fails.
    fn encode(&self, provider: &str) -> Result<String, TokenError>;

    /// Recover the provider name from `token`.
    ///
    /// # Errors
    /// Returns error for malformed or forged tokens.
    fn decode(&self, token: &str) -> Result<String, TokenError>;
}

#[derive(Serialize, Deserialize)]
struct TokenPayload {
    provider: String,
}

/// ChaCha20-Poly1305 sealed tokens keyed from the cookie secret.
///
/// Token layout: `base64url(nonce || ciphertext || tag)`.
pub struct SealedTokenCodec {
    cipher: ChaCha20Poly1305,
}

impl SealedTokenCodec {
    /// Derive the token key from `secret`.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self::from_key(&derive_key(secret.as_bytes()))
    }

    /// Codec with a random key, for processes without a configured secret.
    /// Its tokens do not survive a restart.
    #[must_use]
    pub fn ephemeral() -> Self {
        let mut key = [0u8; KEY_BYTES];
        OsRng.fill_bytes(&mut key);
        Self::from_key(&key)
    }

    fn from_key(key: &[u8; KEY_BYTES]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }
}

impl std::fmt::Debug for SealedTokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealedTokenCodec { .. }")
    }
}

fn derive_key(secret: &[u8]) -> [u8; KEY_BYTES] {
    let mut hasher = Sha256::new();
    hasher.update(KEY_LABEL);
    hasher.update(secret);
    let digest = hasher.finalize();
    let mut key = [0u8; KEY_BYTES];
    key.copy_from_slice(&digest[..KEY_BYTES]);
    key
}

impl ProviderTokenCodec for SealedTokenCodec {
    fn encode(&self, provider: &str) -> Result<String, TokenError> {
        let payload = serde_json::to_vec(&TokenPayload {
            provider: provider.to_owned(),
        })
        .map_err(|e| TokenError::Payload(e.to_string()))?;

        let mut nonce = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), payload.as_slice())
            .map_err(|_| TokenError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    fn decode(&self, token: &str) -> Result<String, TokenError> {
        let sealed = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| TokenError::Encoding)?;
        if sealed.len() < NONCE_BYTES + TAG_BYTES {
            return Err(TokenError::Truncated);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_BYTES);
        let payload = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| TokenError::Tampered)?;
        let payload: TokenPayload =
            serde_json::from_slice(&payload).map_err(|e| TokenError::Payload(e.to_string()))?;
        Ok(payload.provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_recovers_provider() {
        let codec = SealedTokenCodec::new("cookie-secret");
        let token = codec.encode("google").unwrap();
        assert!(!token.contains("google"));
        assert!(!token.contains(['+', '/', '=']));
        assert_eq!(codec.decode(&token).unwrap(), "google");
    }

    #[test]
    fn test_tokens_are_not_deterministic() {
        let codec = SealedTokenCodec::new("cookie-secret");
        assert_ne!(codec.encode("google").unwrap(), codec.encode("google").unwrap());
    }

    #[test]
    fn test_other_secret_cannot_decode() {
        let token = SealedTokenCodec::new("one").encode("google").unwrap();
        assert_eq!(
            SealedTokenCodec::new("two").decode(&token),
            Err(TokenError::Tampered)
        );
    }

    #[test]
    fn test_tampered_token_rejected() {
        let codec = SealedTokenCodec::new("cookie-secret");
        let mut raw = URL_SAFE_NO_PAD
            .decode(codec.encode("google").unwrap())
            .unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert_eq!(
            codec.decode(&URL_SAFE_NO_PAD.encode(raw)),
            Err(TokenError::Tampered)
        );
    }

    #[test]
    fn test_garbage_rejected() {
        let codec = SealedTokenCodec::ephemeral();
        assert_eq!(codec.decode("not base64!"), Err(TokenError::Encoding));
        assert_eq!(codec.decode("AAAA"), Err(TokenError::Truncated));
    }
}
