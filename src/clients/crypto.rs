use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{CuratorError, CuratorResult};

const NONCE_LEN: usize = 12;

/// Encrypts a secret (MS auth token, integration API key) with AES-256-GCM
/// under the operator-provided master key. The mirror stores only the
/// resulting `nonce || ciphertext`, base64-encoded — never the plaintext
/// (spec.md §9 Design Notes).
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// `key` must be exactly 32 bytes, read from `CURATOR_TOKEN_KEY`
    /// (base64) at startup.
    pub fn new(key: &[u8]) -> CuratorResult<Self> {
        if key.len() != 32 {
            return Err(CuratorError::Validation(
                "CURATOR_TOKEN_KEY must decode to 32 bytes".into(),
            ));
        }
        let key = Key::<Aes256Gcm>::from_slice(key);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    pub fn from_env() -> CuratorResult<Self> {
        let encoded = std::env::var("CURATOR_TOKEN_KEY")
            .map_err(|_| CuratorError::Validation("CURATOR_TOKEN_KEY not set".into()))?;
        let key = BASE64
            .decode(encoded.trim())
            .map_err(|e| CuratorError::Validation(format!("CURATOR_TOKEN_KEY not valid base64: {e}")))?;
        Self::new(&key)
    }

    pub fn encrypt(&self, plaintext: &str) -> CuratorResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CuratorError::Integrity("token encryption failed".into()))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    pub fn decrypt(&self, stored: &str) -> CuratorResult<String> {
        let raw = BASE64
            .decode(stored)
            .map_err(|e| CuratorError::Integrity(format!("ciphertext not valid base64: {e}")))?;
        if raw.len() < NONCE_LEN {
            return Err(CuratorError::Integrity("ciphertext too short".into()));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CuratorError::Integrity("token decryption failed".into()))?;
        String::from_utf8(plaintext)
            .map_err(|_| CuratorError::Integrity("decrypted token not valid utf-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> TokenCipher {
        TokenCipher::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn roundtrips() {
        let cipher = test_cipher();
        let ct = cipher.encrypt("super-secret-token").unwrap();
        assert_ne!(ct, "super-secret-token");
        let pt = cipher.decrypt(&ct).unwrap();
        assert_eq!(pt, "super-secret-token");
    }

    #[test]
    fn distinct_nonces_per_call() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same-plaintext").unwrap();
        let b = cipher.encrypt("same-plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_short_key() {
        assert!(TokenCipher::new(&[1u8; 16]).is_err());
    }
}
