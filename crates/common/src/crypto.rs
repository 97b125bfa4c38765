//! Field-level encryption for personally identifiable data.
//!
//! Values are sealed with ChaCha20-Poly1305 under a 32-byte key and stored as
//! `enc:v1:<base64(nonce || ciphertext)>`. Only the service layer's
//! decryption service is expected to call [`FieldCipher::open`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};
use thiserror::Error;

const PREFIX: &str = "enc:v1:";
const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("encryption key must be {KEY_LEN} bytes of base64")]
    InvalidKey,
    #[error("value is not an encrypted field")]
    NotEncrypted,
    #[error("malformed ciphertext")]
    Malformed,
    #[error("seal failed")]
    Seal,
    #[error("open failed")]
    Open,
}

#[derive(Clone)]
pub struct FieldCipher {
    aead: ChaCha20Poly1305,
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FieldCipher(..)")
    }
}

impl FieldCipher {
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKey);
        }
        Ok(Self { aead: ChaCha20Poly1305::new(Key::from_slice(key)) })
    }

    /// Build from a base64-encoded key as found in configuration.
    pub fn from_base64_key(encoded: &str) -> Result<Self, CipherError> {
        let key = STANDARD.decode(encoded.trim()).map_err(|_| CipherError::InvalidKey)?;
        Self::new(&key)
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, CipherError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self.aead.encrypt(&nonce, plaintext.as_bytes()).map_err(|_| CipherError::Seal)?;
        let mut raw = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&ciphertext);
        Ok(format!("{PREFIX}{}", STANDARD.encode(raw)))
    }

    pub fn open(&self, sealed: &str) -> Result<String, CipherError> {
        let body = sealed.strip_prefix(PREFIX).ok_or(CipherError::NotEncrypted)?;
        let raw = STANDARD.decode(body).map_err(|_| CipherError::Malformed)?;
        if raw.len() <= NONCE_LEN {
            return Err(CipherError::Malformed);
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plain = self
            .aead
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::Open)?;
        String::from_utf8(plain).map_err(|_| CipherError::Malformed)
    }

    pub fn is_sealed(value: &str) -> bool {
        value.starts_with(PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> FieldCipher {
        FieldCipher::new(&[7u8; KEY_LEN]).unwrap()
    }

    #[test]
    fn sealed_value_hides_plaintext_and_opens() {
        let c = cipher();
        let sealed = c.seal("jane@example.com").unwrap();
        assert!(FieldCipher::is_sealed(&sealed));
        assert!(!sealed.contains("jane"));
        assert_eq!(c.open(&sealed).unwrap(), "jane@example.com");
    }

    #[test]
    fn nonces_differ_between_seals() {
        let c = cipher();
        assert_ne!(c.seal("same").unwrap(), c.seal("same").unwrap());
    }

    #[test]
    fn wrong_key_cannot_open() {
        let sealed = cipher().seal("secret").unwrap();
        let other = FieldCipher::new(&[9u8; KEY_LEN]).unwrap();
        assert_eq!(other.open(&sealed), Err(CipherError::Open));
    }

    #[test]
    fn rejects_bad_keys_and_plain_values() {
        assert_eq!(FieldCipher::new(&[1u8; 16]).unwrap_err(), CipherError::InvalidKey);
        assert_eq!(FieldCipher::from_base64_key("not base64!").unwrap_err(), CipherError::InvalidKey);
        assert_eq!(cipher().open("plain"), Err(CipherError::NotEncrypted));
        assert_eq!(cipher().open("enc:v1:AAAA"), Err(CipherError::Malformed));
    }

    #[test]
    fn debug_does_not_leak_key() {
        assert_eq!(format!("{:?}", cipher()), "FieldCipher(..)");
    }
}
