//! Secret encryption at rest
//!
//! Credential secrets are sealed with AES-256-GCM before they reach a
//! repository. The cipher is handed to the store explicitly; nothing in
//! this module reads process-wide configuration.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

/// AES-256 key size in bytes
pub const KEY_SIZE: usize = 32;

/// 12-byte nonce for AES-GCM (96 bits is the standard).
pub const NONCE_SIZE: usize = 12;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),
}

/// Ciphertext plus the per-record nonce it was sealed with
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedSecret {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
}

impl EncryptedSecret {
    /// Rebuild from the base64 columns a repository stores
    pub fn from_base64(ciphertext: &str, nonce: &str) -> Result<Self, CryptoError> {
        let ciphertext = STANDARD
            .decode(ciphertext)
            .map_err(|e| CryptoError::Decryption(format!("Invalid ciphertext encoding: {e}")))?;
        let nonce_bytes = STANDARD
            .decode(nonce)
            .map_err(|e| CryptoError::Decryption(format!("Invalid nonce encoding: {e}")))?;
        let nonce: [u8; NONCE_SIZE] = nonce_bytes.as_slice().try_into().map_err(|_| {
            CryptoError::Decryption(format!(
                "Invalid nonce size: expected {NONCE_SIZE}, got {}",
                nonce_bytes.len()
            ))
        })?;
        Ok(Self { ciphertext, nonce })
    }

    pub fn ciphertext_base64(&self) -> String {
        STANDARD.encode(&self.ciphertext)
    }

    pub fn nonce_base64(&self) -> String {
        STANDARD.encode(self.nonce)
    }
}

impl fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedSecret")
            .field("ciphertext", &format_args!("<{} bytes>", self.ciphertext.len()))
            .finish_non_exhaustive()
    }
}

/// Encryption capability injected into the credential store
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedSecret, CryptoError>;

    fn decrypt(&self, secret: &EncryptedSecret) -> Result<Zeroizing<Vec<u8>>, CryptoError>;
}

/// AES-256-GCM cipher with a random nonce per encryption
pub struct AesGcmCipher {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl AesGcmCipher {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Build from a base64-encoded 32-byte key
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| CryptoError::InvalidKey(format!("not valid base64: {e}")))?,
        );
        let key: [u8; KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "expected {KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::new(key))
    }

    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(&*self.key).map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }
}

impl fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesGcmCipher(..)")
    }
}

impl SecretCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedSecret, CryptoError> {
        let cipher = self.cipher()?;

        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        Ok(EncryptedSecret { ciphertext, nonce })
    }

    fn decrypt(&self, secret: &EncryptedSecret) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let cipher = self.cipher()?;

        cipher
            .decrypt(Nonce::from_slice(&secret.nonce), secret.ciphertext.as_slice())
            .map(Zeroizing::new)
            .map_err(|e| CryptoError::Decryption(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_hides_plaintext() {
        let cipher = AesGcmCipher::new([7u8; KEY_SIZE]);
        let sealed = cipher.encrypt(b"AIzaSy-secret").unwrap();

        assert_ne!(sealed.ciphertext.as_slice(), b"AIzaSy-secret");
        assert_eq!(&cipher.decrypt(&sealed).unwrap()[..], b"AIzaSy-secret");
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = AesGcmCipher::new([1u8; KEY_SIZE]).encrypt(b"secret").unwrap();
        let other = AesGcmCipher::new([2u8; KEY_SIZE]);

        assert!(matches!(other.decrypt(&sealed), Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn test_each_encryption_unique_nonce() {
        let cipher = AesGcmCipher::new([0u8; KEY_SIZE]);
        let a = cipher.encrypt(b"same").unwrap();
        let b = cipher.encrypt(b"same").unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_key_from_base64() {
        let encoded = STANDARD.encode([9u8; KEY_SIZE]);
        assert!(AesGcmCipher::from_base64(&encoded).is_ok());

        let short = STANDARD.encode([9u8; 16]);
        assert!(matches!(
            AesGcmCipher::from_base64(&short),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(AesGcmCipher::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_debug_does_not_leak_ciphertext() {
        let sealed = AesGcmCipher::new([3u8; KEY_SIZE]).encrypt(b"secret").unwrap();
        let rendered = format!("{:?}", sealed);
        assert!(rendered.contains("bytes"));
        assert!(!rendered.contains(&sealed.ciphertext_base64()));
    }

    #[test]
    fn test_base64_columns_restore() {
        let sealed = AesGcmCipher::new([4u8; KEY_SIZE]).encrypt(b"secret").unwrap();
        let restored =
            EncryptedSecret::from_base64(&sealed.ciphertext_base64(), &sealed.nonce_base64())
                .unwrap();
        assert_eq!(restored, sealed);

        assert!(EncryptedSecret::from_base64(&sealed.ciphertext_base64(), "AAAA").is_err());
    }
}
