// SPDX-License-Identifier: MIT OR Apache-2.0
//! Authenticated encryption for data at rest.
//!
//! Every ciphertext is framed as `nonce || seal(key, nonce, plaintext)` with a
//! fresh random 96-bit nonce, so a single byte string on disk is
//! self-contained. The cipher is chosen once at startup and applies to every
//! frame the process writes.

use std::fmt;
use std::str::FromStr;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use chacha20poly1305::ChaCha20Poly1305;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Result, VaultError};

/// Symmetric key size in bytes (AES-256 and ChaCha20 both take 32).
pub const KEY_SIZE: usize = 32;

/// Nonce size in bytes (96 bits for both supported AEADs).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// AEAD scheme used for all at-rest encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMethod {
    /// AES-256-GCM.
    Aes,
    /// ChaCha20-Poly1305.
    ChaCha20Poly1305,
}

impl EncryptionMethod {
    /// Configuration name for this method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes => "aes",
            Self::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }
}

impl fmt::Display for EncryptionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptionMethod {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "aes" => Ok(Self::Aes),
            "chacha20-poly1305" => Ok(Self::ChaCha20Poly1305),
            other => Err(VaultError::BadConfig(format!(
                "unknown encryption method: {other}"
            ))),
        }
    }
}

/// A 32-byte symmetric key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataKey {
    bytes: [u8; KEY_SIZE],
}

impl DataKey {
    /// Generate a fresh uniformly random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Build a key from a variable-length slice, rejecting wrong sizes.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != KEY_SIZE {
            return Err(VaultError::CryptoFailure(format!(
                "invalid key size: expected {KEY_SIZE}, got {}",
                slice.len()
            )));
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self { bytes })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey(..)")
    }
}

/// AEAD cipher bound to one key and one method.
pub struct Cipher {
    method: EncryptionMethod,
    key: DataKey,
}

impl Cipher {
    #[must_use]
    pub fn new(method: EncryptionMethod, key: DataKey) -> Self {
        Self { method, key }
    }

    #[must_use]
    pub fn method(&self) -> EncryptionMethod {
        self.method
    }

    /// Encrypt `plaintext`, returning the nonce-prefixed frame.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = match self.method {
            EncryptionMethod::Aes => {
                let cipher = Aes256Gcm::new_from_slice(self.key.as_bytes())
                    .map_err(|e| VaultError::CryptoFailure(format!("invalid key: {e}")))?;
                cipher
                    .encrypt(Nonce::from_slice(&nonce), plaintext)
                    .map_err(|e| VaultError::CryptoFailure(format!("encryption failed: {e}")))?
            },
            EncryptionMethod::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new_from_slice(self.key.as_bytes())
                    .map_err(|e| VaultError::CryptoFailure(format!("invalid key: {e}")))?;
                cipher
                    .encrypt(Nonce::from_slice(&nonce), plaintext)
                    .map_err(|e| VaultError::CryptoFailure(format!("encryption failed: {e}")))?
            },
        };

        let mut frame = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        frame.extend_from_slice(&nonce);
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }

    /// Decrypt a nonce-prefixed frame produced by [`Cipher::seal`].
    pub fn open(&self, frame: &[u8]) -> Result<Vec<u8>> {
        if frame.len() < NONCE_SIZE + TAG_SIZE {
            return Err(VaultError::CryptoFailure(format!(
                "ciphertext too short: {} bytes",
                frame.len()
            )));
        }

        let (nonce, ciphertext) = frame.split_at(NONCE_SIZE);

        match self.method {
            EncryptionMethod::Aes => {
                let cipher = Aes256Gcm::new_from_slice(self.key.as_bytes())
                    .map_err(|e| VaultError::CryptoFailure(format!("invalid key: {e}")))?;
                cipher
                    .decrypt(Nonce::from_slice(nonce), ciphertext)
                    .map_err(|e| VaultError::CryptoFailure(format!("decryption failed: {e}")))
            },
            EncryptionMethod::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new_from_slice(self.key.as_bytes())
                    .map_err(|e| VaultError::CryptoFailure(format!("invalid key: {e}")))?;
                cipher
                    .decrypt(Nonce::from_slice(nonce), ciphertext)
                    .map_err(|e| VaultError::CryptoFailure(format!("decryption failed: {e}")))
            },
        }
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher(method: EncryptionMethod) -> Cipher {
        Cipher::new(method, DataKey::from_bytes([7u8; KEY_SIZE]))
    }

    #[test]
    fn test_seal_open_roundtrip_aes() {
        let cipher = test_cipher(EncryptionMethod::Aes);
        let frame = cipher.seal(b"hello, vault").unwrap();
        assert_ne!(&frame[NONCE_SIZE..], b"hello, vault");
        assert_eq!(cipher.open(&frame).unwrap(), b"hello, vault");
    }

    #[test]
    fn test_seal_open_roundtrip_chacha() {
        let cipher = test_cipher(EncryptionMethod::ChaCha20Poly1305);
        let frame = cipher.seal(b"hello, vault").unwrap();
        assert_eq!(cipher.open(&frame).unwrap(), b"hello, vault");
    }

    #[test]
    fn test_methods_are_incompatible() {
        let aes = test_cipher(EncryptionMethod::Aes);
        let chacha = test_cipher(EncryptionMethod::ChaCha20Poly1305);

        let frame = aes.seal(b"data").unwrap();
        assert!(chacha.open(&frame).is_err());
    }

    #[test]
    fn test_fresh_nonce_per_frame() {
        let cipher = test_cipher(EncryptionMethod::Aes);
        let f1 = cipher.seal(b"same").unwrap();
        let f2 = cipher.seal(b"same").unwrap();
        assert_ne!(f1[..NONCE_SIZE], f2[..NONCE_SIZE]);
        assert_ne!(f1, f2);
    }

    #[test]
    fn test_short_frame_rejected() {
        let cipher = test_cipher(EncryptionMethod::Aes);
        let result = cipher.open(&[0u8; NONCE_SIZE + TAG_SIZE - 1]);
        assert!(matches!(result, Err(VaultError::CryptoFailure(_))));
    }

    #[test]
    fn test_tampered_frame_rejected() {
        let cipher = test_cipher(EncryptionMethod::Aes);
        let mut frame = cipher.seal(b"secret").unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(cipher.open(&frame).is_err());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let cipher = test_cipher(EncryptionMethod::Aes);
        let frame = cipher.seal(b"secret").unwrap();

        let other = Cipher::new(EncryptionMethod::Aes, DataKey::from_bytes([8u8; KEY_SIZE]));
        assert!(other.open(&frame).is_err());
    }

    #[test]
    fn test_empty_plaintext() {
        let cipher = test_cipher(EncryptionMethod::ChaCha20Poly1305);
        let frame = cipher.seal(b"").unwrap();
        assert_eq!(frame.len(), NONCE_SIZE + TAG_SIZE);
        assert_eq!(cipher.open(&frame).unwrap(), b"");
    }

    #[test]
    fn test_generated_keys_differ() {
        let k1 = DataKey::generate();
        let k2 = DataKey::generate();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_key_from_slice_wrong_size() {
        assert!(DataKey::from_slice(&[0u8; 16]).is_err());
        assert!(DataKey::from_slice(&[0u8; KEY_SIZE]).is_ok());
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("aes".parse::<EncryptionMethod>().unwrap(), EncryptionMethod::Aes);
        assert_eq!(
            "chacha20-poly1305".parse::<EncryptionMethod>().unwrap(),
            EncryptionMethod::ChaCha20Poly1305
        );
        assert!("des".parse::<EncryptionMethod>().is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let key = DataKey::from_bytes([0x41; KEY_SIZE]);
        let debug = format!("{key:?}");
        assert!(!debug.contains('A'));
    }
}
