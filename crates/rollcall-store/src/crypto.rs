//! Descriptor encryption at rest — AES-256-GCM with a file-backed key.
//!
//! A face descriptor is biometric data; rows leaked from the SQLite file
//! must not be directly comparable. Sealed layout: 12-byte random nonce
//! followed by the GCM ciphertext of the little-endian f32 values.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("key file: {0}")]
    KeyFile(#[from] std::io::Error),
    #[error("key file has wrong length: expected {KEY_LEN} bytes, got {0}")]
    BadKeyLength(usize),
    #[error("encryption failed")]
    SealFailed,
    #[error("sealed blob shorter than the nonce")]
    Truncated,
    #[error("decryption failed — wrong key or corrupted blob")]
    Unsealable,
    #[error("sealed payload is not a whole number of f32 values")]
    BadPayload,
}

/// Seals and opens descriptor vectors with a single symmetric key.
pub struct DescriptorCipher {
    cipher: Aes256Gcm,
    fingerprint: String,
}

impl DescriptorCipher {
    /// Load the key from `path`, generating one (mode 0600) on first run.
    pub fn load_or_generate(path: &Path) -> Result<Self, CryptoError> {
        let key_bytes = if path.exists() {
            let bytes = std::fs::read(path)?;
            if bytes.len() != KEY_LEN {
                return Err(CryptoError::BadKeyLength(bytes.len()));
            }
            bytes
        } else {
            let mut bytes = vec![0u8; KEY_LEN];
            OsRng.fill_bytes(&mut bytes);

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut opts = std::fs::OpenOptions::new();
            opts.write(true).create_new(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                opts.mode(0o600);
            }
            let mut file = opts.open(path)?;
            file.write_all(&bytes)?;

            tracing::info!(path = %path.display(), "generated new descriptor key");
            bytes
        };

        Self::from_key_bytes(&key_bytes)
    }

    /// Build a cipher from raw key bytes (exactly 32).
    pub fn from_key_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::BadKeyLength(bytes.len()));
        }

        let digest = Sha256::digest(bytes);
        let fingerprint = digest[..8].iter().map(|b| format!("{b:02x}")).collect();

        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(bytes)),
            fingerprint,
        })
    }

    /// Short key fingerprint for status output. Never the key itself.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Seal descriptor values under a fresh random nonce.
    pub fn seal(&self, values: &[f32]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let plaintext: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_ref())
            .map_err(|_| CryptoError::SealFailed)?;

        let mut blob = nonce.to_vec();
        blob.extend(ciphertext);
        Ok(blob)
    }

    /// Open a sealed blob back into descriptor values.
    pub fn open(&self, blob: &[u8]) -> Result<Vec<f32>, CryptoError> {
        if blob.len() < NONCE_LEN {
            return Err(CryptoError::Truncated);
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Unsealable)?;

        if plaintext.len() % 4 != 0 {
            return Err(CryptoError::BadPayload);
        }

        Ok(plaintext
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> DescriptorCipher {
        DescriptorCipher::from_key_bytes(&[7u8; KEY_LEN]).unwrap()
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let c = cipher();
        let values = vec![0.25f32, -1.5, 0.0, 42.0];
        let blob = c.seal(&values).unwrap();
        assert_eq!(c.open(&blob).unwrap(), values);
    }

    #[test]
    fn test_seal_is_randomized() {
        // Fresh nonce per seal: same plaintext, different blobs.
        let c = cipher();
        let values = vec![1.0f32; 128];
        assert_ne!(c.seal(&values).unwrap(), c.seal(&values).unwrap());
    }

    #[test]
    fn test_tampered_blob_rejected() {
        let c = cipher();
        let mut blob = c.seal(&[0.5f32, 0.5]).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xff;
        assert!(matches!(c.open(&blob), Err(CryptoError::Unsealable)));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let blob = cipher().seal(&[0.5f32]).unwrap();
        let other = DescriptorCipher::from_key_bytes(&[9u8; KEY_LEN]).unwrap();
        assert!(matches!(other.open(&blob), Err(CryptoError::Unsealable)));
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let c = cipher();
        assert!(matches!(c.open(&[1, 2, 3]), Err(CryptoError::Truncated)));
    }

    #[test]
    fn test_bad_key_length_rejected() {
        assert!(matches!(
            DescriptorCipher::from_key_bytes(&[0u8; 16]),
            Err(CryptoError::BadKeyLength(16))
        ));
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = cipher();
        let b = cipher();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);
    }

    #[test]
    fn test_key_file_created_on_first_run() {
        let path = std::env::temp_dir().join(format!(
            "rollcall-key-test-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));

        let first = DescriptorCipher::load_or_generate(&path).unwrap();
        let second = DescriptorCipher::load_or_generate(&path).unwrap();
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(std::fs::read(&path).unwrap().len(), KEY_LEN);

        let _ = std::fs::remove_file(&path);
    }
}
