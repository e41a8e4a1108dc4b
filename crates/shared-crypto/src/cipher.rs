//! # Credential Cipher
//!
//! Encrypts and decrypts single credential fields under tenant-scoped keys.

use crate::keys::{MasterKey, TenantKey};
use crate::CryptoError;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// Field cipher bound to one deployment master key.
#[derive(Debug, Clone)]
pub struct CredentialCipher {
    master: MasterKey,
}

impl CredentialCipher {
    #[must_use]
    pub fn new(master: MasterKey) -> Self {
        Self { master }
    }

    /// Encrypt `plaintext` for `(tenant, integration, field)`; returns hex.
    pub fn encrypt_field(
        &self,
        tenant_id: u64,
        integration_id: u64,
        field: &str,
        plaintext: &str,
    ) -> Result<String, CryptoError> {
        let key = self.master.tenant_key(tenant_id)?;
        let aad = slot_aad(integration_id, field);
        seal(&key, plaintext.as_bytes(), aad.as_bytes())
    }

    /// Decrypt a hex field written by [`encrypt_field`](Self::encrypt_field).
    pub fn decrypt_field(
        &self,
        tenant_id: u64,
        integration_id: u64,
        field: &str,
        encoded: &str,
    ) -> Result<String, CryptoError> {
        let key = self.master.tenant_key(tenant_id)?;
        let aad = slot_aad(integration_id, field);
        let plaintext = open(&key, encoded, aad.as_bytes())?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidPlaintext)
    }
}

fn slot_aad(integration_id: u64, field: &str) -> String {
    format!("integration:{integration_id}:{field}")
}

fn seal(key: &TenantKey, plaintext: &[u8], aad: &[u8]) -> Result<String, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    let mut nonce = [0u8; NONCE_SIZE];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(hex::encode(out))
}

fn open(key: &TenantKey, encoded: &str, aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let raw = hex::decode(encoded).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
    let minimum = NONCE_SIZE + TAG_SIZE;
    if raw.len() < minimum {
        return Err(CryptoError::CiphertextTooShort {
            minimum,
            actual: raw.len(),
        });
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);
    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::DecryptionFailed)?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> CredentialCipher {
        CredentialCipher::new(MasterKey::from_bytes([42u8; 32]))
    }

    #[test]
    fn test_field_opens_in_its_own_slot() {
        let c = cipher();
        let sealed = c.encrypt_field(7, 42, "access_key", "s3cr3t").unwrap();
        assert_eq!(c.decrypt_field(7, 42, "access_key", &sealed).unwrap(), "s3cr3t");
    }

    #[test]
    fn test_other_tenant_cannot_open() {
        let c = cipher();
        let sealed = c.encrypt_field(7, 42, "access_key", "s3cr3t").unwrap();
        assert_eq!(
            c.decrypt_field(8, 42, "access_key", &sealed),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_ciphertext_is_bound_to_field_and_integration() {
        let c = cipher();
        let sealed = c.encrypt_field(7, 42, "access_key", "s3cr3t").unwrap();
        assert!(c.decrypt_field(7, 42, "username", &sealed).is_err());
        assert!(c.decrypt_field(7, 43, "access_key", &sealed).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let c = cipher();
        let sealed = c.encrypt_field(1, 1, "token", "abc").unwrap();
        let mut raw = hex::decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        assert_eq!(
            c.decrypt_field(1, 1, "token", &hex::encode(raw)),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_short_or_garbage_input() {
        let c = cipher();
        assert!(matches!(
            c.decrypt_field(1, 1, "token", "abcd"),
            Err(CryptoError::CiphertextTooShort { .. })
        ));
        assert!(matches!(
            c.decrypt_field(1, 1, "token", "not-hex"),
            Err(CryptoError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_nonces_differ_per_encryption() {
        let c = cipher();
        let a = c.encrypt_field(1, 1, "token", "same").unwrap();
        let b = c.encrypt_field(1, 1, "token", "same").unwrap();
        assert_ne!(a, b);
    }
}
