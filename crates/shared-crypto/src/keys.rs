//! # Key Material
//!
//! One master key per deployment; tenant keys are derived on demand and
//! dropped (zeroized) after use.

use crate::CryptoError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const KEY_SIZE: usize = 32;

const TENANT_KEY_LABEL: &[u8] = b"hub-tenant-key";

type HmacSha256 = Hmac<Sha256>;

/// Deployment master key (256-bit).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_SIZE]);

impl MasterKey {
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(array))
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let mut bytes =
            hex::decode(encoded.trim()).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        let key = Self::from_slice(&bytes);
        bytes.zeroize();
        key
    }

    /// Random key; tests and first-time setup.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// Derive the key for one tenant. Tenant `0` owns global integrations.
    pub fn tenant_key(&self, tenant_id: u64) -> Result<TenantKey, CryptoError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.0).map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: self.0.len(),
            }
        })?;
        mac.update(TENANT_KEY_LABEL);
        mac.update(&tenant_id.to_be_bytes());
        let mut derived = [0u8; KEY_SIZE];
        derived.copy_from_slice(&mac.finalize().into_bytes());
        Ok(TenantKey(derived))
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// Per-tenant AES-256 key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TenantKey([u8; KEY_SIZE]);

impl TenantKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TenantKey([REDACTED])")
    }
}
