//! # Shared Crypto
//!
//! Field-level encryption for integration credentials.
//!
//! - **AES-256-GCM** with a random 96-bit nonce per field, stored as
//!   `hex(nonce || ciphertext || tag)`.
//! - **Tenant-scoped keys**: each tenant's key is
//!   `HMAC-SHA256(master, "hub-tenant-key" || tenant_id)`. A ciphertext written
//!   for one tenant does not open under another tenant's key.
//! - **Bound to its slot**: the associated data is
//!   `integration:<id>:<field>`, so a ciphertext copied into another
//!   integration or field fails authentication.
//! - Key material is zeroized on drop and never printed.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cipher;
pub mod errors;
pub mod keys;

pub use cipher::CredentialCipher;
pub use errors::CryptoError;
pub use keys::{MasterKey, TenantKey, KEY_SIZE};
