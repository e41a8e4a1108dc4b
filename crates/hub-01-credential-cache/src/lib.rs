//! # Credential & Integration Cache
//!
//! **Component:** hub-01
//!
//! Hands outbound workers the integration metadata and the credential fields
//! they need without a database round-trip per call.
//!
//! ## Layering
//!
//! ```text
//!   get_integration / get_credential_field
//!                 │
//!   ┌─────────────▼──────────────┐   meta 5 min, ciphertext 5 min,
//!   │ L1  in-process TTL maps    │   plaintext 30 s
//!   └─────────────┬──────────────┘
//!                 │ miss
//!   ┌─────────────▼──────────────┐   integration:meta:<id>
//!   │ L2  SharedCache (K/V)      │   integration:creds:<id>
//!   └─────────────┬──────────────┘
//!                 │ miss
//!   ┌─────────────▼──────────────┐
//!   │ L3  IntegrationStore       │   store of record, repopulates L2 + L1
//!   └────────────────────────────┘
//! ```
//!
//! Ciphertext travels through L2 and L3; plaintext exists only in L1 and only
//! for the plaintext TTL. Decryption uses the owning tenant's derived key.
//!
//! ## Write-through
//!
//! The CRUD editor never touches the cache layers directly. It calls
//! `put_integration` / `remove_integration`, which write the store and
//! invalidate L1 and L2.
//!
//! ## Module Structure
//!
//! ```text
//! domain/   - CachedIntegration, EncryptedCredentials, IntegrationType registry, CacheError
//! ports/    - CredentialCacheApi (inbound), SharedCache + IntegrationStore (outbound)
//! adapters/ - in-memory, Redis (feature `redis`), PostgreSQL (feature `postgres`)
//! service   - CredentialCacheService
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{InMemoryIntegrationStore, InMemorySharedCache};
pub use domain::{
    creds_key, meta_key, CacheError, CachedIntegration, EncryptedCredentials, IntegrationCategory,
    IntegrationType, StoredIntegration,
};
pub use ports::{CredentialCacheApi, IntegrationStore, SharedCache};
pub use service::{CacheConfig, CredentialCacheService};

#[cfg(feature = "postgres")]
pub use adapters::postgres::PgIntegrationStore;
#[cfg(feature = "redis")]
pub use adapters::redis::RedisSharedCache;
