//! Domain layer: cached entities, the integration type registry, errors.

mod entities;
mod errors;
mod registry;

pub use entities::{creds_key, meta_key, CachedIntegration, EncryptedCredentials, StoredIntegration};
pub use errors::CacheError;
pub use registry::{IntegrationCategory, IntegrationType};
