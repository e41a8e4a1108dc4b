//! Ports layer.

mod inbound;
mod outbound;

pub use inbound::CredentialCacheApi;
pub use outbound::{IntegrationStore, SharedCache};
