//! Coordinator domain: errors, provider call types, token cache, correlation table.

mod call;
mod errors;
pub mod pending;
mod token;

pub use call::{
    merge_config, synthetic_audit, typed_config, Credentials, IssuedInvoice, ProviderCall, ProviderOutcome,
};
pub use errors::CoordinatorError;
pub use pending::{cleanup_task, PendingRequestStore, PendingStats};
pub use token::{effective_ttl, IssuedToken, TokenCache};
