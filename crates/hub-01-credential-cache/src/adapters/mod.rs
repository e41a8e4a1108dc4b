//! Adapters layer: concrete L2 and L3 backends.

mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::{InMemoryIntegrationStore, InMemorySharedCache};
