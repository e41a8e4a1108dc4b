mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryRuleStore;
