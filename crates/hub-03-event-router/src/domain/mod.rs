//! Router domain: sequenced events, filters, ring buffers, lifecycle.

mod buffer;
mod errors;
mod event;
pub mod filter;
mod lifecycle;

pub use buffer::{Gap, RingBuffer, Snapshot, TenantBuffers};
pub use errors::RouterError;
pub use event::SequencedEvent;
pub use filter::{StreamRequest, SubscriberFilter};
pub use lifecycle::{ConnectionState, Lifecycle};
