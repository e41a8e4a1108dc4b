//! # Shared Types Crate
//!
//! Domain envelopes exchanged over the broker by every hub component.
//!
//! ## Contents
//!
//! - **Identifiers**: `TenantId`, `IntegrationId`, `CorrelationId`
//! - **Events**: the `DomainEvent` envelope and the `EventType` namespace
//!   (`order.*`, `invoice.*`, `shipment.*`, `integration.sync.*`)
//! - **Invoicing**: `InvoiceRequest` / `InvoiceResponse` with the audit block
//! - **Errors**: the stable `ErrorKind` taxonomy and `ErrorCode` strings
//! - **Caching**: `TtlCache`, the shard-striped TTL map behind the credential
//!   and policy caches, and the `TimeSource` it reads
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every payload crossing the broker is defined
//!   here, so publishers and subscribers deserialize the same shape.
//! - **Schemaless edges, typed core**: `data` and `metadata` stay JSON maps,
//!   everything the fabric routes on is a typed field.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod errors;
pub mod event;
pub mod ids;
pub mod invoice;
pub mod time;
pub mod ttl_cache;

pub use errors::{ErrorCode, ErrorKind};
pub use event::{DomainEvent, EventFamily, EventType, EventTypeError, JsonMap};
pub use ids::{CorrelationId, IntegrationId, TenantId};
pub use invoice::{
    AuditBlock, Customer, InvoiceData, InvoiceItem, InvoiceOperation, InvoiceRequest,
    InvoiceResponse, InvoiceStatus,
};
pub use time::{ManualClock, SystemTimeSource, TimeSource};
pub use ttl_cache::TtlCache;
