//! # Commerce Hub Runtime
//!
//! Configuration and wiring for the single-process hub.
//!
//! ```text
//!            ┌──────────────────── broker (memory:// | redis://) ────────────────────┐
//!            │ state topics                       request queues / response topics   │
//!            ▼                                          ▲                 │            │
//!   hub-03 ingest ──▶ EventRouter ──▶ SSE streams     hub-04 workers ◀────┘            │
//!            │               ▲                          │                              │
//!            ▼               │                          ▼                              │
//!   hub-02 policy        /events                 hub-01 credentials ──▶ store (memory:// | postgres://)
//!                                                       │
//!                                                       └──▶ L2 (memory:// | redis://)
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod wiring;

pub use config::{Backend, ConfigError, HubConfig};
pub use wiring::Hub;
