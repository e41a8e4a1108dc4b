//! # Commerce Hub Test Suite
//!
//! Cross-component scenarios run against a fully wired hub on the
//! in-memory broker.
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs   # hub harness, mock provider, envelopes
//!     ├── streaming.rs  # broker → router → streams
//!     └── invoicing.rs  # client → queue → worker → provider → response
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p hub-tests
//! cargo test -p hub-tests integration::streaming::
//! ```

pub mod integration;
