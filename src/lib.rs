//! Purpose: Library crate backing the `recordscan` handler binary and tests.
//! Exports: `api` (scanner, page sources, envelope, handler, config, errors).
//! Role: Keeps the scan-and-serialize logic independent of any transport.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
//! Invariants: The store client is passed in; only `api::shared_client` holds process state.
pub mod api;
pub mod core;
