//! Purpose: Define the public Rust API boundary for recordscan.
//! Exports: Core types plus the page sources, configuration, and invocation handler.
//! Role: Stable surface for the binary and integration tests; hides conversion helpers.
//! Invariants: This module is the only public path to scanner and envelope primitives.
//! Invariants: Page sources are interchangeable behind `PageSource`.

mod attribute;
mod config;
mod dynamo;
mod handler;
mod memory;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::envelope::{
    APPLICATION_JSON, CONTENT_TYPE, FailurePolicy, ResponseEnvelope, render, status_for,
};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::row::{Page, PageToken, Row};
pub use crate::core::scan::{Accumulation, DEFAULT_MAX_PAGES, ScanOptions, ScanReport, TableScanner};
pub use crate::core::source::{PageRequest, PageSource};
pub use attribute::{attribute_from_json, attribute_to_json};
pub use config::{
    DEFAULT_TABLE, ENV_ACCUMULATION, ENV_MAX_PAGES, ENV_ON_FETCH_ERROR, ENV_PAGE_LIMIT, ENV_TABLE,
    HandlerConfig, validate_config,
};
pub use dynamo::{ClientSettings, DynamoTable, shared_client};
pub use handler::{Invocation, InvocationContext, RecordsHandler};
pub use memory::{DEFAULT_MEMORY_PAGE_SIZE, MemoryTable};
