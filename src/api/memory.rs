//! Purpose: In-memory page source with store-like paging for tests and offline runs.
//! Exports: `MemoryTable`.
//! Role: Stand-in for the managed table; loads fixtures and injects fetch faults.
//! Invariants: Pages never exceed the configured page size (or the request limit).
//! Invariants: Tokens are opaque `{"offset": {"N": ..}}` keys; anything else is rejected.
//! Invariants: Unknown tables fail with `NotFound`, like the managed store.
#![allow(clippy::result_large_err)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Map, Value, json};

use crate::core::error::{Error, ErrorKind};
use crate::core::row::{Page, PageToken, Row};
use crate::core::source::{PageRequest, PageSource};

const OFFSET_KEY: &str = "offset";
pub const DEFAULT_MEMORY_PAGE_SIZE: usize = 100;

#[derive(Debug)]
pub struct MemoryTable {
    tables: BTreeMap<String, Vec<Row>>,
    page_size: usize,
    fetches: AtomicUsize,
    faults: Mutex<BTreeMap<usize, (ErrorKind, String)>>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
            page_size: DEFAULT_MEMORY_PAGE_SIZE,
            fetches: AtomicUsize::new(0),
            faults: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>, rows: Vec<Row>) -> Self {
        self.tables.insert(table.into(), rows);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Makes the `fetch`-th call (zero-based, counted across all tables) fail.
    pub fn fail_on_fetch(self, fetch: usize, kind: ErrorKind, message: impl Into<String>) -> Self {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(fetch, (kind, message.into()));
        }
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Loads rows from a JSON fixture.
    ///
    /// Accepted shapes: a bare array of rows (stored under `default_table`),
    /// an `aws dynamodb scan` dump (`{"Items": [...]}`, also under
    /// `default_table`), or an object mapping table names to row arrays.
    pub fn from_fixture_file(path: &Path, default_table: &str) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            let kind = match err.kind() {
                std::io::ErrorKind::NotFound => ErrorKind::NotFound,
                std::io::ErrorKind::PermissionDenied => ErrorKind::Permission,
                _ => ErrorKind::Io,
            };
            Error::new(kind)
                .with_message(format!("failed to read fixture {}", path.display()))
                .with_source(err)
        })?;
        let value: Value = serde_json::from_str(&raw).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message(format!("fixture {} is not valid json", path.display()))
                .with_source(err)
        })?;
        Self::from_fixture_value(value, default_table)
    }

    pub fn from_fixture_value(value: Value, default_table: &str) -> Result<Self, Error> {
        let mut table = Self::new();
        match value {
            Value::Array(items) => {
                table.tables.insert(default_table.to_string(), rows_from_items(items)?);
            }
            Value::Object(mut map) if map.contains_key("Items") => {
                let items = match map.remove("Items") {
                    Some(Value::Array(items)) => items,
                    _ => return Err(fixture_shape_error("\"Items\" must be an array")),
                };
                table.tables.insert(default_table.to_string(), rows_from_items(items)?);
            }
            Value::Object(map) => {
                for (name, items) in map {
                    let Value::Array(items) = items else {
                        return Err(fixture_shape_error(&format!(
                            "table {name} must map to an array of rows"
                        )));
                    };
                    table.tables.insert(name, rows_from_items(items)?);
                }
            }
            _ => return Err(fixture_shape_error("expected an array or object at top level")),
        }
        Ok(table)
    }

    fn take_fault(&self, fetch: usize) -> Option<Error> {
        let mut faults = self.faults.lock().ok()?;
        faults
            .remove(&fetch)
            .map(|(kind, message)| Error::new(kind).with_message(message))
    }
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSource for MemoryTable {
    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page, Error> {
        let fetch = self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_fault(fetch) {
            return Err(err);
        }
        let rows = self.tables.get(request.table).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message("requested table not found")
                .with_hint("Check the table name or load it into the fixture.")
        })?;
        let start = match request.token {
            Some(token) => decode_offset(token)?,
            None => 0,
        };
        if start > rows.len() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("continuation token points past the end of the table"));
        }
        let size = match request.limit {
            Some(limit) => (limit as usize).clamp(1, self.page_size),
            None => self.page_size,
        };
        let end = start.saturating_add(size).min(rows.len());
        let page_rows = rows[start..end].to_vec();
        if end < rows.len() {
            Ok(Page::with_next(page_rows, encode_offset(end)))
        } else {
            Ok(Page::last(page_rows))
        }
    }
}

fn rows_from_items(items: Vec<Value>) -> Result<Vec<Row>, Error> {
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Value::Object(attributes) => Ok(Row::from_attributes(attributes)),
            _ => Err(fixture_shape_error(&format!("row {idx} is not an object"))),
        })
        .collect()
}

fn fixture_shape_error(detail: &str) -> Error {
    Error::new(ErrorKind::Corrupt)
        .with_message(format!("invalid fixture: {detail}"))
        .with_hint("Use a JSON array of rows, an `aws dynamodb scan` dump, or {\"table\": [rows]}.")
}

fn encode_offset(offset: usize) -> PageToken {
    let mut key = Map::new();
    key.insert(OFFSET_KEY.to_string(), json!({ "N": offset.to_string() }));
    PageToken::from_key(key)
}

fn decode_offset(token: &PageToken) -> Result<usize, Error> {
    token
        .key()
        .get(OFFSET_KEY)
        .and_then(|value| value.get("N"))
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<usize>().ok())
        .ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message("malformed continuation token")
        })
}
