//! Purpose: Define the opaque row, continuation token, and page types.
//! Exports: `Row`, `PageToken`, `Page`.
//! Role: Shared vocabulary between page sources, the scanner, and the envelope.
//! Invariants: Rows are carried in the store's typed wire form and never interpreted.
//! Invariants: A page without a token is the last page of the table.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One item as the store returned it: attribute name to typed value
/// (`{"S": ".."}`, `{"N": ".."}`, `{"M": {..}}`, ...).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_attributes(attributes: Map<String, Value>) -> Self {
        Self(attributes)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.0.insert(name.into(), value);
        self
    }
}

impl From<Map<String, Value>> for Row {
    fn from(attributes: Map<String, Value>) -> Self {
        Self(attributes)
    }
}

/// Continuation marker handed back by the store; opaque to the scanner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageToken(Map<String, Value>);

impl PageToken {
    pub fn from_key(key: Map<String, Value>) -> Self {
        Self(key)
    }

    pub fn key(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Result of one bounded fetch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    pub rows: Vec<Row>,
    pub next_token: Option<PageToken>,
}

impl Page {
    pub fn last(rows: Vec<Row>) -> Self {
        Self {
            rows,
            next_token: None,
        }
    }

    pub fn with_next(rows: Vec<Row>, next_token: PageToken) -> Self {
        Self {
            rows,
            next_token: Some(next_token),
        }
    }

    pub fn has_more(&self) -> bool {
        self.next_token.is_some()
    }
}
