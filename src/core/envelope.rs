//! Purpose: Turn a scan report into the HTTP-shaped response envelope.
//! Exports: `ResponseEnvelope`, `FailurePolicy`, `render`.
//! Role: The single place that decides how fetch failures reach the caller.
//! Invariants: Envelope keys are `statusCode`, `headers`, `body`; body is a JSON string.
//! Invariants: Rows are encoded exactly as stored; no field is added or dropped.
//! Invariants: `Degrade` always answers 200 with whatever rows were gathered.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::core::row::Row;
use crate::core::scan::ScanReport;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const APPLICATION_JSON: &str = "application/json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FailurePolicy {
    /// Answer 200 with the partial (possibly empty) row set.
    #[default]
    Degrade,
    /// Answer 5xx with an error body.
    Surface,
}

impl FailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            FailurePolicy::Degrade => "degrade",
            FailurePolicy::Surface => "surface",
        }
    }

    pub fn parse(value: &str) -> Result<Self, Error> {
        match value {
            "degrade" => Ok(FailurePolicy::Degrade),
            "surface" => Ok(FailurePolicy::Surface),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown fetch error policy: {value}"))
                .with_hint("Use degrade or surface.")),
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: String,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    table: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<usize>,
}

impl ResponseEnvelope {
    pub fn json(status_code: u16, body: String) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(CONTENT_TYPE.to_string(), APPLICATION_JSON.to_string());
        Self {
            status_code,
            headers,
            body,
        }
    }

    pub fn rows(rows: &[Row]) -> Result<Self, Error> {
        let body = serde_json::to_string(rows).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode rows")
                .with_source(err)
        })?;
        Ok(Self::json(200, body))
    }

    pub fn error(err: &Error) -> Self {
        let body = ErrorEnvelope {
            error: ErrorBody {
                kind: format!("{:?}", err.kind()),
                message: err.message().unwrap_or("error"),
                hint: err.hint(),
                table: err.table(),
                page: err.page(),
            },
        };
        let body = serde_json::to_string(&body).unwrap_or_else(|_| {
            "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
        });
        Self::json(status_for(err.kind()), body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).map(String::as_str)
    }
}

/// Status used when a failure is surfaced rather than absorbed.
pub fn status_for(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::Throttled => 503,
        ErrorKind::Internal => 500,
        _ => 502,
    }
}

pub fn render(report: &ScanReport, policy: FailurePolicy) -> ResponseEnvelope {
    if let (Some(err), FailurePolicy::Surface) = (report.failure(), policy) {
        return ResponseEnvelope::error(err);
    }
    ResponseEnvelope::rows(&report.rows).unwrap_or_else(|err| ResponseEnvelope::error(&err))
}
