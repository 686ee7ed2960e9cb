//! Purpose: One invocation = scan the configured table, then render the envelope.
//! Exports: `RecordsHandler`, `Invocation`, `InvocationContext`.
//! Role: Transport-neutral entry point shared by the runtime loop, HTTP adapter, and CLI.
//! Invariants: Event and context payloads never influence what is scanned.
//! Invariants: Every invocation starts from an empty result set; nothing is cached.
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use super::config::HandlerConfig;
use crate::core::envelope::{ResponseEnvelope, render};
use crate::core::scan::{ScanReport, TableScanner};
use crate::core::source::PageSource;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InvocationContext {
    pub request_id: String,
    pub invoked_function_arn: Option<String>,
    pub trace_id: Option<String>,
    /// Wall-clock deadline in milliseconds since the Unix epoch.
    pub deadline_ms: Option<u64>,
}

impl InvocationContext {
    pub fn local(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Self::default()
        }
    }

    pub fn deadline(&self) -> Option<OffsetDateTime> {
        let millis = i128::from(self.deadline_ms?);
        OffsetDateTime::from_unix_timestamp_nanos(millis * 1_000_000).ok()
    }

    pub fn deadline_rfc3339(&self) -> Option<String> {
        self.deadline()?.format(&Rfc3339).ok()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Invocation {
    pub event: Value,
    pub context: InvocationContext,
}

impl Invocation {
    pub fn new(event: Value, context: InvocationContext) -> Self {
        Self { event, context }
    }
}

pub struct RecordsHandler<S> {
    source: S,
    config: HandlerConfig,
}

impl<S: PageSource> RecordsHandler<S> {
    pub fn new(source: S, config: HandlerConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn scan(&self) -> ScanReport {
        TableScanner::new(&self.source)
            .with_options(self.config.scan_options())
            .scan_all(&self.config.table)
            .await
    }

    pub async fn handle(&self, invocation: &Invocation) -> ResponseEnvelope {
        let context = &invocation.context;
        let report = self.scan().await;
        let envelope = render(&report, self.config.on_fetch_error);
        if report.is_complete() {
            info!(
                request_id = %context.request_id,
                table = %report.table,
                pages = report.pages,
                rows = report.rows.len(),
                status = envelope.status_code,
                "invocation complete"
            );
        } else {
            warn!(
                request_id = %context.request_id,
                table = %report.table,
                pages = report.pages,
                rows = report.rows.len(),
                status = envelope.status_code,
                policy = self.config.on_fetch_error.as_str(),
                deadline = context.deadline_rfc3339().as_deref().unwrap_or("none"),
                "invocation finished with a failed fetch"
            );
        }
        envelope
    }
}
