//! Purpose: Handler configuration with defaults, environment overrides, and validation.
//! Exports: `HandlerConfig`, `validate_config`, the `ENV_*` names.
//! Role: Single source of truth for the table name and scan/failure policies.
//! Invariants: Defaults reproduce the historical handler (fixed table, 200 on failure).
//! Invariants: Invalid values are `Usage` errors with a remediation hint.
#![allow(clippy::result_large_err)]

use crate::core::envelope::FailurePolicy;
use crate::core::error::{Error, ErrorKind};
use crate::core::scan::{Accumulation, DEFAULT_MAX_PAGES, ScanOptions};

pub const DEFAULT_TABLE: &str = "mediaconvert-records";

pub const ENV_TABLE: &str = "RECORDSCAN_TABLE";
pub const ENV_PAGE_LIMIT: &str = "RECORDSCAN_PAGE_LIMIT";
pub const ENV_MAX_PAGES: &str = "RECORDSCAN_MAX_PAGES";
pub const ENV_ACCUMULATION: &str = "RECORDSCAN_ACCUMULATION";
pub const ENV_ON_FETCH_ERROR: &str = "RECORDSCAN_ON_FETCH_ERROR";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HandlerConfig {
    pub table: String,
    pub page_limit: Option<u32>,
    pub max_pages: Option<usize>,
    pub accumulation: Accumulation,
    pub on_fetch_error: FailurePolicy,
}

impl HandlerConfig {
    pub fn new() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            page_limit: None,
            max_pages: Some(DEFAULT_MAX_PAGES),
            accumulation: Accumulation::AllPages,
            on_fetch_error: FailurePolicy::Degrade,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_accumulation(mut self, accumulation: Accumulation) -> Self {
        self.accumulation = accumulation;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_fetch_error = policy;
        self
    }

    pub fn with_page_limit(mut self, page_limit: Option<u32>) -> Self {
        self.page_limit = page_limit;
        self
    }

    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Defaults overlaid with any `RECORDSCAN_*` variables present.
    pub fn from_env() -> Result<Self, Error> {
        let config = Self::from_lookup(|name| std::env::var(name).ok())?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parses whatever `lookup` yields over the defaults. Values are not
    /// validated here so that later overrides can still replace them.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();
        if let Some(table) = lookup(ENV_TABLE) {
            config.table = table;
        }
        if let Some(raw) = lookup(ENV_PAGE_LIMIT) {
            config.page_limit = Some(parse_number(ENV_PAGE_LIMIT, &raw)?);
        }
        if let Some(raw) = lookup(ENV_MAX_PAGES) {
            config.max_pages = Some(parse_number(ENV_MAX_PAGES, &raw)?);
        }
        if let Some(raw) = lookup(ENV_ACCUMULATION) {
            config.accumulation = Accumulation::parse(raw.trim())?;
        }
        if let Some(raw) = lookup(ENV_ON_FETCH_ERROR) {
            config.on_fetch_error = FailurePolicy::parse(raw.trim())?;
        }
        Ok(config)
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions::new()
            .with_page_limit(self.page_limit)
            .with_max_pages(self.max_pages)
            .with_accumulation(self.accumulation)
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_config(config: &HandlerConfig) -> Result<(), Error> {
    if config.table.trim().is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("table name must not be empty")
            .with_hint(format!("Set {ENV_TABLE} or pass --table.")));
    }
    if config.table.len() > 255 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("table name exceeds 255 characters")
            .with_table(config.table.clone()));
    }
    if config.page_limit == Some(0) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("page limit must be greater than zero")
            .with_hint("Omit the limit to let the store size pages, or use a value like 100."));
    }
    if config.max_pages == Some(0) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("max pages must be greater than zero")
            .with_hint(format!("Use a positive value like {DEFAULT_MAX_PAGES}.")));
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, Error> {
    raw.trim().parse::<T>().map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("{name} must be a positive integer, got {raw:?}"))
    })
}
