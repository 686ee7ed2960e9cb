//! Purpose: Read every row of one table by chaining bounded fetches.
//! Exports: `TableScanner`, `ScanOptions`, `Accumulation`, `ScanReport`.
//! Role: The only place that walks continuation tokens; transport-agnostic.
//! Invariants: Fetches are strictly sequential; each uses the previous page's token.
//! Invariants: A failed fetch ends the scan and is recorded in the report, never raised.
//! Invariants: No retries and no backoff; sources own transport timeouts.
use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::row::{Page, PageToken, Row};
use crate::core::source::{PageRequest, PageSource};

pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// How rows from successive pages combine into the result set.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Accumulation {
    /// Union of every page in fetch order.
    #[default]
    AllPages,
    /// Legacy reset: when the table spans several pages only the most recent
    /// continuation page is kept, and the first page is dropped.
    LastPage,
}

impl Accumulation {
    pub fn as_str(self) -> &'static str {
        match self {
            Accumulation::AllPages => "all-pages",
            Accumulation::LastPage => "last-page",
        }
    }

    pub fn parse(value: &str) -> Result<Self, Error> {
        match value {
            "all-pages" => Ok(Accumulation::AllPages),
            "last-page" => Ok(Accumulation::LastPage),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown accumulation policy: {value}"))
                .with_hint("Use all-pages or last-page.")),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScanOptions {
    pub page_limit: Option<u32>,
    pub max_pages: Option<usize>,
    pub accumulation: Accumulation,
}

impl ScanOptions {
    pub fn new() -> Self {
        Self {
            page_limit: None,
            max_pages: Some(DEFAULT_MAX_PAGES),
            accumulation: Accumulation::AllPages,
        }
    }

    pub fn with_page_limit(mut self, page_limit: Option<u32>) -> Self {
        self.page_limit = page_limit;
        self
    }

    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_accumulation(mut self, accumulation: Accumulation) -> Self {
        self.accumulation = accumulation;
        self
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one scan: the rows gathered plus the fetch failure, if any.
#[derive(Debug)]
pub struct ScanReport {
    pub table: String,
    pub rows: Vec<Row>,
    /// Number of fetches that succeeded.
    pub pages: usize,
    pub failure: Option<Error>,
}

impl ScanReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    /// Collapses the report into the tagged result callers can `?` on.
    pub fn into_result(self) -> Result<Vec<Row>, Error> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.rows),
        }
    }
}

pub struct TableScanner<'a, S> {
    source: &'a S,
    options: ScanOptions,
}

impl<'a, S: PageSource> TableScanner<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            options: ScanOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> ScanOptions {
        self.options
    }

    pub async fn scan_all(&self, table: &str) -> ScanReport {
        let mut rows: Vec<Row> = Vec::new();
        let mut token: Option<PageToken> = None;
        let mut pages = 0usize;
        let mut failure = None;

        loop {
            if let Some(max_pages) = self.options.max_pages {
                if pages >= max_pages {
                    let err = Error::new(ErrorKind::Usage)
                        .with_message(format!(
                            "scan stopped after {max_pages} pages with more pending"
                        ))
                        .with_hint("Raise the max pages limit if the table is this large.")
                        .with_table(table)
                        .with_page(pages);
                    warn!(table, pages, error = %err, "scan page cap reached");
                    failure = Some(err);
                    break;
                }
            }

            let request = match token.as_ref() {
                Some(token) => PageRequest::after(table, token),
                None => PageRequest::first(table),
            }
            .with_limit(self.options.page_limit);

            match self.source.fetch_page(request).await {
                Ok(Page {
                    rows: page_rows,
                    next_token,
                }) => {
                    debug!(
                        table,
                        page = pages,
                        rows = page_rows.len(),
                        more = next_token.is_some(),
                        "fetched page"
                    );
                    self.accumulate(&mut rows, page_rows, pages, next_token.is_some());
                    pages += 1;
                    match next_token {
                        Some(next) => token = Some(next),
                        None => break,
                    }
                }
                Err(err) => {
                    let err = err.with_table(table).with_page(pages);
                    match err.hint() {
                        Some(hint) => warn!(table, page = pages, error = %err, hint, "page fetch failed"),
                        None => warn!(table, page = pages, error = %err, "page fetch failed"),
                    }
                    failure = Some(err);
                    break;
                }
            }
        }

        ScanReport {
            table: table.to_string(),
            rows,
            pages,
            failure,
        }
    }

    fn accumulate(&self, rows: &mut Vec<Row>, page_rows: Vec<Row>, index: usize, more: bool) {
        match self.options.accumulation {
            Accumulation::AllPages => rows.extend(page_rows),
            Accumulation::LastPage => {
                if index == 0 && more {
                    rows.clear();
                } else {
                    *rows = page_rows;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Accumulation, ScanOptions, TableScanner};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::row::{Page, PageToken, Row};
    use crate::core::source::{PageRequest, PageSource};
    use serde_json::{Map, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedSource {
        replies: Mutex<VecDeque<Result<Page, Error>>>,
        requests: Mutex<Vec<(Option<PageToken>, Option<u32>)>>,
    }

    impl ScriptedSource {
        fn new(replies: Vec<Result<Page, Error>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<(Option<PageToken>, Option<u32>)> {
            self.requests.lock().expect("lock").clone()
        }
    }

    impl PageSource for ScriptedSource {
        async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page, Error> {
            self.requests
                .lock()
                .expect("lock")
                .push((request.token.cloned(), request.limit));
            self.replies
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| Err(Error::new(ErrorKind::Internal).with_message("script exhausted")))
        }
    }

    fn row(id: &str) -> Row {
        Row::new().with_attribute("id", json!({ "S": id }))
    }

    fn token(id: &str) -> PageToken {
        let mut key = Map::new();
        key.insert("id".to_string(), json!({ "S": id }));
        PageToken::from_key(key)
    }

    fn ids(rows: &[Row]) -> Vec<String> {
        rows.iter()
            .map(|row| row.attributes()["id"]["S"].as_str().expect("id").to_string())
            .collect()
    }

    fn three_pages() -> Vec<Result<Page, Error>> {
        vec![
            Ok(Page::with_next(vec![row("a"), row("b")], token("b"))),
            Ok(Page::with_next(vec![row("c")], token("c"))),
            Ok(Page::last(vec![row("d")])),
        ]
    }

    #[tokio::test]
    async fn empty_table_yields_no_rows() {
        let source = ScriptedSource::new(vec![Ok(Page::last(Vec::new()))]);
        let report = TableScanner::new(&source).scan_all("jobs").await;
        assert!(report.is_complete());
        assert!(report.rows.is_empty());
        assert_eq!(report.pages, 1);
    }

    #[tokio::test]
    async fn single_page_keeps_arrival_order() {
        let source = ScriptedSource::new(vec![Ok(Page::last(vec![row("z"), row("a"), row("m")]))]);
        let report = TableScanner::new(&source).scan_all("jobs").await;
        assert_eq!(ids(&report.rows), ["z", "a", "m"]);
    }

    #[tokio::test]
    async fn all_pages_accumulates_in_fetch_order() {
        let source = ScriptedSource::new(three_pages());
        let report = TableScanner::new(&source).scan_all("jobs").await;
        assert!(report.is_complete());
        assert_eq!(report.pages, 3);
        assert_eq!(ids(&report.rows), ["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn continuation_tokens_are_chained() {
        let source = ScriptedSource::new(three_pages());
        let options = ScanOptions::new().with_page_limit(Some(2));
        let _ = TableScanner::new(&source)
            .with_options(options)
            .scan_all("jobs")
            .await;
        let requests = source.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0], (None, Some(2)));
        assert_eq!(requests[1], (Some(token("b")), Some(2)));
        assert_eq!(requests[2], (Some(token("c")), Some(2)));
    }

    #[tokio::test]
    async fn last_page_policy_keeps_only_final_page() {
        let source = ScriptedSource::new(three_pages());
        let options = ScanOptions::new().with_accumulation(Accumulation::LastPage);
        let report = TableScanner::new(&source)
            .with_options(options)
            .scan_all("jobs")
            .await;
        assert_eq!(ids(&report.rows), ["d"]);
    }

    #[tokio::test]
    async fn last_page_policy_keeps_single_page_table() {
        let source = ScriptedSource::new(vec![Ok(Page::last(vec![row("a"), row("b")]))]);
        let options = ScanOptions::new().with_accumulation(Accumulation::LastPage);
        let report = TableScanner::new(&source)
            .with_options(options)
            .scan_all("jobs")
            .await;
        assert_eq!(ids(&report.rows), ["a", "b"]);
    }

    #[tokio::test]
    async fn first_fetch_failure_is_recorded_not_raised() {
        let source = ScriptedSource::new(vec![Err(Error::new(ErrorKind::Permission)
            .with_message("access denied"))]);
        let report = TableScanner::new(&source).scan_all("jobs").await;
        assert!(report.rows.is_empty());
        assert_eq!(report.pages, 0);
        let failure = report.failure().expect("failure");
        assert_eq!(failure.kind(), ErrorKind::Permission);
        assert_eq!(failure.table(), Some("jobs"));
        assert_eq!(failure.page(), Some(0));
    }

    #[tokio::test]
    async fn mid_scan_failure_stops_and_keeps_earlier_pages() {
        let source = ScriptedSource::new(vec![
            Ok(Page::with_next(vec![row("a")], token("a"))),
            Ok(Page::with_next(vec![row("b")], token("b"))),
            Err(Error::new(ErrorKind::Throttled).with_message("slow down")),
            Ok(Page::last(vec![row("never")])),
        ]);
        let report = TableScanner::new(&source).scan_all("jobs").await;
        assert_eq!(ids(&report.rows), ["a", "b"]);
        assert_eq!(report.pages, 2);
        assert_eq!(source.requests().len(), 3);
        assert_eq!(report.failure().expect("failure").page(), Some(2));
    }

    #[tokio::test]
    async fn mid_scan_failure_under_last_page_keeps_latest_continuation_page() {
        let source = ScriptedSource::new(vec![
            Ok(Page::with_next(vec![row("a")], token("a"))),
            Ok(Page::with_next(vec![row("b")], token("b"))),
            Err(Error::new(ErrorKind::Io).with_message("reset")),
        ]);
        let options = ScanOptions::new().with_accumulation(Accumulation::LastPage);
        let report = TableScanner::new(&source)
            .with_options(options)
            .scan_all("jobs")
            .await;
        assert_eq!(ids(&report.rows), ["b"]);
    }

    #[tokio::test]
    async fn last_page_policy_drops_first_page_when_second_fetch_fails() {
        let source = ScriptedSource::new(vec![
            Ok(Page::with_next(vec![row("a")], token("a"))),
            Err(Error::new(ErrorKind::Io).with_message("reset")),
        ]);
        let options = ScanOptions::new().with_accumulation(Accumulation::LastPage);
        let report = TableScanner::new(&source)
            .with_options(options)
            .scan_all("jobs")
            .await;
        assert!(report.rows.is_empty());
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn page_cap_stops_endless_token_chain() {
        let replies = (0..5)
            .map(|idx| Ok(Page::with_next(vec![row(&idx.to_string())], token("loop"))))
            .collect();
        let source = ScriptedSource::new(replies);
        let options = ScanOptions::new().with_max_pages(Some(3));
        let report = TableScanner::new(&source)
            .with_options(options)
            .scan_all("jobs")
            .await;
        assert_eq!(report.pages, 3);
        assert_eq!(report.rows.len(), 3);
        assert_eq!(source.requests().len(), 3);
        assert_eq!(report.failure().expect("failure").kind(), ErrorKind::Usage);
    }

    #[tokio::test]
    async fn into_result_surfaces_failure() {
        let source = ScriptedSource::new(vec![Err(Error::new(ErrorKind::NotFound))]);
        let err = TableScanner::new(&source)
            .scan_all("missing")
            .await
            .into_result()
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn accumulation_parse_round_trips_names() {
        for policy in [Accumulation::AllPages, Accumulation::LastPage] {
            assert_eq!(Accumulation::parse(policy.as_str()).expect("parse"), policy);
        }
        let err = Accumulation::parse("every").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
