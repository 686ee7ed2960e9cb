// Page source seam: the backing-store collaborator the scanner pulls pages from.
use std::future::Future;

use crate::core::error::Error;
use crate::core::row::{Page, PageToken};

#[derive(Clone, Copy, Debug)]
pub struct PageRequest<'a> {
    pub table: &'a str,
    pub token: Option<&'a PageToken>,
    /// Upper bound on rows per fetch; `None` leaves sizing to the store.
    pub limit: Option<u32>,
}

impl<'a> PageRequest<'a> {
    pub fn first(table: &'a str) -> Self {
        Self {
            table,
            token: None,
            limit: None,
        }
    }

    pub fn after(table: &'a str, token: &'a PageToken) -> Self {
        Self {
            table,
            token: Some(token),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }
}

/// One bounded fetch against a table. Implementations own connections,
/// credentials, and transport timeouts; callers never retry through here.
pub trait PageSource: Send + Sync {
    fn fetch_page(
        &self,
        request: PageRequest<'_>,
    ) -> impl Future<Output = Result<Page, Error>> + Send;
}

impl<S: PageSource> PageSource for std::sync::Arc<S> {
    fn fetch_page(
        &self,
        request: PageRequest<'_>,
    ) -> impl Future<Output = Result<Page, Error>> + Send {
        self.as_ref().fetch_page(request)
    }
}
