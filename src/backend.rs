//! Purpose: Pick the page source for a process: a fixture file or the managed table.
//! Exports: `Backend`, `BackendArgs`.
//! Role: Lets every entry point share one concrete `PageSource` type.
//! Invariants: The DynamoDB client is built once per process via `shared_client`.
#![allow(clippy::result_large_err)]

use std::path::PathBuf;

use recordscan::api::{
    ClientSettings, DynamoTable, Error, MemoryTable, Page, PageRequest, PageSource, shared_client,
};
use tracing::info;

#[derive(Clone, Debug, Default)]
pub struct BackendArgs {
    pub fixture: Option<PathBuf>,
    pub fixture_page_size: Option<usize>,
    pub client: ClientSettings,
}

pub enum Backend {
    Memory(MemoryTable),
    Dynamo(DynamoTable),
}

impl Backend {
    pub async fn open(args: &BackendArgs, table: &str) -> Result<Self, Error> {
        match &args.fixture {
            Some(path) => {
                let mut memory = MemoryTable::from_fixture_file(path, table)?;
                if let Some(page_size) = args.fixture_page_size {
                    memory = memory.with_page_size(page_size);
                }
                info!(
                    fixture = %path.display(),
                    page_size = memory.page_size(),
                    "using fixture table"
                );
                Ok(Backend::Memory(memory))
            }
            None => Ok(Backend::Dynamo(DynamoTable::new(
                shared_client(&args.client).await,
            ))),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Backend::Memory(_) => "fixture",
            Backend::Dynamo(_) => "dynamodb",
        }
    }
}

impl PageSource for Backend {
    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page, Error> {
        match self {
            Backend::Memory(table) => table.fetch_page(request).await,
            Backend::Dynamo(table) => table.fetch_page(request).await,
        }
    }
}
