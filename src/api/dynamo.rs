//! Purpose: DynamoDB-backed page source built on `aws-sdk-dynamodb` `Scan`.
//! Exports: `DynamoTable`, `ClientSettings`, `shared_client`.
//! Role: Maps one bounded fetch onto `Scan` with `ExclusiveStartKey`/`LastEvaluatedKey`.
//! Invariants: One SDK client per process; callers receive it explicitly.
//! Invariants: SDK failures are classified into `ErrorKind`; nothing is retried here.
#![allow(clippy::result_large_err)]

use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::scan::ScanError;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::attribute::{item_to_row, key_to_token, token_to_key};
use crate::core::error::{Error, ErrorKind};
use crate::core::row::Page;
use crate::core::source::{PageRequest, PageSource};

static SHARED_CLIENT: OnceCell<Client> = OnceCell::const_new();

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClientSettings {
    /// Overrides the resolved endpoint, e.g. a local DynamoDB at `http://127.0.0.1:8000`.
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
}

/// Returns the process-wide client, building it from the ambient AWS
/// configuration on first use. Later calls ignore `settings`.
pub async fn shared_client(settings: &ClientSettings) -> Client {
    SHARED_CLIENT
        .get_or_init(|| build_client(settings))
        .await
        .clone()
}

async fn build_client(settings: &ClientSettings) -> Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(endpoint_url) = &settings.endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }
    if let Some(region) = &settings.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }
    let config = loader.load().await;
    info!(
        region = config.region().map(|region| region.as_ref()).unwrap_or("unset"),
        endpoint = settings.endpoint_url.as_deref().unwrap_or("default"),
        "dynamodb client ready"
    );
    Client::new(&config)
}

#[derive(Clone, Debug)]
pub struct DynamoTable {
    client: Client,
}

impl DynamoTable {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl PageSource for DynamoTable {
    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page, Error> {
        let start_key = request.token.map(token_to_key).transpose()?;
        let limit = request
            .limit
            .map(|limit| i32::try_from(limit).unwrap_or(i32::MAX));

        let output = self
            .client
            .scan()
            .table_name(request.table)
            .set_exclusive_start_key(start_key)
            .set_limit(limit)
            .send()
            .await
            .map_err(map_scan_error)?;

        let rows = output
            .items()
            .iter()
            .map(item_to_row)
            .collect::<Result<Vec<_>, _>>()?;
        let next_token = output.last_evaluated_key().map(key_to_token).transpose()?;
        debug!(
            table = request.table,
            scanned = output.scanned_count(),
            returned = rows.len(),
            "scan page"
        );
        Ok(Page { rows, next_token })
    }
}

fn map_scan_error<R>(err: SdkError<ScanError, R>) -> Error
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    let (kind, hint) = match &err {
        SdkError::ServiceError(context) => classify_service_error(context.err()),
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => (
            ErrorKind::Io,
            Some("The store could not be reached; check network access and the endpoint."),
        ),
        SdkError::ConstructionFailure(_) => (
            ErrorKind::Usage,
            Some("Check AWS region and credential configuration."),
        ),
        _ => (ErrorKind::Internal, None),
    };
    let mut out = Error::new(kind).with_message(message).with_source(err);
    if let Some(hint) = hint {
        out = out.with_hint(hint);
    }
    out
}

fn classify_service_error(err: &ScanError) -> (ErrorKind, Option<&'static str>) {
    match err {
        ScanError::ResourceNotFoundException(_) => (
            ErrorKind::NotFound,
            Some("Check the table name and the configured region."),
        ),
        ScanError::ProvisionedThroughputExceededException(_) | ScanError::RequestLimitExceeded(_) => {
            (ErrorKind::Throttled, Some("Retry the invocation later."))
        }
        ScanError::InternalServerError(_) => (ErrorKind::Internal, None),
        other => classify_error_code(other.code()),
    }
}

fn classify_error_code(code: Option<&str>) -> (ErrorKind, Option<&'static str>) {
    match code {
        Some("AccessDeniedException")
        | Some("UnrecognizedClientException")
        | Some("InvalidSignatureException")
        | Some("ExpiredTokenException") => (
            ErrorKind::Permission,
            Some("Grant dynamodb:Scan on the table to the executing role."),
        ),
        Some("ThrottlingException") => (ErrorKind::Throttled, Some("Retry the invocation later.")),
        Some("ValidationException") => (ErrorKind::Usage, None),
        _ => (ErrorKind::Internal, None),
    }
}
