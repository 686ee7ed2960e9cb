//! Purpose: Client for the Lambda Runtime API plus the invocation loop that drives it.
//! Exports: `RuntimeApi`, `run_loop`, `ENV_RUNTIME_API`.
//! Role: Inbound transport adapter; turns polled invocations into handler calls.
//! Invariants: One invocation at a time; the next poll starts only after the response is posted.
//! Invariants: Event bodies are passed through unparsed-on-failure and never inspected.
//! Invariants: Handler setup failures are reported once to the init error endpoint.
#![allow(clippy::result_large_err)]

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};
use url::Url;

use crate::backend::Backend;
use recordscan::api::{
    Error, ErrorKind, Invocation, InvocationContext, RecordsHandler, ResponseEnvelope,
};

pub const ENV_RUNTIME_API: &str = "AWS_LAMBDA_RUNTIME_API";
const API_VERSION: &str = "2018-06-01";

const HEADER_REQUEST_ID: &str = "Lambda-Runtime-Aws-Request-Id";
const HEADER_DEADLINE_MS: &str = "Lambda-Runtime-Deadline-Ms";
const HEADER_FUNCTION_ARN: &str = "Lambda-Runtime-Invoked-Function-Arn";
const HEADER_TRACE_ID: &str = "Lambda-Runtime-Trace-Id";
const HEADER_ERROR_TYPE: &str = "Lambda-Runtime-Function-Error-Type";

#[derive(Clone)]
pub struct RuntimeApi {
    base_url: Url,
    agent: ureq::Agent,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorRequest<'a> {
    error_message: &'a str,
    error_type: String,
    stack_trace: Vec<String>,
}

impl RuntimeApi {
    /// `endpoint` is the `host:port` the platform publishes in
    /// `AWS_LAMBDA_RUNTIME_API`; an explicit `http://` prefix is accepted too.
    pub fn new(endpoint: &str) -> Result<Self, Error> {
        let raw = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("http://{endpoint}")
        };
        let mut base_url = Url::parse(&raw).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid runtime api endpoint")
                .with_hint(format!("Use host:port, as published in {ENV_RUNTIME_API}."))
                .with_source(err)
        })?;
        if base_url.scheme() != "http" {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("runtime api endpoint must use http"));
        }
        base_url.set_path("/");
        base_url.set_query(None);
        base_url.set_fragment(None);
        let agent = ureq::AgentBuilder::new().build();
        Ok(Self { base_url, agent })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Blocks until the platform hands over the next invocation.
    pub fn next_invocation(&self) -> Result<Invocation, Error> {
        let url = self.url(&["runtime", "invocation", "next"])?;
        let response = match self.agent.get(url.as_str()).call() {
            Ok(response) => response,
            Err(err) => return Err(map_ureq_error(err, "failed to poll next invocation")),
        };
        let Some(request_id) = response.header(HEADER_REQUEST_ID).map(str::to_string) else {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("next invocation is missing the request id header"));
        };
        let context = InvocationContext {
            request_id,
            invoked_function_arn: response.header(HEADER_FUNCTION_ARN).map(str::to_string),
            trace_id: response.header(HEADER_TRACE_ID).map(str::to_string),
            deadline_ms: response
                .header(HEADER_DEADLINE_MS)
                .and_then(|value| value.parse::<u64>().ok()),
        };
        let body = response.into_string().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read invocation event")
                .with_source(err)
        })?;
        let event = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));
        Ok(Invocation::new(event, context))
    }

    pub fn post_response(&self, request_id: &str, envelope: &ResponseEnvelope) -> Result<(), Error> {
        let url = self.url(&["runtime", "invocation", request_id, "response"])?;
        let payload = serde_json::to_string(envelope).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode response envelope")
                .with_source(err)
        })?;
        self.agent
            .post(url.as_str())
            .set("Content-Type", "application/json")
            .send_string(&payload)
            .map_err(|err| map_ureq_error(err, "failed to post invocation response"))?;
        Ok(())
    }

    pub fn post_invocation_error(&self, request_id: &str, err: &Error) -> Result<(), Error> {
        let url = self.url(&["runtime", "invocation", request_id, "error"])?;
        self.post_error(&url, err)
    }

    pub fn post_init_error(&self, err: &Error) -> Result<(), Error> {
        let url = self.url(&["runtime", "init", "error"])?;
        self.post_error(&url, err)
    }

    fn post_error(&self, url: &Url, err: &Error) -> Result<(), Error> {
        let error_type = format!("Recordscan.{:?}", err.kind());
        let body = ErrorRequest {
            error_message: err.message().unwrap_or("error"),
            error_type: error_type.clone(),
            stack_trace: Vec::new(),
        };
        let payload = serde_json::to_string(&body).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode runtime error")
                .with_source(err)
        })?;
        self.agent
            .post(url.as_str())
            .set("Content-Type", "application/json")
            .set(HEADER_ERROR_TYPE, &error_type)
            .send_string(&payload)
            .map_err(|err| map_ureq_error(err, "failed to post runtime error"))?;
        Ok(())
    }

    fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                Error::new(ErrorKind::Usage).with_message("runtime api url cannot be a base")
            })?;
            path.clear();
            path.push(API_VERSION);
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }
}

/// Serves invocations until the runtime api fails or `max_invocations` is reached.
pub fn run_loop(
    api: &RuntimeApi,
    handler: &RecordsHandler<Backend>,
    runtime: &tokio::runtime::Runtime,
    max_invocations: Option<usize>,
) -> Result<usize, Error> {
    info!(
        runtime_api = %api.base_url(),
        table = %handler.config().table,
        backend = handler.source().label(),
        "runtime loop started"
    );
    let mut served = 0usize;
    while max_invocations.is_none_or(|max| served < max) {
        let invocation = api.next_invocation()?;
        let request_id = invocation.context.request_id.clone();
        debug!(request_id = %request_id, "invocation received");
        let envelope = runtime.block_on(handler.handle(&invocation));
        if let Err(err) = api.post_response(&request_id, &envelope) {
            error!(request_id = %request_id, error = %err, "failed to deliver response");
            api.post_invocation_error(&request_id, &err)?;
        }
        served += 1;
    }
    Ok(served)
}

fn map_ureq_error(err: ureq::Error, message: &str) -> Error {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            let kind = match code {
                400 | 413 => ErrorKind::Usage,
                403 => ErrorKind::Permission,
                404 => ErrorKind::NotFound,
                429 => ErrorKind::Throttled,
                _ => ErrorKind::Internal,
            };
            let mut out = Error::new(kind).with_message(format!("{message}: status {code}"));
            if !body.trim().is_empty() {
                out = out.with_hint(body.trim().to_string());
            }
            out
        }
        ureq::Error::Transport(transport) => Error::new(ErrorKind::Io)
            .with_message(message.to_string())
            .with_source(transport),
    }
}
