//! Purpose: Hold top-level CLI command dispatch for `recordscan`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Each command builds its handler once and reuses it for every invocation.

use super::*;
use crate::backend::Backend;
use recordscan::api::{Invocation, InvocationContext, RecordsHandler};

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            clap_complete::aot::generate(shell, &mut cmd, "recordscan", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Invoke {
            handler,
            event,
            body_only,
        } => {
            let event = match event.as_deref() {
                Some(raw) => serde_json::from_str::<Value>(raw).map_err(|err| {
                    Error::new(ErrorKind::Usage)
                        .with_message("--event must be valid json")
                        .with_source(err)
                })?,
                None => Value::Null,
            };
            let config = handler.handler_config()?;
            serve::init_tracing();
            let runtime = build_runtime()?;
            let envelope = runtime.block_on(async {
                let source = Backend::open(&handler.backend_args(), &config.table).await?;
                let records = RecordsHandler::new(source, config);
                let invocation = Invocation::new(event, InvocationContext::local("cli"));
                Ok::<_, Error>(records.handle(&invocation).await)
            })?;
            let pretty = io::stdout().is_terminal();
            if body_only {
                let body = serde_json::from_str::<Value>(&envelope.body).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("envelope body is not json")
                        .with_source(err)
                })?;
                emit_json(&body, pretty);
            } else {
                let value = serde_json::to_value(&envelope).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode envelope")
                        .with_source(err)
                })?;
                emit_json(&value, pretty);
            }
            Ok(RunOutcome::ok())
        }
        Command::Serve {
            handler,
            bind,
            allow_non_loopback,
        } => {
            let config = handler.handler_config()?;
            serve::init_tracing();
            let runtime = build_runtime()?;
            runtime.block_on(async {
                let source = Backend::open(&handler.backend_args(), &config.table).await?;
                let serve_config = serve::ServeConfig {
                    bind,
                    allow_non_loopback,
                };
                serve::serve(serve_config, RecordsHandler::new(source, config)).await?;
                Ok::<_, Error>(())
            })?;
            Ok(RunOutcome::ok())
        }
        Command::Runtime {
            handler,
            runtime_api,
            max_invocations,
        } => {
            serve::init_tracing();
            let endpoint = runtime_api
                .or_else(|| std::env::var(runtime::ENV_RUNTIME_API).ok())
                .ok_or_else(|| {
                    Error::new(ErrorKind::Usage)
                        .with_message("runtime api endpoint is not set")
                        .with_hint(format!(
                            "Set {} or pass --runtime-api host:port.",
                            runtime::ENV_RUNTIME_API
                        ))
                })?;
            let api = runtime::RuntimeApi::new(&endpoint)?;
            let tokio_runtime = build_runtime()?;
            let setup = handler.handler_config().and_then(|config| {
                tokio_runtime.block_on(async {
                    let source = Backend::open(&handler.backend_args(), &config.table).await?;
                    Ok::<_, Error>(RecordsHandler::new(source, config))
                })
            });
            let records = match setup {
                Ok(records) => records,
                Err(err) => {
                    if let Err(post_err) = api.post_init_error(&err) {
                        tracing::error!(error = %post_err, "failed to report init error");
                    }
                    return Err(err);
                }
            };
            runtime::run_loop(&api, &records, &tokio_runtime, max_invocations)?;
            Ok(RunOutcome::ok())
        }
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime, Error> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to start runtime")
                .with_source(err)
        })
}
