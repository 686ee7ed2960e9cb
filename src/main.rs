//! Purpose: `recordscan` entry point and command dispatch.
//! Role: Binary crate root; parses args, builds the handler, runs one of the adapters.
//! Invariants: `invoke` prints exactly one envelope JSON document on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;

mod backend;
mod command_dispatch;
mod runtime;
mod serve;

use recordscan::api::{
    Accumulation, ClientSettings, ENV_ACCUMULATION, ENV_MAX_PAGES, ENV_ON_FETCH_ERROR,
    ENV_PAGE_LIMIT, ENV_TABLE, Error, ErrorKind, FailurePolicy, HandlerConfig, to_exit_code,
    validate_config,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Run `recordscan --help` for usage."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command).map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "recordscan",
    version,
    about = "Scan a DynamoDB table and answer with every row as a JSON envelope",
    long_about = None,
    after_help = r#"EXAMPLES
  $ recordscan invoke                               # scan mediaconvert-records once
  $ recordscan invoke --table jobs --page-limit 50
  $ recordscan invoke --fixture rows.json --body-only
  $ recordscan serve --bind 127.0.0.1:9800          # GET /records
  $ recordscan runtime                              # inside a Lambda custom runtime

NOTES
  - Environment: RECORDSCAN_TABLE, RECORDSCAN_PAGE_LIMIT, RECORDSCAN_MAX_PAGES,
    RECORDSCAN_ACCUMULATION, RECORDSCAN_ON_FETCH_ERROR (flags win)
  - AWS region and credentials come from the standard AWS provider chain
  - Logs go to stderr; tune with RUST_LOG"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize error output: auto|always|never"
    )]
    color: ColorMode,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AccumulationCli {
    AllPages,
    LastPage,
}

impl From<AccumulationCli> for Accumulation {
    fn from(value: AccumulationCli) -> Self {
        match value {
            AccumulationCli::AllPages => Accumulation::AllPages,
            AccumulationCli::LastPage => Accumulation::LastPage,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FailurePolicyCli {
    Degrade,
    Surface,
}

impl From<FailurePolicyCli> for FailurePolicy {
    fn from(value: FailurePolicyCli) -> Self {
        match value {
            FailurePolicyCli::Degrade => FailurePolicy::Degrade,
            FailurePolicyCli::Surface => FailurePolicy::Surface,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Run one invocation and print the response envelope",
        after_help = r#"EXAMPLES
  $ recordscan invoke
  $ recordscan invoke --event '{"httpMethod":"GET"}'
  $ recordscan invoke --fixture rows.json --fixture-page-size 2 --accumulation last-page

NOTES
  - The event payload is accepted for parity with the platform and ignored
  - --body-only prints the JSON array instead of the whole envelope"#
    )]
    Invoke {
        #[command(flatten)]
        handler: HandlerArgs,
        #[arg(long, value_name = "JSON", help = "Event payload to pass along (ignored)")]
        event: Option<String>,
        #[arg(long, help = "Print only the envelope body")]
        body_only: bool,
    },
    #[command(
        about = "Serve the handler over local HTTP",
        after_help = r#"ROUTES
  GET  /records                                     envelope mapped onto the HTTP response
  POST /2015-03-31/functions/function/invocations   envelope returned as JSON
  GET  /healthz"#
    )]
    Serve {
        #[command(flatten)]
        handler: HandlerArgs,
        #[arg(long, default_value = "127.0.0.1:9800", help = "Bind address")]
        bind: SocketAddr,
        #[arg(long, help = "Allow non-loopback binds")]
        allow_non_loopback: bool,
    },
    #[command(
        about = "Poll the Lambda Runtime API and answer invocations",
        after_help = r#"NOTES
  - Reads the endpoint from AWS_LAMBDA_RUNTIME_API unless --runtime-api is given
  - Configuration errors are reported to the init error endpoint before exiting"#
    )]
    Runtime {
        #[command(flatten)]
        handler: HandlerArgs,
        #[arg(long, value_name = "HOST:PORT", help = "Runtime API endpoint")]
        runtime_api: Option<String>,
        #[arg(long, help = "Stop after this many invocations")]
        max_invocations: Option<usize>,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Clone, Debug)]
struct HandlerArgs {
    #[arg(long, help = "Table to scan (default: mediaconvert-records)", help_heading = "Handler")]
    table: Option<String>,
    #[arg(long, help = "Max rows per fetch", help_heading = "Handler")]
    page_limit: Option<u32>,
    #[arg(long, help = "Stop after this many fetches", help_heading = "Handler")]
    max_pages: Option<usize>,
    #[arg(long, value_enum, help = "Row accumulation across pages", help_heading = "Handler")]
    accumulation: Option<AccumulationCli>,
    #[arg(long, value_enum, help = "What a failed fetch does to the response", help_heading = "Handler")]
    on_fetch_error: Option<FailurePolicyCli>,
    #[arg(long, value_name = "PATH", help = "Serve rows from a JSON fixture instead of DynamoDB", value_hint = ValueHint::FilePath, help_heading = "Store")]
    fixture: Option<PathBuf>,
    #[arg(long, requires = "fixture", help = "Rows per fixture page", help_heading = "Store")]
    fixture_page_size: Option<usize>,
    #[arg(long, value_name = "URL", help = "DynamoDB endpoint override", help_heading = "Store")]
    endpoint_url: Option<String>,
    #[arg(long, help = "AWS region override", help_heading = "Store")]
    region: Option<String>,
}

impl HandlerArgs {
    fn handler_config(&self) -> Result<HandlerConfig, Error> {
        let mut config = HandlerConfig::from_lookup(|name| {
            if self.flag_replaces(name) {
                None
            } else {
                std::env::var(name).ok()
            }
        })?;
        if let Some(table) = &self.table {
            config.table = table.clone();
        }
        if self.page_limit.is_some() {
            config.page_limit = self.page_limit;
        }
        if self.max_pages.is_some() {
            config.max_pages = self.max_pages;
        }
        if let Some(accumulation) = self.accumulation {
            config.accumulation = accumulation.into();
        }
        if let Some(policy) = self.on_fetch_error {
            config.on_fetch_error = policy.into();
        }
        validate_config(&config).map_err(|err| {
            if err.hint().is_some() {
                err
            } else {
                err.with_hint(format!("Check --table / {ENV_TABLE} and the limit flags."))
            }
        })?;
        Ok(config)
    }

    /// True when a flag was given for the environment variable `name`.
    fn flag_replaces(&self, name: &str) -> bool {
        match name {
            ENV_TABLE => self.table.is_some(),
            ENV_PAGE_LIMIT => self.page_limit.is_some(),
            ENV_MAX_PAGES => self.max_pages.is_some(),
            ENV_ACCUMULATION => self.accumulation.is_some(),
            ENV_ON_FETCH_ERROR => self.on_fetch_error.is_some(),
            _ => false,
        }
    }

    fn backend_args(&self) -> backend::BackendArgs {
        backend::BackendArgs {
            fixture: self.fixture.clone(),
            fixture_page_size: self.fixture_page_size,
            client: ClientSettings {
                endpoint_url: self.endpoint_url.clone(),
                region: self.region.clone(),
            },
        }
    }
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("error: ").to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn emit_json(value: &Value, pretty: bool) {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn colorize_label(label: &str, enabled: bool, code: &str) -> String {
    if enabled {
        format!("\u{1b}[{code}m{label}\u{1b}[0m")
    } else {
        label.to_string()
    }
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(err.message().unwrap_or("error")));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(table) = err.table() {
        inner.insert("table".to_string(), json!(table));
    }
    if let Some(page) = err.page() {
        inner.insert("page".to_string(), json!(page));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, "31"),
        err.message().unwrap_or("error")
    )];
    if let Some(hint) = err.hint() {
        lines.push(format!("{} {hint}", colorize_label("hint:", use_color, "33")));
    }
    if let Some(table) = err.table() {
        lines.push(format!("{} {table}", colorize_label("table:", use_color, "33")));
    }
    for cause in error_causes(err) {
        lines.push(format!("{} {cause}", colorize_label("caused by:", use_color, "33")));
    }
    lines.join("\n")
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        causes.push(source.to_string());
        current = source.source();
    }
    causes
}

#[cfg(test)]
mod tests {
    use super::{Cli, error_json, error_text};
    use clap::Parser;
    use recordscan::api::{Error, ErrorKind, FailurePolicy};

    #[test]
    fn error_text_respects_color_flag() {
        let err = Error::new(ErrorKind::Usage).with_message("bad input");
        let colored = error_text(&err, true);
        let plain = error_text(&err, false);
        assert!(colored.contains("\u{1b}[31merror:\u{1b}[0m"));
        assert!(plain.contains("error: bad input"));
        assert!(!plain.contains("\u{1b}["));
    }

    #[test]
    fn error_json_includes_causes() {
        let err = Error::new(ErrorKind::Io)
            .with_message("request failed")
            .with_table("jobs")
            .with_source(std::io::Error::other("reset by peer"));
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "Io");
        assert_eq!(value["error"]["table"], "jobs");
        assert_eq!(value["error"]["causes"][0], "reset by peer");
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "recordscan",
            "invoke",
            "--table",
            "renditions",
            "--on-fetch-error",
            "surface",
        ])
        .expect("parse");
        let super::Command::Invoke { handler, .. } = cli.command else {
            panic!("expected invoke");
        };
        let config = handler.handler_config().expect("config");
        assert_eq!(config.table, "renditions");
        assert_eq!(config.on_fetch_error, FailurePolicy::Surface);
    }

    #[test]
    fn fixture_page_size_requires_fixture() {
        let result = Cli::try_parse_from(["recordscan", "invoke", "--fixture-page-size", "2"]);
        assert!(result.is_err());
    }
}
