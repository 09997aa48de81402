//! Purpose: `uast-gateway` CLI entry point.
//! Role: Binary crate root; parses args, runs the server or helper commands.
//! Invariants: Errors are emitted as JSON on stderr unless stderr is a terminal.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::io::{self, IsTerminal};
use std::net::SocketAddr;

use clap::{Args, CommandFactory, Parser, Subcommand, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::json;

mod command_dispatch;

use uast_gateway::api::{Error, ErrorKind, ServeConfig, to_exit_code};
use uast_gateway::gist::DEFAULT_GIST_BASE_URL;
use uast_gateway::serve::{DEFAULT_BACKEND, DEFAULT_BIND, DEFAULT_DRIVERS, DEFAULT_MAX_BODY_BYTES};

fn main() {
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(exit_code);
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Run `uast-gateway --help` for usage."));
            }
        },
    };

    command_dispatch::dispatch_command(cli.command)?;
    Ok(0)
}

#[derive(Parser)]
#[command(
    name = "uast-gateway",
    version,
    about = "HTTP/JSON gateway that parses source code into UAST documents",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Serve the parse gateway over HTTP",
        after_long_help = r#"EXAMPLES
  $ uast-gateway serve
  $ uast-gateway serve --bind 0.0.0.0:9999 --backend bblfshd:9432
  $ uast-gateway serve --cors-origin http://localhost:3000
  $ RUST_LOG=debug uast-gateway serve --parse-timeout-ms 30000

NOTES
  - POST /parse accepts {"backendAddress"?, "language", "content"}
  - An empty backendAddress uses the --backend client; others are dialed per request
  - GET /drivers lists --driver values (repeatable; defaults to a built-in list)
  - GET /gist?url=<path> proxies <gist-base-url><path>"#
    )]
    Serve(ServeArgs),
    #[command(
        about = "Generate shell completion scripts",
        after_long_help = r#"EXAMPLES
  $ uast-gateway completion bash > ~/.local/share/bash-completion/completions/uast-gateway
  $ uast-gateway completion zsh > ~/.zfunc/_uast-gateway"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(Args)]
struct ServeArgs {
    #[arg(
        long,
        default_value = DEFAULT_BIND,
        help = "Bind address",
        help_heading = "Connection"
    )]
    bind: String,
    #[arg(
        long,
        default_value = DEFAULT_BACKEND,
        help = "Default parsing backend address (host:port)",
        help_heading = "Backend"
    )]
    backend: String,
    #[arg(
        long,
        value_name = "MS",
        help = "Deadline for each backend parse call in milliseconds",
        help_heading = "Backend"
    )]
    parse_timeout_ms: Option<u64>,
    #[arg(
        long = "driver",
        value_name = "LANGUAGE",
        help = "Language id listed by GET /drivers (repeatable)",
        help_heading = "Backend"
    )]
    driver: Vec<String>,
    #[arg(
        long,
        default_value = DEFAULT_GIST_BASE_URL,
        help = "Base URL prepended to GET /gist paths",
        help_heading = "Connection"
    )]
    gist_base_url: String,
    #[arg(
        long = "cors-origin",
        value_name = "ORIGIN",
        help = "Allow browser requests from this origin (repeatable, explicit list)",
        help_heading = "Connection"
    )]
    cors_origin: Vec<String>,
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_BODY_BYTES,
        help = "Max request body size in bytes",
        help_heading = "Safety"
    )]
    max_body_bytes: u64,
}

fn serve_config_from_args(args: ServeArgs) -> Result<ServeConfig, Error> {
    let bind: SocketAddr = args.bind.parse().map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid bind address")
            .with_hint("Use a host:port value like 127.0.0.1:9999.")
    })?;
    let drivers = if args.driver.is_empty() {
        DEFAULT_DRIVERS.iter().map(|id| id.to_string()).collect()
    } else {
        args.driver
    };
    let mut config = ServeConfig::new(bind, args.backend);
    config.drivers = drivers;
    config.gist_base_url = args.gist_base_url;
    config.cors_allowed_origins = args.cors_origin;
    config.max_body_bytes = args.max_body_bytes;
    config.parse_timeout_ms = args.parse_timeout_ms;
    Ok(config)
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

fn error_json(err: &Error) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    body.insert("message".to_string(), json!(err.detail()));
    if let Some(hint) = err.hint() {
        body.insert("hint".to_string(), json!(hint));
    }
    json!({ "error": body })
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("error: {}", err.detail());
        if let Some(hint) = err.hint() {
            eprintln!("hint: {hint}");
        }
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}
