//! Purpose: Hold top-level CLI command dispatch for `uast-gateway`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: The server runs on a multi-thread tokio runtime owned by this call.

use super::*;

pub(super) fn dispatch_command(command: Command) -> Result<(), Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "uast-gateway", &mut io::stdout());
            Ok(())
        }
        Command::Serve(args) => {
            let config = serve_config_from_args(args)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(uast_gateway::api::serve(config))
        }
    }
}
