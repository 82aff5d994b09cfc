use courier_core::logging;

mod adapters;
mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    // Log to the state-dir file; if that fails (unwritable dir), fall back
    // to stderr rather than refusing to start.
    if logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("courier error: {:#}", err);
        std::process::exit(1);
    }
}
