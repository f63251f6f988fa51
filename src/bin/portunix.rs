//! CLI entry point: parses arguments, initializes logging, dispatches to
//! the library's engines, and maps any failure onto the process exit code
//!

use clap::Parser;
use portunix::cli::{self, Cli};
use portunix::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let verbose = cli.verbose;

    if let Err(e) = cli::execute(cli).await {
        if verbose {
            eprintln!("error: {e:?}");
        } else {
            eprintln!("error: {e}");
        }
        std::process::exit(e.exit_code());
    }
}
